//! Dynamic-programming segmenter: partitions a token sequence into
//! contiguous fragments maximizing total length-weighted autonomy.

use crate::error::{EleveError, EleveResult};
use crate::store::NgramStore;
use crate::token::{Ngram, Token};

/// Unknown-ngram autonomy is substituted with this sentinel penalty so the
/// recurrence stays admissible (no dead states) while strongly discouraging
/// the cut.
const UNKNOWN_AUTONOMY_PENALTY: f64 = -100.0;

/// Segmenting inputs past this many tokens is still honored, but logged —
/// the O(n * max_ngram_length) state and copied path lists get expensive.
const HUGE_INPUT_WARNING_THRESHOLD: usize = 1000;

/// Stateless consumer of a [`NgramStore`]; does not mutate the storage it
/// reads from.
pub struct Segmenter<'s, S: NgramStore> {
    storage: &'s S,
    max_ngram_length: usize,
}

impl<'s, S: NgramStore> Segmenter<'s, S> {
    /// `max_ngram_length` must be >= 2; typically
    /// `storage.default_ngram_length() - 1`.
    pub fn new(storage: &'s S, max_ngram_length: usize) -> EleveResult<Self> {
        if max_ngram_length < 2 {
            return Err(EleveError::InvalidArgument(format!(
                "max_ngram_length must be at least 2, got {max_ngram_length}"
            )));
        }
        Ok(Segmenter {
            storage,
            max_ngram_length,
        })
    }

    /// Partition `sentence` into contiguous fragments, maximizing
    /// `sum(autonomy(fragment) * len(fragment))` over all partitions
    /// reachable with fragments no longer than `max_ngram_length`.
    pub fn segment(&self, sentence: &[Token]) -> Vec<Ngram> {
        if sentence.len() > HUGE_INPUT_WARNING_THRESHOLD {
            log::warn!(
                "segmenting a {}-token sentence; this will take a lot of memory",
                sentence.len()
            );
        }

        let mut padded = Vec::with_capacity(sentence.len() + 2);
        padded.push(Token::Start);
        padded.extend_from_slice(sentence);
        padded.push(Token::End);
        let n = padded.len();

        let mut best_score = vec![f64::NEG_INFINITY; n + 1];
        best_score[0] = 0.0;
        let mut best_segmentation: Vec<Vec<Ngram>> = vec![Vec::new(); n + 1];

        for i in 1..=n {
            for j in 1..=self.max_ngram_length {
                if j > i {
                    break;
                }
                let fragment = &padded[i - j..i];
                let mut a = self.storage.query_autonomy(fragment);
                if a.is_nan() {
                    a = UNKNOWN_AUTONOMY_PENALTY;
                }
                let candidate = best_score[i - j] + a * j as f64;
                if candidate > best_score[i] {
                    best_score[i] = candidate;
                    let mut path = best_segmentation[i - j].clone();
                    path.push(fragment.to_vec());
                    best_segmentation[i] = path;
                }
            }
        }

        let mut result = best_segmentation.pop().unwrap();
        // Strip the Start/End sentinels, which always sit at the edges of
        // the first/last fragment of the optimal path.
        if let Some(first) = result.first_mut() {
            first.remove(0);
        }
        if let Some(last) = result.last_mut() {
            last.pop();
        }
        result.retain(|fragment| !fragment.is_empty());
        result
    }

    /// Keep the top-`n` partial paths per position instead of a single
    /// best; returns the `n` best complete segmentations, best first.
    pub fn segment_nbest(&self, sentence: &[Token], n_best: usize) -> Vec<Vec<Ngram>> {
        if n_best == 0 {
            return Vec::new();
        }
        if sentence.len() > HUGE_INPUT_WARNING_THRESHOLD {
            log::warn!(
                "segmenting a {}-token sentence; this will take a lot of memory",
                sentence.len()
            );
        }

        let mut padded = Vec::with_capacity(sentence.len() + 2);
        padded.push(Token::Start);
        padded.extend_from_slice(sentence);
        padded.push(Token::End);
        let n = padded.len();

        // candidates[i]: up to n_best (score, path) pairs for position i, sorted best-first.
        let mut candidates: Vec<Vec<(f64, Vec<Ngram>)>> = vec![Vec::new(); n + 1];
        candidates[0].push((0.0, Vec::new()));

        for i in 1..=n {
            let mut pool: Vec<(f64, Vec<Ngram>)> = Vec::new();
            for j in 1..=self.max_ngram_length {
                if j > i {
                    break;
                }
                let fragment = &padded[i - j..i];
                let mut a = self.storage.query_autonomy(fragment);
                if a.is_nan() {
                    a = UNKNOWN_AUTONOMY_PENALTY;
                }
                for (prev_score, prev_path) in &candidates[i - j] {
                    let mut path = prev_path.clone();
                    path.push(fragment.to_vec());
                    pool.push((prev_score + a * j as f64, path));
                }
            }
            pool.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
            pool.truncate(n_best);
            candidates[i] = pool;
        }

        candidates
            .pop()
            .unwrap()
            .into_iter()
            .map(|(_, mut path)| {
                if let Some(first) = path.first_mut() {
                    first.remove(0);
                }
                if let Some(last) = path.last_mut() {
                    last.pop();
                }
                path.retain(|fragment| !fragment.is_empty());
                path
            })
            .collect()
    }
}
