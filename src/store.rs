//! Symmetric, sentence-oriented storage over a forward and a backward
//! [`Trie`](crate::trie::Trie).
//!
//! The forward trie captures right-context branching; the backward trie
//! captures left-context branching (it is trained on reversed sentences).
//! A token boundary is linguistically credible when *both* sides are
//! highly branching, so every symmetric query averages the forward value
//! with the backward value evaluated on the reversed n-gram.

use crate::error::{EleveError, EleveResult};
use crate::token::{Ngram, Token};
use crate::trie::Trie;

/// The capability set the segmenter and evaluation code depend on, so that
/// alternative backends (disk-backed, database-backed) can stand in for
/// [`InMemoryStorage`] without an inheritance chain.
pub trait NgramStore {
    fn add_ngram(&mut self, ngram: &[Token], freq: i64) -> EleveResult<()>;
    fn query_count(&self, ngram: &[Token]) -> u64;
    fn query_entropy(&self, ngram: &[Token]) -> f64;
    fn query_ev(&self, ngram: &[Token]) -> f64;
    fn query_autonomy(&self, ngram: &[Token]) -> f64;
    fn clear(&mut self);
    fn update_stats(&self);
}

fn reversed(ngram: &[Token]) -> Ngram {
    ngram.iter().rev().cloned().collect()
}

/// Owns a forward and a backward trie and drives sentence ingestion with
/// `Start`/`End` sentinel padding.
#[derive(Debug)]
pub struct InMemoryStorage {
    default_ngram_length: usize,
    fwd: Trie,
    bwd: Trie,
}

impl InMemoryStorage {
    pub fn new(default_ngram_length: usize) -> Self {
        InMemoryStorage {
            default_ngram_length,
            fwd: Trie::new(default_ngram_length),
            bwd: Trie::new(default_ngram_length),
        }
    }

    pub fn default_ngram_length(&self) -> usize {
        self.default_ngram_length
    }

    /// Train on one sentence. Pads with `[Start] + sentence + [End]`, then
    /// inserts every contiguous window of length `ngram_length` (or
    /// `default_ngram_length` if `None`), anchored at each position, into
    /// `fwd`; does the same with the reversed padded sequence into `bwd`.
    pub fn add_sentence(
        &mut self,
        sentence: &[Token],
        freq: i64,
        ngram_length: Option<usize>,
    ) -> EleveResult<()> {
        if freq <= 0 {
            return Err(EleveError::InvalidArgument(format!(
                "freq must be a positive integer, got {freq}"
            )));
        }
        if sentence.is_empty() {
            log::warn!("add_sentence called with an empty sentence; ignoring");
            return Ok(());
        }
        let length = ngram_length.unwrap_or(self.default_ngram_length);

        let mut padded = Vec::with_capacity(sentence.len() + 2);
        padded.push(Token::Start);
        padded.extend_from_slice(sentence);
        padded.push(Token::End);

        Self::train_windows(&mut self.fwd, &padded, length, freq)?;
        let reversed_padded: Ngram = padded.into_iter().rev().collect();
        Self::train_windows(&mut self.bwd, &reversed_padded, length, freq)?;
        Ok(())
    }

    fn train_windows(trie: &mut Trie, padded: &[Token], length: usize, freq: i64) -> EleveResult<()> {
        for i in 0..padded.len().saturating_sub(1) {
            let end = (i + length).min(padded.len());
            trie.add_ngram(&padded[i..end], freq)?;
        }
        Ok(())
    }

    /// Emit a three-column tab-separated export: word form (tab-joined
    /// tokens), autonomy, count — only for ngrams with a defined (non-NaN)
    /// autonomy.
    pub fn dump_csv(&self, delimiter: &str) -> String {
        self.update_stats();
        let mut out = String::new();
        for (ngram, count) in self.fwd.iter_ngrams() {
            let autonomy = self.query_autonomy(&ngram);
            if autonomy.is_nan() {
                continue;
            }
            let form = ngram
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(delimiter);
            out.push_str(&format!("{form}\t{autonomy}\t{count}\n"));
        }
        out
    }
}

impl NgramStore for InMemoryStorage {
    fn add_ngram(&mut self, ngram: &[Token], freq: i64) -> EleveResult<()> {
        self.fwd.add_ngram(ngram, freq)?;
        self.bwd.add_ngram(&reversed(ngram), freq)
    }

    fn query_count(&self, ngram: &[Token]) -> u64 {
        let fwd = self.fwd.query_count(ngram);
        let bwd = self.bwd.query_count(&reversed(ngram));
        (fwd + bwd) / 2
    }

    fn query_entropy(&self, ngram: &[Token]) -> f64 {
        let fwd = self.fwd.query_entropy(ngram);
        let bwd = self.bwd.query_entropy(&reversed(ngram));
        (fwd + bwd) / 2.0
    }

    fn query_ev(&self, ngram: &[Token]) -> f64 {
        let fwd = self.fwd.query_ev(ngram);
        let bwd = self.bwd.query_ev(&reversed(ngram));
        (fwd + bwd) / 2.0
    }

    fn query_autonomy(&self, ngram: &[Token]) -> f64 {
        let fwd = self.fwd.query_autonomy(ngram, true);
        let bwd = self.bwd.query_autonomy(&reversed(ngram), true);
        (fwd + bwd) / 2.0
    }

    fn clear(&mut self) {
        self.fwd.clear();
        self.bwd.clear();
    }

    fn update_stats(&self) {
        // Trie queries already refresh lazily; this just forces it ahead of
        // a bulk read like `dump_csv`.
        let _ = self.fwd.query_count(&[]);
        let _ = self.bwd.query_count(&[]);
    }
}
