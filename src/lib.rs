use pyo3::prelude::*;
use rayon::prelude::*;

mod error;
mod eval;
mod segmenter;
mod stats;
mod store;
mod token;
mod trie;

pub use error::{EleveError, EleveResult};
pub use eval::{boundary_f1, PrfScore};
pub use segmenter::Segmenter;
pub use store::{InMemoryStorage, NgramStore};
pub use token::{Ngram, Token};

fn to_tokens(words: &[String]) -> Ngram {
    words.iter().map(|w| Token::from_str_token(w)).collect()
}

fn from_tokens(ngram: &Ngram) -> Vec<String> {
    ngram.iter().map(|t| t.to_string()).collect()
}

fn from_fragments(fragments: Vec<Ngram>) -> Vec<Vec<String>> {
    fragments.iter().map(from_tokens).collect()
}

/// In-memory paired-trie storage, trained by adding sentences and queried
/// for branching-entropy statistics (count, entropy, entropy variation,
/// autonomy), symmetrically averaged over a forward and a backward trie.
#[pyclass]
pub struct PyStorage {
    inner: InMemoryStorage,
}

#[pymethods]
impl PyStorage {
    #[new]
    #[pyo3(signature = (default_ngram_length=5))]
    fn new(default_ngram_length: usize) -> Self {
        PyStorage {
            inner: InMemoryStorage::new(default_ngram_length),
        }
    }

    #[pyo3(signature = (sentence, freq=1, ngram_length=None))]
    fn add_sentence(
        &mut self,
        sentence: Vec<String>,
        freq: i64,
        ngram_length: Option<usize>,
    ) -> PyResult<()> {
        self.inner
            .add_sentence(&to_tokens(&sentence), freq, ngram_length)
            .map_err(Into::into)
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn update_stats(&self) {
        self.inner.update_stats();
    }

    fn query_count(&self, ngram: Vec<String>) -> u64 {
        self.inner.query_count(&to_tokens(&ngram))
    }

    fn query_entropy(&self, ngram: Vec<String>) -> f64 {
        self.inner.query_entropy(&to_tokens(&ngram))
    }

    fn query_ev(&self, ngram: Vec<String>) -> f64 {
        self.inner.query_ev(&to_tokens(&ngram))
    }

    fn query_autonomy(&self, ngram: Vec<String>) -> f64 {
        self.inner.query_autonomy(&to_tokens(&ngram))
    }

    /// Read-only, so safe to run off the GIL in parallel across many
    /// ngrams, the same way `batch_cosine_similarity_fast` does.
    fn batch_query_autonomy(&self, py: Python<'_>, ngrams: Vec<Vec<String>>) -> Vec<f64> {
        let tokenized: Vec<Ngram> = ngrams.iter().map(|g| to_tokens(g)).collect();
        py.detach(|| {
            tokenized
                .par_iter()
                .map(|g| self.inner.query_autonomy(g))
                .collect()
        })
    }

    #[pyo3(signature = (delimiter=" "))]
    fn dump_csv(&self, delimiter: &str) -> String {
        self.inner.dump_csv(delimiter)
    }

    fn default_ngram_length(&self) -> usize {
        self.inner.default_ngram_length()
    }

    fn __repr__(&self) -> String {
        format!(
            "Storage(default_ngram_length={})",
            self.inner.default_ngram_length()
        )
    }
}

/// Stateless dynamic-programming segmenter over a trained `Storage`.
#[pyclass]
pub struct PySegmenter {
    storage: Py<PyStorage>,
    max_ngram_length: usize,
}

#[pymethods]
impl PySegmenter {
    #[new]
    #[pyo3(signature = (storage, max_ngram_length=None))]
    fn new(storage: Py<PyStorage>, max_ngram_length: Option<usize>, py: Python<'_>) -> PyResult<Self> {
        let max_ngram_length = match max_ngram_length {
            Some(v) => v,
            None => storage.borrow(py).inner.default_ngram_length().saturating_sub(1),
        };
        if max_ngram_length < 2 {
            return Err(EleveError::InvalidArgument(format!(
                "max_ngram_length must be at least 2, got {max_ngram_length}"
            ))
            .into());
        }
        Ok(PySegmenter {
            storage,
            max_ngram_length,
        })
    }

    fn segment(&self, py: Python<'_>, sentence: Vec<String>) -> Vec<Vec<String>> {
        let storage_ref = self.storage.borrow(py);
        let segmenter = Segmenter::new(&storage_ref.inner, self.max_ngram_length)
            .expect("max_ngram_length was validated in PySegmenter::new");
        from_fragments(segmenter.segment(&to_tokens(&sentence)))
    }

    fn segment_nbest(&self, py: Python<'_>, sentence: Vec<String>, n: usize) -> Vec<Vec<Vec<String>>> {
        let storage_ref = self.storage.borrow(py);
        let segmenter = Segmenter::new(&storage_ref.inner, self.max_ngram_length)
            .expect("max_ngram_length was validated in PySegmenter::new");
        segmenter
            .segment_nbest(&to_tokens(&sentence), n)
            .into_iter()
            .map(from_fragments)
            .collect()
    }

    fn __repr__(&self) -> String {
        format!("Segmenter(max_ngram_length={})", self.max_ngram_length)
    }
}

/// Precision/recall/F1 of a test segmentation against a gold segmentation,
/// compared by the induced sets of word-boundary token offsets.
#[pyfunction]
fn boundary_f1_score(test: Vec<Vec<String>>, gold: Vec<Vec<String>>) -> (f64, f64, f64) {
    let test: Vec<Ngram> = test.iter().map(|g| to_tokens(g)).collect();
    let gold: Vec<Ngram> = gold.iter().map(|g| to_tokens(g)).collect();
    let score = boundary_f1(&test, &gold);
    (score.precision, score.recall, score.f1)
}

#[pymodule]
fn eleve_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyStorage>()?;
    m.add_class::<PySegmenter>()?;
    m.add_function(wrap_pyfunction!(boundary_f1_score, m)?)?;
    m.add("SENTENCE_START", token::START_CODEPOINT.to_string())?;
    m.add("SENTENCE_END", token::END_CODEPOINT.to_string())?;
    Ok(())
}
