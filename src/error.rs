//! Error type for the eleve-core capability set.
//!
//! A small `thiserror` enum for structural mistakes, converted to a
//! `PyValueError` at the PyO3 boundary the same way `errors::GraphError` is
//! converted in `lib.rs`. Domain emptiness (missing ngram, undefined
//! autonomy) is never an `Err` — it is always a `NaN`/`0` return.

use pyo3::exceptions::PyValueError;
use pyo3::PyErr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EleveError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("out of range: {0}")]
    OutOfRange(String),
}

impl From<EleveError> for PyErr {
    fn from(err: EleveError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

pub type EleveResult<T> = Result<T, EleveError>;
