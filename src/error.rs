use thiserror::Error;

// Unified error type for linop.
//
// Faults carry the concrete operator variant and its shape so a failure deep
// inside a composed operator can still be attributed.

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OpError {
    #[error("`{op}` is not supported by {kind} operator of size {rows}x{cols}")]
    Unsupported {
        op: &'static str,
        kind: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("{kind} operator of size {rows}x{cols} given input of size {input_rows}x{input_cols}")]
    ShapeMismatch {
        kind: &'static str,
        rows: usize,
        cols: usize,
        input_rows: usize,
        input_cols: usize,
    },
    #[error("{kind} operator of size {rows}x{cols} has no workspace: call cache_operator first")]
    CacheNotInitialized {
        kind: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("{kind} operator of size {rows}x{cols} has no `{name}`")]
    MissingAttribute {
        kind: &'static str,
        rows: usize,
        cols: usize,
        name: &'static str,
    },
    #[error("factorization error: {0}")]
    FactorError(String),
}

impl OpError {
    pub(crate) fn unsupported(op: &'static str, kind: &'static str, size: (usize, usize)) -> Self {
        OpError::Unsupported {
            op,
            kind,
            rows: size.0,
            cols: size.1,
        }
    }

    pub(crate) fn shape(kind: &'static str, size: (usize, usize), input: (usize, usize)) -> Self {
        OpError::ShapeMismatch {
            kind,
            rows: size.0,
            cols: size.1,
            input_rows: input.0,
            input_cols: input.1,
        }
    }

    pub(crate) fn cache(kind: &'static str, size: (usize, usize)) -> Self {
        OpError::CacheNotInitialized {
            kind,
            rows: size.0,
            cols: size.1,
        }
    }

    pub(crate) fn attribute(kind: &'static str, size: (usize, usize), name: &'static str) -> Self {
        OpError::MissingAttribute {
            kind,
            rows: size.0,
            cols: size.1,
            name,
        }
    }
}
