use thiserror::Error;

/// Errors raised while constructing or solving a pose graph.
///
/// Structural problems are reported before any solver work begins, so a
/// returned error never leaves poses partially updated.
#[derive(Debug, Error)]
pub enum SpaError {
    /// A constraint references a pose id that is not in the pose map, or the
    /// anchor pose is missing.
    #[error("invalid pose graph: {0}")]
    InvalidGraph(String),
    /// The information matrix has no real square root.
    #[error("information matrix is not symmetric positive semi-definite: {0}")]
    SingularInformation(String),
    /// The problem IR is malformed (duplicate constant marking, bad indices, ...).
    #[error("malformed problem: {0}")]
    Construction(String),
    /// The solver returned an unusable result.
    #[error("solver failure: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, SpaError>;

/// Return early with [`SpaError::Construction`] unless `cond` holds.
macro_rules! ensure_construction {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::SpaError::Construction(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_construction;
