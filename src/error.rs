use thiserror::Error;

/// Errors surfaced by the builders.
///
/// Construction either returns a complete queryable function or one of
/// these; nothing partially built is ever observable. Retrying after a
/// [`BuildError::SeedCollision`] with a fresh seed is the caller's decision.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid build configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("cannot build over an empty key set")]
    EmptyInput,
    #[error("seed produced an unresolvable hash collision; retry with a different seed")]
    SeedCollision,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
