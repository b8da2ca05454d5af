use thiserror::Error as ThisError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the builders and the PE reader. The core never catches
/// internally; low-level failures are translated into these kinds at the
/// boundary where they occur.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Malformed manifest, CLI argument, or builder contract violation.
    #[error("bad input: {0}")]
    BadInput(String),
    /// The DLL image could not be parsed as PE32/PE32+.
    #[error("unreadable or invalid PE image: {0}")]
    PeParse(&'static str),
    /// The image has no export directory, or it is zero-sized.
    #[error("no export found")]
    NoExports,
    /// A section name exceeded 8 bytes or a member name exceeded 15 bytes.
    #[error("name too long: {0}")]
    BadName(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("not enough memory")]
    OutOfMemory,
}
