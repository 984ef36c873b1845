use thiserror::Error;

/// Shell-wide error kinds, mirroring the reference implementation's `DrshEC`.
///
/// `Exit` is not a failure — it is how the "return EC_EXIT up to main"
/// control flow is expressed without a bespoke non-error return channel.
#[derive(Error, Debug)]
pub enum DrshError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("out of memory")]
    Oom,

    #[error("internal assertion failed: {0}")]
    Assertion(&'static str),

    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),

    #[error("invalid value: {0}")]
    Value(String),

    #[error("end of input")]
    Eof,

    #[error("Unable to resolve program path for '{0}'")]
    NotFound(String),

    #[error("exit requested")]
    Exit,
}

pub type DrshResult<T> = Result<T, DrshError>;
