use std::path::PathBuf;

/// Everything a generation call can fail with.
///
/// Validation errors carry the offending parameter so a front end can point
/// at the field the user has to fix.
#[derive(Debug, thiserror::Error)]
pub enum GenError {
    #[error("unknown genre: {0:?}")]
    UnknownGenre(String),

    #[error("unknown key: {0:?}")]
    UnknownKey(String),

    #[error("invalid {param}: {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("genre table: {0}")]
    Config(String),

    #[error("malformed MIDI file: {0}")]
    Malformed(String),
}

impl GenError {
    pub(crate) fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        GenError::InvalidParameter {
            param,
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GenError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
