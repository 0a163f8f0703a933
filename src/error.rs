//! Error taxonomy shared by every save operation.

use std::path::{Path, PathBuf};

/// Failure classes surfaced by the engine.
///
/// `Unsigned` is kept apart from `Crypto`: it means the content was already
/// rewritten and only the final signature step failed.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid format: {0}")]
    FormatInvalid(String),

    #[error("crypto failure: {0}")]
    Crypto(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network failure: {0}")]
    Network(String),

    #[error("cancelled by user")]
    Declined,

    #[error("save modified but not signed: {0}")]
    Unsigned(String),
}

pub type SaveResult<T> = Result<T, SaveError>;

impl SaveError {
    pub fn not_found(what: impl Into<String>) -> Self {
        SaveError::NotFound(what.into())
    }

    pub fn format(what: impl Into<String>) -> Self {
        SaveError::FormatInvalid(what.into())
    }

    pub fn crypto(what: impl Into<String>) -> Self {
        SaveError::Crypto(what.into())
    }

    pub fn network(what: impl Into<String>) -> Self {
        SaveError::Network(what.into())
    }
}

/// Attach a path to an `io::Error`.
pub trait IoContext<T> {
    fn at(self, path: &Path) -> SaveResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: &Path) -> SaveResult<T> {
        self.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SaveError::NotFound(path.display().to_string())
            } else {
                SaveError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
    }
}

impl From<std::io::Error> for SaveError {
    fn from(source: std::io::Error) -> Self {
        SaveError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl From<zip::result::ZipError> for SaveError {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(source) => SaveError::from(source),
            zip::result::ZipError::FileNotFound => SaveError::NotFound("zip entry".to_string()),
            other => SaveError::FormatInvalid(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for SaveError {
    fn from(e: reqwest::Error) -> Self {
        SaveError::Network(e.to_string())
    }
}

impl From<walkdir::Error> for SaveError {
    fn from(e: walkdir::Error) -> Self {
        let path = e.path().map(Path::to_path_buf).unwrap_or_default();
        match e.into_io_error() {
            Some(source) => SaveError::Io { path, source },
            None => SaveError::FormatInvalid(format!("filesystem loop at {}", path.display())),
        }
    }
}

impl From<serde_json::Error> for SaveError {
    fn from(e: serde_json::Error) -> Self {
        SaveError::FormatInvalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_maps_to_not_found() {
        let err = std::fs::read("/definitely/not/here.bin")
            .at(Path::new("/definitely/not/here.bin"))
            .unwrap_err();
        assert!(matches!(err, SaveError::NotFound(_)));
    }

    #[test]
    fn test_unsigned_message_is_distinct() {
        let err = SaveError::Unsigned("PARAM.SFO".into());
        assert!(err.to_string().contains("not signed"));
        assert!(!matches!(err, SaveError::Crypto(_)));
    }
}
