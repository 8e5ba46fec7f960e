use camino::Utf8PathBuf;
use thiserror::Error;

/// Failures that prevent an index from being built at all.
///
/// Individual malformed records are never reported here; they are skipped
/// during loading.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("source not found: {path}")]
    SourceNotFound { path: Utf8PathBuf },
    #[error("failed to read {path}: {source}")]
    SourceRead {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl IndexError {
    pub(crate) fn from_io(path: &camino::Utf8Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            IndexError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            IndexError::SourceRead {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
