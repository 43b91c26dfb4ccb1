use std::io;
use std::path::PathBuf;

/// Errors that abort a batch run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Schema or links missing, unparseable or unusable. Raised before any fetch.
    #[error("Couldn't load {}: {source}", .path.display())]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Couldn't create output directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The crawler refused the batch as a whole.
    #[error("Batch crawl failed: {0}")]
    Crawl(#[source] anyhow::Error),
}

impl BatchError {
    pub(crate) fn config_load(path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            source: source.into(),
        }
    }
}
