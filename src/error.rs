use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Csv { path: PathBuf, source: csv::Error },

    /// A plate-reader export that cannot be read as a time series.
    #[error("Bad plate export {}: {message}", .path.display())]
    Export { path: PathBuf, message: String },

    /// A batch folder that does not have the expected layout.
    #[error("Bad batch folder {}: {message}", .folder.display())]
    Batch { folder: PathBuf, message: String },

    #[error("Bad annotation table {}: {message}", .path.display())]
    Annotation { path: PathBuf, message: String },

    #[error("Bad density table {}: {message}", .path.display())]
    Density { path: PathBuf, message: String },

    #[error("Duplicate annotation for join key {0}")]
    DuplicateAnnotation(String),

    #[error("Annotation repair failed: {0}")]
    Repair(String),

    #[error(
        "Threshold ordering violated: heat-day candidate {heat_day_cutoff} called {heat_day_extinct} \
         extinct wells, blank candidate {blank_cutoff} called {blank_extinct}; re-validate the cutoff policy"
    )]
    ThresholdOrdering {
        heat_day_cutoff: f64,
        heat_day_extinct: usize,
        blank_cutoff: f64,
        blank_extinct: usize,
    },

    #[error("Empty table: {0}")]
    Empty(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;

impl RecoveryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub fn export(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Export {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn annotation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Annotation {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn density(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Density {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_file() {
        let err = RecoveryError::export("batch/day1/A1.txt", "missing Time header");
        let msg = err.to_string();
        assert!(msg.contains("A1.txt"));
        assert!(msg.contains("missing Time header"));

        let err = RecoveryError::io(
            "annotation.csv",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.to_string().starts_with("annotation.csv"));
    }

    #[test]
    fn test_threshold_ordering_message() {
        let err = RecoveryError::ThresholdOrdering {
            heat_day_cutoff: 0.05,
            heat_day_extinct: 3,
            blank_cutoff: 0.02,
            blank_extinct: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("0.05"));
        assert!(msg.contains("re-validate"));
    }
}
