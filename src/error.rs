use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to read {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Format error: {0}")]
    Format(String),

    #[error("Failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Spill error: {0}")]
    Spill(#[from] io::Error),
}

impl DetectError {
    /// Storage-access and format errors are the two ways a bad input source surfaces.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DetectError::Storage(_)
                | DetectError::Unreadable { .. }
                | DetectError::Format(_)
                | DetectError::Decode { .. }
        )
    }

    pub(crate) fn worker(worker: usize, err: impl std::fmt::Display) -> Self {
        DetectError::Worker {
            worker,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = DetectError::Storage("no images under /data".to_string());
        assert_eq!(err.to_string(), "Storage error: no images under /data");

        let err = DetectError::Worker {
            worker: 2,
            message: "out of memory".to_string(),
        };
        assert_eq!(err.to_string(), "Worker 2 failed: out of memory");

        let err = DetectError::Resource("2 GPUs requested, 1 available".to_string());
        assert_eq!(err.to_string(), "Resource error: 2 GPUs requested, 1 available");
    }

    #[test]
    fn test_error_conversion_from_io_error() {
        fn returns_io_error() -> Result<(), io::Error> {
            Err(io::Error::other("disk full"))
        }

        fn uses_question_mark() -> Result<(), DetectError> {
            returns_io_error()?;
            Ok(())
        }

        match uses_question_mark().unwrap_err() {
            DetectError::Spill(e) => assert_eq!(e.to_string(), "disk full"),
            other => panic!("Expected Spill variant, got {other:?}"),
        }
    }

    #[test]
    fn test_input_error_classification() {
        assert!(DetectError::Format("2 channels".into()).is_input_error());
        assert!(DetectError::Storage("unreachable".into()).is_input_error());
        assert!(!DetectError::Resource("no gpu".into()).is_input_error());
        assert!(!DetectError::worker(0, "boom").is_input_error());
    }
}
