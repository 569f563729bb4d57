use thiserror::Error;

use crate::db::StoreError;

/// Failure kinds produced by the archive pipeline.
///
/// `AlreadyExists` is an expected outcome of reprocessing and callers log it
/// at debug level only.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("message {0} has already been archived")]
    AlreadyExists(String),

    #[error("could not resolve message {id}: {source:#}")]
    ResolutionFailure {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("channel {0} is not a text channel")]
    ChannelTypeUnsupported(String),

    #[error("platform error: {0:#}")]
    Platform(#[source] anyhow::Error),
}

impl ArchiveError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ArchiveError::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ArchiveError::NotFound(_))
    }
}

impl From<StoreError> for ArchiveError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => ArchiveError::AlreadyExists(id),
            other => ArchiveError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let e = ArchiveError::NotFound("message 42".into());
        assert_eq!(e.to_string(), "message 42 not found");

        let e = ArchiveError::AlreadyExists("42".into());
        assert_eq!(e.to_string(), "message 42 has already been archived");

        let e = ArchiveError::ResolutionFailure {
            id: "7".into(),
            source: anyhow::anyhow!("Unknown Message"),
        };
        assert_eq!(e.to_string(), "could not resolve message 7: Unknown Message");

        let e = ArchiveError::ChannelTypeUnsupported("99".into());
        assert_eq!(e.to_string(), "channel 99 is not a text channel");
    }

    #[test]
    fn test_platform_error_keeps_its_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "gateway timed out");
        let e = ArchiveError::Platform(anyhow::Error::new(cause).context("fetching channel 5"));
        assert_eq!(
            e.to_string(),
            "platform error: fetching channel 5: gateway timed out"
        );

        let source = std::error::Error::source(&e).expect("platform error has a source");
        assert_eq!(source.to_string(), "fetching channel 5");
        let root = source.source().expect("context wraps the io error");
        assert_eq!(root.to_string(), "gateway timed out");
    }

    #[test]
    fn test_conflict_maps_to_already_exists() {
        let e: ArchiveError = StoreError::Conflict("123".into()).into();
        assert!(e.is_already_exists());
        assert!(!e.is_not_found());
    }

    #[test]
    fn test_json_error_maps_to_persistence() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{invalid").unwrap_err();
        let e: ArchiveError = StoreError::from(json_err).into();
        assert!(matches!(e, ArchiveError::Persistence(_)));
        assert!(e.to_string().starts_with("persistence error"));
    }
}
