//! Unified error type for the policy engine.
//!
//! All crates funnel their failures into [`Error`]. [`Error::kind`] groups the
//! variants so callers (and log lines) can tell load-time problems, per-file
//! evaluation failures, policy-authored control flow, and collaborator
//! failures apart.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A track that cannot be carried into the requested container as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncompatibleTrack {
    /// 0-based global track index in the source file.
    pub index: usize,
    /// Track type (`audio`, `subtitle`, ...).
    pub track_type: String,
    /// Codec reported for the track.
    pub codec: String,
}

impl fmt::Display for IncompatibleTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track {} ({}, {})", self.index, self.track_type, self.codec)
    }
}

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed policy, bad expression syntax, broken phase references.
    Validation,
    /// A per-file failure raised while building a plan.
    Evaluation,
    /// A policy-authored outcome (e.g. a `fail` action).
    Control,
    /// Introspection or execution failures from outside the core.
    Collaborator,
    /// Cancellation or unexpected internal state.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Control => write!(f, "control"),
            Self::Collaborator => write!(f, "collaborator"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Unified error type covering all failure modes of the policy engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Policy data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An embedded condition expression failed to lex or parse.
    #[error("Expression error: {0}")]
    Expression(String),

    /// The file has no tracks to evaluate.
    #[error("No tracks: {0}")]
    NoTracks(String),

    /// A requested operation cannot be represented in the container.
    #[error("Unsupported container [{container}]: {operation}")]
    UnsupportedContainer {
        /// Normalized container name.
        container: String,
        /// The operation that cannot be applied.
        operation: String,
    },

    /// Container conversion found codecs the target cannot hold.
    #[error("Incompatible codecs for {target}: {}", join_tracks(.tracks))]
    IncompatibleCodec {
        /// Target container.
        target: String,
        /// Offending tracks.
        tracks: Vec<IncompatibleTrack>,
    },

    /// Filtering would leave fewer tracks than the policy requires.
    #[error(
        "Insufficient {track_type} tracks: {available} kept, {required} required \
         (policy languages: {policy_languages:?}, file languages: {file_languages:?})"
    )]
    InsufficientTracks {
        /// Track type being filtered.
        track_type: String,
        /// Minimum required by the policy.
        required: usize,
        /// Tracks left after filtering.
        available: usize,
        /// Languages the policy keeps.
        policy_languages: Vec<String>,
        /// Languages present in the file.
        file_languages: Vec<String>,
    },

    /// No audio track qualifies as a synthesis source.
    #[error("Source track not found for '{definition}': {message}")]
    SourceTrackNotFound {
        /// Synthesis definition name.
        definition: String,
        /// Human-readable explanation.
        message: String,
    },

    /// A synthesis definition asks for more channels than its source has.
    #[error(
        "Downmix not supported for '{definition}': cannot produce {target_channels} \
         channels from a {source_channels}-channel source"
    )]
    DownmixNotSupported {
        /// Synthesis definition name.
        definition: String,
        /// Channels of the selected source.
        source_channels: u32,
        /// Channels requested by the definition.
        target_channels: u32,
    },

    /// A conditional rule fired a `fail` action.
    #[error("Conditional fail [{rule_name}]: {message}")]
    ConditionalFail {
        /// The rule that failed.
        rule_name: String,
        /// Interpolated message.
        message: String,
    },

    /// The introspection collaborator could not read the file.
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// The execution collaborator failed to apply a plan.
    #[error("Execution error [{phase}]: {message}")]
    Execution {
        /// The phase whose plan failed.
        phase: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Processing was cancelled cooperatively.
    #[error("Cancelled")]
    Cancelled,

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_tracks(tracks: &[IncompatibleTrack]) -> String {
    tracks
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Expression(_) => ErrorKind::Validation,
            Error::NoTracks(_)
            | Error::UnsupportedContainer { .. }
            | Error::IncompatibleCodec { .. }
            | Error::InsufficientTracks { .. }
            | Error::SourceTrackNotFound { .. }
            | Error::DownmixNotSupported { .. } => ErrorKind::Evaluation,
            Error::ConditionalFail { .. } => ErrorKind::Control,
            Error::Introspection(_) | Error::Execution { .. } | Error::Io { .. } => {
                ErrorKind::Collaborator
            }
            Error::Cancelled | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Convenience constructor for [`Error::UnsupportedContainer`].
    pub fn unsupported_container(
        container: impl Into<String>,
        operation: impl Into<String>,
    ) -> Self {
        Error::UnsupportedContainer {
            container: container.into(),
            operation: operation.into(),
        }
    }

    /// Convenience constructor for [`Error::SourceTrackNotFound`].
    pub fn source_not_found(definition: impl Into<String>, message: impl Into<String>) -> Self {
        Error::SourceTrackNotFound {
            definition: definition.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ConditionalFail`].
    pub fn conditional_fail(rule_name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConditionalFail {
            rule_name: rule_name.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Execution`].
    pub fn execution(phase: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Execution {
            phase: phase.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display() {
        let err = Error::Validation("phases cannot be empty".into());
        assert_eq!(err.to_string(), "Validation error: phases cannot be empty");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn expression_is_validation() {
        let err = Error::Expression("Empty expression".into());
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn incompatible_codec_lists_tracks() {
        let err = Error::IncompatibleCodec {
            target: "mp4".into(),
            tracks: vec![
                IncompatibleTrack {
                    index: 1,
                    track_type: "audio".into(),
                    codec: "truehd".into(),
                },
                IncompatibleTrack {
                    index: 3,
                    track_type: "subtitle".into(),
                    codec: "hdmv_pgs_subtitle".into(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "Incompatible codecs for mp4: track 1 (audio, truehd), \
             track 3 (subtitle, hdmv_pgs_subtitle)"
        );
        assert_eq!(err.kind(), ErrorKind::Evaluation);
    }

    #[test]
    fn insufficient_tracks_display() {
        let err = Error::InsufficientTracks {
            track_type: "audio".into(),
            required: 1,
            available: 0,
            policy_languages: vec!["eng".into()],
            file_languages: vec!["fra".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("0 kept, 1 required"), "got: {msg}");
        assert!(msg.contains("fra"));
    }

    #[test]
    fn downmix_display() {
        let err = Error::DownmixNotSupported {
            definition: "surround".into(),
            source_channels: 2,
            target_channels: 6,
        };
        assert_eq!(
            err.to_string(),
            "Downmix not supported for 'surround': cannot produce 6 channels \
             from a 2-channel source"
        );
    }

    #[test]
    fn unsupported_container_display() {
        let err = Error::unsupported_container("avi", "set_default on track 1");
        assert_eq!(
            err.to_string(),
            "Unsupported container [avi]: set_default on track 1"
        );
    }

    #[test]
    fn conditional_fail_is_control() {
        let err = Error::conditional_fail("no-english", "movie.mkv has no English audio");
        assert_eq!(
            err.to_string(),
            "Conditional fail [no-english]: movie.mkv has no English audio"
        );
        assert_eq!(err.kind(), ErrorKind::Control);
    }

    #[test]
    fn execution_display() {
        let err = Error::execution("normalize", "mkvpropedit exited 2");
        assert_eq!(err.to_string(), "Execution error [normalize]: mkvpropedit exited 2");
        assert_eq!(err.kind(), ErrorKind::Collaborator);
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.kind(), ErrorKind::Collaborator);
    }

    #[test]
    fn cancelled_is_internal() {
        assert_eq!(Error::Cancelled.kind(), ErrorKind::Internal);
        assert_eq!(Error::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
