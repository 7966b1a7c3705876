// error.rs — Errors surfaced by session operations.

use crate::ai::AiError;
use crate::capture::{CaptureError, VoiceError};

use super::state::{Rejected, SessionState};

/// Error type for session operations. The `Display` text is what the user
/// sees in the error panel.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("Camera access was denied. Allow camera and microphone access, then try again. ({0})")]
    PermissionDenied(String),
    #[error("Couldn't work out what's wrong. Try again with the object well lit and in frame. ({0})")]
    DiagnosisFailed(String),
    #[error("The assistant sent back something unreadable. ({0})")]
    OracleResponseInvalid(String),
    #[error("No camera frame is available")]
    CaptureUnavailable,
    #[error("Already listening")]
    AlreadyListening,
    #[error("Can't {op} while {state}")]
    NotAllowed {
        op: &'static str,
        state: SessionState,
    },
}

impl From<Rejected> for SessionError {
    fn from(r: Rejected) -> Self {
        Self::NotAllowed {
            op: r.action,
            state: r.state,
        }
    }
}

impl From<AiError> for SessionError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::DiagnosisFailed(msg) => Self::DiagnosisFailed(msg),
            AiError::InvalidResponse(msg) => Self::OracleResponseInvalid(msg),
            other => Self::DiagnosisFailed(other.to_string()),
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied(msg) | CaptureError::NoDevice(msg) => {
                Self::PermissionDenied(msg)
            }
            CaptureError::Stream(msg) => Self::PermissionDenied(msg),
            CaptureError::FrameUnavailable | CaptureError::Encode(_) => Self::CaptureUnavailable,
        }
    }
}

impl From<VoiceError> for SessionError {
    fn from(e: VoiceError) -> Self {
        match e {
            VoiceError::AlreadyListening => Self::AlreadyListening,
            VoiceError::NotListening | VoiceError::EmptyClip | VoiceError::Encode(_) => {
                Self::CaptureUnavailable
            }
        }
    }
}
