//! The repair session: a single state machine that owns the plan, the step
//! cursor and the frozen frame, and the orchestrator that drives it against
//! the camera, the oracle and the speaker.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod state;

pub use error::SessionError;
pub use events::{SessionEvent, SessionEventKind};
pub use orchestrator::{CueOverlay, RepairSession, SessionConfig, ANSWER_FALLBACK};
pub use state::{Assistant, Inspector, SessionSnapshot, SessionState};
