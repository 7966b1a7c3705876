// events.rs — Notifications broadcast to session subscribers.

use serde::Serialize;

use super::state::SessionState;
use crate::ai::ComponentInfo;
use crate::capture::now_iso;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEventKind {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    PlanReady {
        object_name: String,
        steps: usize,
    },
    StepAdvanced {
        step_cursor: usize,
    },
    AssistantMessage {
        text: String,
    },
    ComponentIdentified {
        info: ComponentInfo,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    #[serde(flatten)]
    pub kind: SessionEventKind,
    pub timestamp: String,
}

impl SessionEvent {
    pub fn now(kind: SessionEventKind) -> Self {
        Self {
            kind,
            timestamp: now_iso(),
        }
    }
}
