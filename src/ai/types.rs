use serde::{Deserialize, Serialize};

use crate::geometry::{NormalizedBox, NormalizedPoint};

// ── Oracle results ──────────────────────────────────────────────────────

/// What the renderer should draw for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueType {
    Box,
    Arrow,
    Point,
    None,
}

/// Shape/label descriptor for the active step's overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualCue {
    #[serde(rename = "type")]
    pub kind: CueType,
    pub coordinates: NormalizedBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
}

/// One step of a repair plan. Never mutated after the plan is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairStep {
    pub id: u32,
    pub title: String,
    pub instruction: String,
    pub visual_cue: VisualCue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_needed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_warning: Option<String>,
}

/// Diagnosis plus ordered steps, produced from a single analysed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub object_name: String,
    pub issue_diagnosis: String,
    pub steps: Vec<RepairStep>,
}

/// Result of checking the user's work against the current step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub completed: bool,
    /// Always present; only logged when `completed` is true.
    pub feedback: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentStatus {
    Good,
    Damaged,
    Unknown,
}

/// What the oracle says about the part under a tap point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    pub function: String,
    pub status: ComponentStatus,
    pub details: String,
}

// ── Wire request ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleOperation {
    PlanFromImage,
    VerifyStep,
    IdentifyComponent,
    AnswerQuestion,
}

impl OracleOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanFromImage => "plan_from_image",
            Self::VerifyStep => "verify_step",
            Self::IdentifyComponent => "identify_component",
            Self::AnswerQuestion => "answer_question",
        }
    }
}

/// A single oracle round trip. Optional fields are omitted from the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub operation: OracleOperation,
    /// Base64-encoded JPEG.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Base64-encoded WAV.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Percent coordinates (0–100), never a 0–1 cue box.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<NormalizedPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_context: Option<String>,
}

impl OracleRequest {
    pub fn new(operation: OracleOperation) -> Self {
        Self {
            operation,
            image: None,
            audio: None,
            text: None,
            point: None,
            object_context: None,
        }
    }
}

/// Error type for AI operations
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("Connection failed: {0}")]
    ConnectionError(String),
    #[error("Authentication failed: {0}")]
    AuthError(String),
    #[error("Rate limited — retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("Model error: {0}")]
    ModelError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Diagnosis failed: {0}")]
    DiagnosisFailed(String),
}
