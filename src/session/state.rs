// state.rs — The repair session aggregate and its transition table.
//
// `Session::apply` is the only way session state changes. Every asynchronous
// oracle call is issued through an action that hands back a `Ticket`; the
// result comes back through another action carrying that ticket, and is
// dropped as stale unless the ticket is still the one in flight.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::ai::{ComponentInfo, RepairPlan, RepairStep};
use crate::capture::CapturedFrame;
use crate::geometry::NormalizedPoint;

// ── States ──────────────────────────────────────────────────────────────

/// Where the user is in the repair flow.
///
/// ```text
/// Intro ─▶ CameraReady ─▶ Analyzing ─▶ RepairGuide ⇄ Verifying
///                                        RepairGuide ⇄ Inspecting
///                                        RepairGuide ─▶ Completed
/// any ─▶ Error          Error / Completed ─reset─▶ CameraReady
///                       (─reset─▶ Intro when no stream was acquired)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Intro,
    CameraReady,
    Analyzing,
    RepairGuide,
    Verifying,
    Inspecting,
    Completed,
    Error,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::CameraReady => "camera ready",
            Self::Analyzing => "analyzing",
            Self::RepairGuide => "repair guide",
            Self::Verifying => "verifying",
            Self::Inspecting => "inspecting",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Tickets ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PendingOp {
    Scan,
    Verify,
    Inspect,
    Answer,
}

/// Generation marker captured when an oracle call is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ticket {
    pub id: u64,
    pub op: PendingOp,
    /// Step cursor at issuance.
    pub step: usize,
}

// ── Sub-state ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inspector {
    pub point: NormalizedPoint,
    /// `None` while the identify call is outstanding (or failed).
    pub component_info: Option<ComponentInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assistant {
    pub is_listening: bool,
    pub last_response_text: Option<String>,
}

// ── Actions ─────────────────────────────────────────────────────────────

/// Everything that can happen to a session.
#[derive(Debug, Clone)]
pub enum Action {
    StreamAcquired,
    StreamFailed { message: String },
    ScanIssued { frame: Arc<CapturedFrame> },
    PlanReady { ticket: Ticket, plan: Arc<RepairPlan> },
    PlanFailed { ticket: Ticket, message: String },
    VerifyIssued,
    VerifyCaptureFailed { ticket: Ticket },
    VerifyPassed { ticket: Ticket },
    VerifyRejected { ticket: Ticket, feedback: String, frame: Arc<CapturedFrame> },
    VerifyFailed { ticket: Ticket, message: String },
    AdvanceStep,
    InspectOpened { point: NormalizedPoint },
    InspectFrameCaptured { ticket: Ticket, frame: Arc<CapturedFrame> },
    InspectCaptureFailed { ticket: Ticket },
    ComponentIdentified { ticket: Ticket, info: ComponentInfo },
    IdentifyFailed { ticket: Ticket },
    InspectorClosed,
    ListeningStarted,
    ListeningStopped,
    AnswerIssued,
    AnswerReady { ticket: Ticket, text: String },
    Reset,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamAcquired => "stream_acquired",
            Self::StreamFailed { .. } => "stream_failed",
            Self::ScanIssued { .. } => "scan",
            Self::PlanReady { .. } => "plan_ready",
            Self::PlanFailed { .. } => "plan_failed",
            Self::VerifyIssued => "verify",
            Self::VerifyCaptureFailed { .. } => "verify_capture_failed",
            Self::VerifyPassed { .. } => "verify_passed",
            Self::VerifyRejected { .. } => "verify_rejected",
            Self::VerifyFailed { .. } => "verify_failed",
            Self::AdvanceStep => "advance_step",
            Self::InspectOpened { .. } => "inspect",
            Self::InspectFrameCaptured { .. } => "inspect_frame",
            Self::InspectCaptureFailed { .. } => "inspect_capture_failed",
            Self::ComponentIdentified { .. } => "component_identified",
            Self::IdentifyFailed { .. } => "identify_failed",
            Self::InspectorClosed => "close_inspector",
            Self::ListeningStarted => "start_listening",
            Self::ListeningStopped => "stop_listening",
            Self::AnswerIssued => "ask",
            Self::AnswerReady { .. } => "answer_ready",
            Self::Reset => "reset",
        }
    }

    fn ticket(&self) -> Option<Ticket> {
        match self {
            Self::PlanReady { ticket, .. }
            | Self::PlanFailed { ticket, .. }
            | Self::VerifyCaptureFailed { ticket }
            | Self::VerifyPassed { ticket }
            | Self::VerifyRejected { ticket, .. }
            | Self::VerifyFailed { ticket, .. }
            | Self::InspectFrameCaptured { ticket, .. }
            | Self::InspectCaptureFailed { ticket }
            | Self::ComponentIdentified { ticket, .. }
            | Self::IdentifyFailed { ticket }
            | Self::AnswerReady { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }
}

/// What `apply` did with an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// An oracle call may now be made; its result must carry this ticket.
    Issued(Ticket),
    /// The action answered a call that is no longer in flight; ignored.
    Stale,
}

/// The action is not valid in the current state. Nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected {
    pub action: &'static str,
    pub state: SessionState,
}

// ── Session ─────────────────────────────────────────────────────────────

/// The single live repair attempt.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    plan: Option<Arc<RepairPlan>>,
    step_cursor: usize,
    frozen_frame: Option<Arc<CapturedFrame>>,
    inspector: Option<Inspector>,
    assistant: Assistant,
    error_message: Option<String>,
    /// The scan/verify/identify call currently allowed to land.
    in_flight: Option<Ticket>,
    /// The assistant question currently allowed to land.
    answer_in_flight: Option<Ticket>,
    next_ticket: u64,
    /// A media stream was acquired and is still held.
    has_stream: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Intro,
            plan: None,
            step_cursor: 0,
            frozen_frame: None,
            inspector: None,
            assistant: Assistant::default(),
            error_message: None,
            in_flight: None,
            answer_in_flight: None,
            next_ticket: 1,
            has_stream: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plan(&self) -> Option<&Arc<RepairPlan>> {
        self.plan.as_ref()
    }

    pub fn step_cursor(&self) -> usize {
        self.step_cursor
    }

    pub fn current_step(&self) -> Option<&RepairStep> {
        self.plan.as_ref()?.steps.get(self.step_cursor)
    }

    pub fn frozen_frame(&self) -> Option<&Arc<CapturedFrame>> {
        self.frozen_frame.as_ref()
    }

    pub fn inspector(&self) -> Option<&Inspector> {
        self.inspector.as_ref()
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// True while `ticket` is the call whose result may still be applied:
    /// it has not been superseded and the session is still on its step.
    pub fn is_current(&self, ticket: Ticket) -> bool {
        let slot = match ticket.op {
            PendingOp::Answer => self.answer_in_flight,
            _ => self.in_flight,
        };
        slot == Some(ticket) && ticket.step == self.step_cursor
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            plan: self.plan.clone(),
            step_cursor: self.step_cursor,
            frozen_frame: self.frozen_frame.clone(),
            inspector: self.inspector.clone(),
            assistant: self.assistant.clone(),
            error_message: self.error_message.clone(),
        }
    }

    /// Apply one action. This is the only mutation path.
    pub fn apply(&mut self, action: Action) -> Result<Outcome, Rejected> {
        use SessionState::*;

        if let Some(ticket) = action.ticket() {
            if !self.is_current(ticket) {
                log::warn!(
                    "Discarding stale {} (ticket #{}, state {})",
                    action.name(),
                    ticket.id,
                    self.state
                );
                return Ok(Outcome::Stale);
            }
        }

        let rejected = Rejected {
            action: action.name(),
            state: self.state,
        };
        let has_plan = self.plan.is_some();

        let outcome = match (self.state, action) {
            (Intro, Action::StreamAcquired) => {
                self.has_stream = true;
                self.state = CameraReady;
                Outcome::Applied
            }
            (Intro, Action::StreamFailed { message }) => {
                self.fail(message);
                Outcome::Applied
            }

            (CameraReady, Action::ScanIssued { frame }) => {
                let ticket = self.issue(PendingOp::Scan);
                self.frozen_frame = Some(frame);
                self.state = Analyzing;
                Outcome::Issued(ticket)
            }
            (Analyzing, Action::PlanReady { plan, .. }) => {
                if plan.steps.is_empty() {
                    self.in_flight = None;
                    self.fail("The repair plan has no steps".into());
                } else {
                    self.in_flight = None;
                    self.plan = Some(plan);
                    self.step_cursor = 0;
                    self.frozen_frame = None;
                    self.state = RepairGuide;
                }
                Outcome::Applied
            }
            (Analyzing, Action::PlanFailed { message, .. }) => {
                // The rejected frame stays frozen behind the error panel.
                self.in_flight = None;
                self.fail(message);
                Outcome::Applied
            }

            (RepairGuide, Action::VerifyIssued) if has_plan => {
                self.frozen_frame = None;
                let ticket = self.issue(PendingOp::Verify);
                self.state = Verifying;
                Outcome::Issued(ticket)
            }
            (Verifying, Action::VerifyCaptureFailed { .. }) => {
                self.in_flight = None;
                self.state = RepairGuide;
                Outcome::Applied
            }
            (Verifying, Action::VerifyPassed { .. }) => {
                self.in_flight = None;
                self.advance();
                Outcome::Applied
            }
            (Verifying, Action::VerifyRejected { feedback, frame, .. }) => {
                self.in_flight = None;
                self.assistant.last_response_text = Some(feedback);
                self.frozen_frame = Some(frame);
                self.state = RepairGuide;
                Outcome::Applied
            }
            (Verifying, Action::VerifyFailed { message, .. }) => {
                self.in_flight = None;
                self.fail(message);
                Outcome::Applied
            }

            (RepairGuide, Action::AdvanceStep) if has_plan => {
                self.advance();
                Outcome::Applied
            }

            (RepairGuide | Inspecting, Action::InspectOpened { point }) if has_plan => {
                // A re-tap replaces the open inspector; the earlier call's
                // ticket is superseded.
                let ticket = self.issue(PendingOp::Inspect);
                self.inspector = Some(Inspector {
                    point,
                    component_info: None,
                });
                self.state = Inspecting;
                Outcome::Issued(ticket)
            }
            (Inspecting, Action::InspectFrameCaptured { frame, .. }) => {
                self.frozen_frame = Some(frame);
                Outcome::Applied
            }
            (Inspecting, Action::InspectCaptureFailed { .. }) => {
                self.in_flight = None;
                self.inspector = None;
                self.state = RepairGuide;
                Outcome::Applied
            }
            (Inspecting, Action::ComponentIdentified { info, .. }) => {
                self.in_flight = None;
                if let Some(inspector) = self.inspector.as_mut() {
                    inspector.component_info = Some(info);
                }
                Outcome::Applied
            }
            (Inspecting, Action::IdentifyFailed { .. }) => {
                // Fail closed: the card keeps its loading state.
                self.in_flight = None;
                Outcome::Applied
            }
            (Inspecting, Action::InspectorClosed) => {
                self.in_flight = None;
                self.inspector = None;
                self.frozen_frame = None;
                self.state = RepairGuide;
                Outcome::Applied
            }

            (RepairGuide | Inspecting, Action::ListeningStarted) => {
                self.assistant.is_listening = true;
                Outcome::Applied
            }
            (_, Action::ListeningStopped) => {
                self.assistant.is_listening = false;
                Outcome::Applied
            }
            (RepairGuide | Inspecting | Verifying, Action::AnswerIssued) if has_plan => {
                let ticket = self.issue(PendingOp::Answer);
                Outcome::Issued(ticket)
            }
            (RepairGuide | Inspecting | Verifying, Action::AnswerReady { text, .. }) => {
                self.answer_in_flight = None;
                self.assistant.last_response_text = Some(text);
                Outcome::Applied
            }

            (Completed | Error, Action::Reset) => {
                self.plan = None;
                self.step_cursor = 0;
                self.frozen_frame = None;
                self.inspector = None;
                self.assistant = Assistant::default();
                self.error_message = None;
                self.in_flight = None;
                self.answer_in_flight = None;
                // Without a stream the user has to grant access again.
                self.state = if self.has_stream { CameraReady } else { Intro };
                Outcome::Applied
            }

            _ => return Err(rejected),
        };

        self.check_invariants();
        Ok(outcome)
    }

    fn issue(&mut self, op: PendingOp) -> Ticket {
        let ticket = Ticket {
            id: self.next_ticket,
            op,
            step: self.step_cursor,
        };
        self.next_ticket += 1;
        match op {
            PendingOp::Answer => self.answer_in_flight = Some(ticket),
            _ => self.in_flight = Some(ticket),
        }
        ticket
    }

    /// Move to the next step, or finish on the last one.
    fn advance(&mut self) {
        self.assistant.last_response_text = None;
        self.frozen_frame = None;
        self.answer_in_flight = None;
        let len = self.plan.as_ref().map_or(0, |p| p.steps.len());
        if self.step_cursor + 1 < len {
            self.step_cursor += 1;
            self.state = SessionState::RepairGuide;
        } else {
            self.assistant.is_listening = false;
            self.state = SessionState::Completed;
        }
    }

    fn fail(&mut self, message: String) {
        self.state = SessionState::Error;
        self.error_message = Some(message);
        self.inspector = None;
        self.in_flight = None;
        self.answer_in_flight = None;
        self.assistant.is_listening = false;
    }

    fn check_invariants(&self) {
        if let Some(plan) = &self.plan {
            debug_assert!(
                self.step_cursor < plan.steps.len(),
                "step cursor {} out of bounds",
                self.step_cursor
            );
        }
        debug_assert_eq!(
            self.inspector.is_some(),
            self.state == SessionState::Inspecting,
            "inspector present outside Inspecting"
        );
        debug_assert!(
            !matches!(
                self.state,
                SessionState::Intro | SessionState::CameraReady | SessionState::Verifying
            ) || self.frozen_frame.is_none(),
            "frozen frame shown in {}",
            self.state
        );
        debug_assert_eq!(
            self.error_message.is_some(),
            self.state == SessionState::Error
        );
    }
}

/// Owned copy of the session for UIs and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub plan: Option<Arc<RepairPlan>>,
    pub step_cursor: usize,
    pub frozen_frame: Option<Arc<CapturedFrame>>,
    pub inspector: Option<Inspector>,
    pub assistant: Assistant,
    pub error_message: Option<String>,
}

impl SessionSnapshot {
    pub fn current_step(&self) -> Option<&RepairStep> {
        self.plan.as_ref()?.steps.get(self.step_cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ComponentStatus, CueType, VisualCue};
    use crate::geometry::NormalizedBox;

    fn frame(id: u64) -> Arc<CapturedFrame> {
        Arc::new(CapturedFrame {
            id,
            data: format!("frame-{id}"),
            width: 4,
            height: 4,
            captured_at: "2026-01-01T00:00:00.000Z".into(),
        })
    }

    fn plan(steps: usize) -> Arc<RepairPlan> {
        Arc::new(RepairPlan {
            object_name: "Lamp".into(),
            issue_diagnosis: "Loose bulb".into(),
            steps: (0..steps)
                .map(|i| RepairStep {
                    id: i as u32 + 1,
                    title: format!("Step {}", i + 1),
                    instruction: format!("Do thing {}", i + 1),
                    visual_cue: VisualCue {
                        kind: CueType::Box,
                        coordinates: NormalizedBox { xmin: 0.1, ymin: 0.1, xmax: 0.2, ymax: 0.2 },
                        label: None,
                        direction: None,
                    },
                    tool_needed: None,
                    safety_warning: None,
                })
                .collect(),
        })
    }

    fn issued(outcome: Outcome) -> Ticket {
        match outcome {
            Outcome::Issued(t) => t,
            other => panic!("expected Issued, got {:?}", other),
        }
    }

    /// Session sitting in RepairGuide with a plan of `steps` steps.
    fn guided(steps: usize) -> Session {
        let mut s = Session::new();
        s.apply(Action::StreamAcquired).unwrap();
        let t = issued(s.apply(Action::ScanIssued { frame: frame(1) }).unwrap());
        s.apply(Action::PlanReady { ticket: t, plan: plan(steps) }).unwrap();
        s
    }

    fn info(name: &str) -> ComponentInfo {
        ComponentInfo {
            name: name.into(),
            function: "f".into(),
            status: ComponentStatus::Good,
            details: "d".into(),
        }
    }

    #[test]
    fn scan_freezes_frame_until_plan_arrives() {
        let mut s = Session::new();
        s.apply(Action::StreamAcquired).unwrap();
        let t = issued(s.apply(Action::ScanIssued { frame: frame(7) }).unwrap());
        assert_eq!(s.state(), SessionState::Analyzing);
        assert_eq!(s.frozen_frame().unwrap().id, 7);

        s.apply(Action::PlanReady { ticket: t, plan: plan(2) }).unwrap();
        assert_eq!(s.state(), SessionState::RepairGuide);
        assert_eq!(s.step_cursor(), 0);
        assert!(s.frozen_frame().is_none());
    }

    #[test]
    fn failed_scan_keeps_frame_behind_error() {
        let mut s = Session::new();
        s.apply(Action::StreamAcquired).unwrap();
        let t = issued(s.apply(Action::ScanIssued { frame: frame(3) }).unwrap());
        s.apply(Action::PlanFailed { ticket: t, message: "nope".into() }).unwrap();
        assert_eq!(s.state(), SessionState::Error);
        assert_eq!(s.error_message(), Some("nope"));
        assert_eq!(s.frozen_frame().unwrap().id, 3);
    }

    #[test]
    fn scan_is_rejected_outside_camera_ready() {
        let mut s = Session::new();
        let err = s.apply(Action::ScanIssued { frame: frame(1) }).unwrap_err();
        assert_eq!(err.state, SessionState::Intro);
        assert_eq!(err.action, "scan");
        assert!(s.frozen_frame().is_none());
    }

    #[test]
    fn advancing_walks_to_completion() {
        let mut s = guided(3);
        s.apply(Action::AdvanceStep).unwrap();
        s.apply(Action::AdvanceStep).unwrap();
        assert_eq!(s.step_cursor(), 2);
        assert_eq!(s.state(), SessionState::RepairGuide);
        s.apply(Action::AdvanceStep).unwrap();
        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(s.step_cursor(), 2);
        assert!(s.apply(Action::AdvanceStep).is_err());
    }

    #[test]
    fn rejected_verification_keeps_cursor_and_freezes_checked_frame() {
        let mut s = guided(2);
        let t = issued(s.apply(Action::VerifyIssued).unwrap());
        assert!(s.frozen_frame().is_none());
        s.apply(Action::VerifyRejected {
            ticket: t,
            feedback: "loose screw".into(),
            frame: frame(9),
        })
        .unwrap();
        assert_eq!(s.state(), SessionState::RepairGuide);
        assert_eq!(s.step_cursor(), 0);
        assert_eq!(s.assistant().last_response_text.as_deref(), Some("loose screw"));
        assert_eq!(s.frozen_frame().unwrap().id, 9);

        // The next verification starts from the live feed again.
        issued(s.apply(Action::VerifyIssued).unwrap());
        assert!(s.frozen_frame().is_none());
    }

    #[test]
    fn verification_pass_clears_feedback() {
        let mut s = guided(2);
        let t = issued(s.apply(Action::VerifyIssued).unwrap());
        s.apply(Action::VerifyRejected { ticket: t, feedback: "no".into(), frame: frame(2) })
            .unwrap();
        let t = issued(s.apply(Action::VerifyIssued).unwrap());
        s.apply(Action::VerifyPassed { ticket: t }).unwrap();
        assert_eq!(s.step_cursor(), 1);
        assert!(s.assistant().last_response_text.is_none());
    }

    #[test]
    fn retap_supersedes_earlier_identify() {
        let mut s = guided(1);
        let first = issued(s.apply(Action::InspectOpened { point: NormalizedPoint { x: 10.0, y: 10.0 } }).unwrap());
        let second = issued(s.apply(Action::InspectOpened { point: NormalizedPoint { x: 90.0, y: 90.0 } }).unwrap());
        assert_ne!(first, second);

        assert_eq!(
            s.apply(Action::ComponentIdentified { ticket: first, info: info("old") }).unwrap(),
            Outcome::Stale
        );
        assert!(s.inspector().unwrap().component_info.is_none());

        s.apply(Action::ComponentIdentified { ticket: second, info: info("new") }).unwrap();
        let inspector = s.inspector().unwrap();
        assert_eq!(inspector.point, NormalizedPoint { x: 90.0, y: 90.0 });
        assert_eq!(inspector.component_info.as_ref().unwrap().name, "new");
    }

    #[test]
    fn late_identify_after_close_is_discarded() {
        let mut s = guided(1);
        let t = issued(s.apply(Action::InspectOpened { point: NormalizedPoint { x: 5.0, y: 5.0 } }).unwrap());
        s.apply(Action::InspectFrameCaptured { ticket: t, frame: frame(4) }).unwrap();
        s.apply(Action::InspectorClosed).unwrap();
        assert!(s.frozen_frame().is_none());

        assert_eq!(
            s.apply(Action::ComponentIdentified { ticket: t, info: info("late") }).unwrap(),
            Outcome::Stale
        );
        assert_eq!(s.state(), SessionState::RepairGuide);
        assert!(s.inspector().is_none());
    }

    #[test]
    fn inspect_capture_failure_reverts_to_guide() {
        let mut s = guided(1);
        let t = issued(s.apply(Action::InspectOpened { point: NormalizedPoint { x: 5.0, y: 5.0 } }).unwrap());
        s.apply(Action::InspectCaptureFailed { ticket: t }).unwrap();
        assert_eq!(s.state(), SessionState::RepairGuide);
        assert!(s.inspector().is_none());
    }

    #[test]
    fn inspect_is_ignored_while_verifying() {
        let mut s = guided(1);
        s.apply(Action::VerifyIssued).unwrap();
        assert!(s
            .apply(Action::InspectOpened { point: NormalizedPoint { x: 1.0, y: 1.0 } })
            .is_err());
        assert_eq!(s.state(), SessionState::Verifying);
    }

    #[test]
    fn reset_clears_everything_but_keeps_camera_ready() {
        let mut s = Session::new();
        s.apply(Action::StreamAcquired).unwrap();
        let t = issued(s.apply(Action::ScanIssued { frame: frame(1) }).unwrap());
        s.apply(Action::PlanFailed { ticket: t, message: "bad".into() }).unwrap();

        s.apply(Action::Reset).unwrap();
        assert_eq!(s.state(), SessionState::CameraReady);
        assert!(s.error_message().is_none());
        assert!(s.plan().is_none());
        assert!(s.frozen_frame().is_none());
        assert_eq!(s.step_cursor(), 0);
    }

    #[test]
    fn reset_is_rejected_mid_guide() {
        let mut s = guided(2);
        assert!(s.apply(Action::Reset).is_err());
    }

    #[test]
    fn answer_after_reset_is_stale() {
        let mut s = guided(1);
        let t = issued(s.apply(Action::AnswerIssued).unwrap());
        s.apply(Action::AdvanceStep).unwrap();
        s.apply(Action::Reset).unwrap();
        assert_eq!(
            s.apply(Action::AnswerReady { ticket: t, text: "late".into() }).unwrap(),
            Outcome::Stale
        );
        assert!(s.assistant().last_response_text.is_none());
    }

    #[test]
    fn reset_without_a_stream_returns_to_intro() {
        let mut s = Session::new();
        s.apply(Action::StreamFailed { message: "denied".into() }).unwrap();
        assert_eq!(s.state(), SessionState::Error);
        s.apply(Action::Reset).unwrap();
        assert_eq!(s.state(), SessionState::Intro);

        s.apply(Action::StreamAcquired).unwrap();
        assert_eq!(s.state(), SessionState::CameraReady);
    }

    #[test]
    fn answer_from_an_earlier_step_is_stale() {
        let mut s = guided(3);
        let t = issued(s.apply(Action::AnswerIssued).unwrap());
        s.apply(Action::AdvanceStep).unwrap();
        assert!(!s.is_current(t));
        assert_eq!(
            s.apply(Action::AnswerReady { ticket: t, text: "about step 1".into() }).unwrap(),
            Outcome::Stale
        );
        assert_eq!(s.step_cursor(), 1);
        assert!(s.assistant().last_response_text.is_none());
    }

    #[test]
    fn completing_stops_listening() {
        let mut s = guided(1);
        s.apply(Action::ListeningStarted).unwrap();
        s.apply(Action::AdvanceStep).unwrap();
        assert_eq!(s.state(), SessionState::Completed);
        assert!(!s.assistant().is_listening);
    }
}
