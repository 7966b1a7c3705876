// orchestrator.rs — Drives one repair session end to end.
//
// The orchestrator owns the media stream, the oracle gateway, the voice
// pipeline and the speaker. Every user action and every oracle result goes
// through `Session::apply`; results whose ticket has been superseded are
// dropped there. No lock is held across an `.await`.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

use super::error::SessionError;
use super::events::{SessionEvent, SessionEventKind};
use super::state::{Action, Outcome, Rejected, Session, SessionSnapshot, SessionState};
use crate::ai::{CueType, OracleGateway, OracleTransport};
use crate::capture::voice::encode_clip;
use crate::capture::{
    CaptureError, CapturedFrame, FrameCapture, MediaConstraints, MediaDevices, MediaStream,
    VoiceError, VoicePipeline,
};
use crate::geometry::{map_to_container, ContainerRect, PixelRect, PointerInput};
use crate::settings::Settings;
use crate::speech::{Speaker, SpeechSynthesizer};

/// Spoken and shown when a question could not be answered.
pub const ANSWER_FALLBACK: &str = "Sorry, I couldn't answer that. Try asking again.";

const EVENT_CAPACITY: usize = 64;

// ── Configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub jpeg_quality: u8,
    /// Pause before a verification capture so the camera can settle.
    pub verify_settle: Duration,
    pub constraints: MediaConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 80,
            verify_settle: Duration::from_millis(1500),
            constraints: MediaConstraints::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            jpeg_quality: settings.jpeg_quality,
            verify_settle: Duration::from_millis(settings.verify_settle_ms),
            constraints: MediaConstraints::default(),
        }
    }
}

// ── Overlay ─────────────────────────────────────────────────────────────

/// Renderer input for the active step's visual cue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CueOverlay {
    pub kind: CueType,
    pub label: Option<String>,
    pub direction: Option<String>,
    /// Placement inside the display container.
    pub rect: PixelRect,
    /// Centre of the cue in container pixels; where a `point` cue is drawn.
    pub anchor: (f64, f64),
}

// ── RepairSession ───────────────────────────────────────────────────────

pub struct RepairSession {
    session: Mutex<Session>,
    devices: Arc<dyn MediaDevices>,
    stream: Mutex<Option<Arc<dyn MediaStream>>>,
    gateway: OracleGateway,
    frames: FrameCapture,
    voice: Mutex<VoicePipeline>,
    speaker: Speaker,
    config: SessionConfig,
    events: broadcast::Sender<SessionEvent>,
}

impl RepairSession {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        transport: Arc<dyn OracleTransport>,
        speech: Arc<dyn SpeechSynthesizer>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let gateway = OracleGateway::new(transport);
        log::info!(
            "RepairSession: oracle={}, settle={:?}, jpeg quality={}",
            gateway.provider_name(),
            config.verify_settle,
            config.jpeg_quality
        );
        Self {
            session: Mutex::new(Session::new()),
            devices,
            stream: Mutex::new(None),
            gateway,
            frames: FrameCapture::new(config.jpeg_quality),
            voice: Mutex::new(VoicePipeline::new()),
            speaker: Speaker::new(speech),
            config,
            events,
        }
    }

    // ── Observation ─────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.lock_session().state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock_session().snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Where to draw the active step's cue in a `width` x `height` container.
    ///
    /// Only the guide screen shows a cue, and a `none` cue draws nothing.
    pub fn overlay(&self, width: f64, height: f64) -> Option<CueOverlay> {
        let session = self.lock_session();
        if session.state() != SessionState::RepairGuide {
            return None;
        }
        let cue = &session.current_step()?.visual_cue;
        if cue.kind == CueType::None {
            return None;
        }
        let (cx, cy) = cue.coordinates.center();
        Some(CueOverlay {
            kind: cue.kind,
            label: cue.label.clone(),
            direction: cue.direction.clone(),
            rect: cue.coordinates.to_pixels(width, height),
            anchor: (cx * width, cy * height),
        })
    }

    // ── Camera ──────────────────────────────────────────────────────────

    /// Acquire the camera (and microphone) stream. INTRO → CAMERA_READY.
    ///
    /// The stream is held for the life of the session; `reset` keeps it.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.ensure("start", &[SessionState::Intro])?;
        match self.devices.acquire(&self.config.constraints).await {
            Ok(stream) => {
                let mut slot = self.lock_stream();
                if let Err(r) = self.commit(Action::StreamAcquired) {
                    drop(slot);
                    stream.stop();
                    return Err(r.into());
                }
                *slot = Some(stream);
                Ok(())
            }
            Err(e) => {
                log::error!("Media acquisition failed: {}", e);
                let err = match e {
                    CaptureError::PermissionDenied(m)
                    | CaptureError::NoDevice(m)
                    | CaptureError::Stream(m) => SessionError::PermissionDenied(m),
                    other => SessionError::PermissionDenied(other.to_string()),
                };
                self.commit(Action::StreamFailed {
                    message: err.to_string(),
                })?;
                Err(err)
            }
        }
    }

    /// Freeze the current frame and ask the oracle for a repair plan.
    ///
    /// A missing frame is a no-op. An oracle failure moves the session to
    /// ERROR with the analysed frame still frozen.
    pub async fn scan(&self) -> Result<(), SessionError> {
        self.ensure("scan", &[SessionState::CameraReady])?;
        let frame = match self.capture_frame() {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Scan skipped: {}", e);
                return Ok(());
            }
        };
        let Outcome::Issued(ticket) = self.commit(Action::ScanIssued {
            frame: Arc::clone(&frame),
        })?
        else {
            return Ok(());
        };
        log::info!(
            "Scan #{}: frame {} ({}x{})",
            ticket.id,
            frame.id,
            frame.width,
            frame.height
        );

        match self.gateway.plan_from_image(&frame.data).await {
            Ok(plan) => {
                let object_name = plan.object_name.clone();
                let steps = plan.steps.len();
                let action = Action::PlanReady {
                    ticket,
                    plan: Arc::new(plan),
                };
                if self.commit(action)? == Outcome::Applied {
                    self.emit(SessionEventKind::PlanReady { object_name, steps });
                }
                Ok(())
            }
            Err(e) => {
                let err = SessionError::from(e);
                log::error!("Scan #{} failed: {}", ticket.id, err);
                let action = Action::PlanFailed {
                    ticket,
                    message: err.to_string(),
                };
                match self.commit(action)? {
                    Outcome::Applied => Err(err),
                    _ => Ok(()),
                }
            }
        }
    }

    // ── Guide ───────────────────────────────────────────────────────────

    /// Check the current step against a fresh frame.
    ///
    /// Waits for the camera to settle, captures, and asks the oracle. A pass
    /// advances; a rejection keeps the step and freezes the checked frame
    /// with the oracle's feedback; an oracle error is fatal.
    pub async fn verify_current_step(&self) -> Result<(), SessionError> {
        let (outcome, instruction) = self.commit_with(Action::VerifyIssued, |s| {
            s.current_step()
                .map(|step| step.instruction.clone())
                .unwrap_or_default()
        })?;
        let Outcome::Issued(ticket) = outcome else {
            return Ok(());
        };
        log::info!(
            "Verify #{}: step {} (settling {:?})",
            ticket.id,
            ticket.step + 1,
            self.config.verify_settle
        );

        tokio::time::sleep(self.config.verify_settle).await;
        if !self.lock_session().is_current(ticket) {
            return Ok(());
        }

        let frame = match self.capture_frame() {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Verify #{}: no frame ({}), back to guide", ticket.id, e);
                self.commit(Action::VerifyCaptureFailed { ticket })?;
                return Ok(());
            }
        };

        match self.gateway.verify_step(&frame.data, &instruction).await {
            Ok(result) if result.completed => {
                log::info!("Verify #{}: passed ({})", ticket.id, result.feedback);
                if self.commit(Action::VerifyPassed { ticket })? == Outcome::Applied {
                    self.announce_step();
                }
                Ok(())
            }
            Ok(result) => {
                log::info!("Verify #{}: not yet ({})", ticket.id, result.feedback);
                let feedback = result.feedback;
                let action = Action::VerifyRejected {
                    ticket,
                    feedback: feedback.clone(),
                    frame,
                };
                if self.commit(action)? == Outcome::Applied {
                    self.speaker.speak(&feedback);
                    self.emit(SessionEventKind::AssistantMessage { text: feedback });
                }
                Ok(())
            }
            Err(e) => {
                let err = SessionError::from(e);
                log::error!("Verify #{} failed: {}", ticket.id, err);
                let action = Action::VerifyFailed {
                    ticket,
                    message: err.to_string(),
                };
                match self.commit(action)? {
                    Outcome::Applied => Err(err),
                    _ => Ok(()),
                }
            }
        }
    }

    /// Skip to the next step without verification.
    pub fn advance_step(&self) -> Result<(), SessionError> {
        self.commit(Action::AdvanceStep)?;
        self.announce_step();
        Ok(())
    }

    // ── Inspector ───────────────────────────────────────────────────────

    /// Identify whatever the user tapped.
    ///
    /// The tap is resolved against the frame on screen: the frozen frame if
    /// there is one, otherwise a fresh capture that becomes frozen.
    pub async fn inspect(
        &self,
        input: &PointerInput,
        container: &ContainerRect,
    ) -> Result<(), SessionError> {
        let Some(point) = map_to_container(input, container) else {
            log::debug!("Tap ignored: no usable position");
            return Ok(());
        };

        let (outcome, (frozen, object)) =
            self.commit_with(Action::InspectOpened { point }, |s| {
                let object = s.plan().map(|p| p.object_name.clone()).unwrap_or_default();
                (s.frozen_frame().cloned(), object)
            })?;
        let Outcome::Issued(ticket) = outcome else {
            return Ok(());
        };
        log::info!(
            "Inspect #{} at ({:.1}%, {:.1}%)",
            ticket.id,
            point.x,
            point.y
        );

        let frame = match frozen {
            Some(f) => f,
            None => match self.capture_frame() {
                Ok(f) => {
                    let action = Action::InspectFrameCaptured {
                        ticket,
                        frame: Arc::clone(&f),
                    };
                    if self.commit(action)? == Outcome::Stale {
                        return Ok(());
                    }
                    f
                }
                Err(e) => {
                    log::warn!("Inspect #{}: no frame ({})", ticket.id, e);
                    self.commit(Action::InspectCaptureFailed { ticket })?;
                    return Ok(());
                }
            },
        };

        match self
            .gateway
            .identify_component(&frame.data, point, &object)
            .await
        {
            Ok(info) => {
                let action = Action::ComponentIdentified {
                    ticket,
                    info: info.clone(),
                };
                if self.commit(action)? == Outcome::Applied {
                    self.speaker
                        .speak(&format!("That's the {}. {}", info.name, info.function));
                    self.emit(SessionEventKind::ComponentIdentified { info });
                }
            }
            Err(e) => {
                log::warn!("Inspect #{}: identify failed: {}", ticket.id, e);
                self.commit(Action::IdentifyFailed { ticket })?;
            }
        }
        Ok(())
    }

    pub fn close_inspector(&self) -> Result<(), SessionError> {
        self.commit(Action::InspectorClosed)?;
        Ok(())
    }

    // ── Assistant ───────────────────────────────────────────────────────

    /// Start recording a question. Returns `false` when there is no
    /// microphone to record from.
    pub fn start_listening(&self) -> Result<bool, SessionError> {
        self.ensure(
            "start_listening",
            &[SessionState::RepairGuide, SessionState::Inspecting],
        )?;
        let stream = self.live_stream();
        let started = self.lock_voice().start_listening(stream.as_deref())?;
        if started {
            self.speaker.silence();
            if let Err(r) = self.commit(Action::ListeningStarted) {
                self.lock_voice().cancel();
                return Err(r.into());
            }
        }
        Ok(started)
    }

    /// Stop recording and ask the oracle about the current step.
    ///
    /// Returns the text shown to the user, or `None` when nothing was asked
    /// (not listening, silent clip, no frame) or the answer arrived stale.
    /// Oracle failures are not fatal; the user hears a fallback reply.
    pub async fn stop_listening(&self) -> Result<Option<String>, SessionError> {
        let finished = self.lock_voice().finish_recording();
        let chunks = match finished {
            Ok(chunks) => chunks,
            Err(VoiceError::NotListening) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.commit(Action::ListeningStopped)?;

        let clip = tokio::task::spawn_blocking(move || encode_clip(&chunks))
            .await
            .unwrap_or_else(|e| Err(VoiceError::Encode(e.to_string())));
        self.lock_voice().finish_encoding();
        let clip = match clip {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Question dropped: {}", e);
                return Ok(None);
            }
        };

        let (outcome, (frozen, instruction)) = self.commit_with(Action::AnswerIssued, |s| {
            let instruction = s
                .current_step()
                .map(|step| step.instruction.clone())
                .unwrap_or_default();
            (s.frozen_frame().cloned(), instruction)
        })?;
        let Outcome::Issued(ticket) = outcome else {
            return Ok(None);
        };

        let frame = match frozen {
            Some(f) => f,
            None => match self.capture_frame() {
                Ok(f) => f,
                Err(e) => {
                    log::warn!("Question #{} dropped: no frame ({})", ticket.id, e);
                    return Ok(None);
                }
            },
        };
        log::info!(
            "Question #{}: {} ms of audio",
            ticket.id,
            clip.duration_ms
        );

        let text = match self
            .gateway
            .answer_question(&frame.data, &clip.data, &instruction)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Question #{} failed: {}", ticket.id, e);
                ANSWER_FALLBACK.to_string()
            }
        };

        let action = Action::AnswerReady {
            ticket,
            text: text.clone(),
        };
        if self.commit(action)? != Outcome::Applied {
            return Ok(None);
        }
        self.speaker.speak(&text);
        self.emit(SessionEventKind::AssistantMessage { text: text.clone() });
        Ok(Some(text))
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Start over from COMPLETED or ERROR, keeping the camera stream.
    ///
    /// If no stream was ever acquired (access denied), the session goes back
    /// to INTRO so `start` can ask for the camera again.
    pub fn reset(&self) -> Result<(), SessionError> {
        self.commit(Action::Reset)?;
        self.lock_voice().cancel();
        self.speaker.silence();
        Ok(())
    }

    /// Release the camera and silence speech. Safe to call more than once.
    pub fn shutdown(&self) {
        self.lock_voice().cancel();
        self.speaker.silence();
        if let Some(stream) = self.lock_stream().take() {
            stream.stop();
            log::info!(
                "RepairSession: stream released after {} utterances",
                self.speaker.utterance_count()
            );
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_stream(&self) -> MutexGuard<'_, Option<Arc<dyn MediaStream>>> {
        self.stream.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_voice(&self) -> MutexGuard<'_, VoicePipeline> {
        self.voice.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live_stream(&self) -> Option<Arc<dyn MediaStream>> {
        self.lock_stream().clone()
    }

    fn capture_frame(&self) -> Result<Arc<CapturedFrame>, CaptureError> {
        let stream = self.live_stream().ok_or(CaptureError::FrameUnavailable)?;
        self.frames.capture(&*stream).map(Arc::new)
    }

    fn ensure(&self, op: &'static str, allowed: &[SessionState]) -> Result<(), SessionError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(SessionError::NotAllowed { op, state })
        }
    }

    fn commit(&self, action: Action) -> Result<Outcome, Rejected> {
        self.commit_with(action, |_| ()).map(|(outcome, ())| outcome)
    }

    /// Apply `action`, then read from the updated session under the same
    /// lock. State changes are broadcast after the lock is released.
    fn commit_with<R>(
        &self,
        action: Action,
        read: impl FnOnce(&Session) -> R,
    ) -> Result<(Outcome, R), Rejected> {
        let name = action.name();
        let (from, to, error, outcome, value) = {
            let mut session = self.lock_session();
            let from = session.state();
            let outcome = session.apply(action).inspect_err(|r| {
                log::debug!("Rejected {} in {}", r.action, r.state);
            })?;
            let error = session.error_message().map(str::to_string);
            (from, session.state(), error, outcome, read(&session))
        };

        if from != to {
            log::info!("Session: {} -> {} ({})", from, to, name);
            if matches!(to, SessionState::Error | SessionState::Completed) {
                self.lock_voice().cancel();
            }
            self.emit(SessionEventKind::StateChanged { from, to });
            if let (SessionState::Error, Some(message)) = (to, error) {
                self.emit(SessionEventKind::Error { message });
            }
        }
        Ok((outcome, value))
    }

    /// Broadcast the cursor after a step change that stayed on the guide.
    fn announce_step(&self) {
        let (state, step_cursor) = {
            let session = self.lock_session();
            (session.state(), session.step_cursor())
        };
        if state == SessionState::RepairGuide {
            self.emit(SessionEventKind::StepAdvanced { step_cursor });
        }
    }

    fn emit(&self, kind: SessionEventKind) {
        // No subscribers is fine.
        let _ = self.events.send(SessionEvent::now(kind));
    }
}

impl Drop for RepairSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
