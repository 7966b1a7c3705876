//! The `capture` module handles all media capture for fixlens: the device
//! interfaces the session acquires, still-frame snapshots, and voice clips.
//!
//! Devices themselves (camera, microphone) sit behind [`MediaDevices`] /
//! [`MediaStream`] so the session can run against real hardware or test
//! doubles.
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub mod camera;
pub mod frame;
pub mod microphone;
pub mod voice;

pub use frame::{CapturedFrame, FrameCapture};
pub use voice::{AudioClip, VoiceError, VoicePipeline, VoiceState};

// ── Raw media ───────────────────────────────────────────────────────────

/// One decoded video frame at the source's native resolution.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 pixels, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
}

/// A buffer of raw audio as delivered by the device callback.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

// ── Device interfaces ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, the one pointed at the object being repaired.
    Environment,
    User,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
            audio: true,
        }
    }
}

/// Acquires camera + microphone streams.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, CaptureError>;
}

/// A live camera (+ optional microphone) stream.
///
/// Acquired once per session and held until [`MediaStream::stop`].
pub trait MediaStream: Send + Sync {
    /// The frame currently in the video buffer, or `None` if the source has
    /// not produced one yet.
    fn current_frame(&self) -> Option<VideoFrame>;

    /// The microphone track, if the stream has one.
    fn audio_track(&self) -> Option<Arc<dyn AudioTrack>>;

    /// Release the underlying devices. Idempotent.
    fn stop(&self);

    fn is_active(&self) -> bool;
}

/// A microphone track that can be tapped by any number of recorders.
pub trait AudioTrack: Send + Sync {
    /// Receive every chunk captured from now until the receiver is dropped,
    /// in arrival order.
    fn open_tap(&self) -> mpsc::UnboundedReceiver<AudioChunk>;
}

/// Error type for capture operations
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Camera or microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("No video frame available")]
    FrameUnavailable,
    #[error("No capture device: {0}")]
    NoDevice(String),
    #[error("Encoding failed: {0}")]
    Encode(String),
    #[error("Stream error: {0}")]
    Stream(String),
}

// ── Timestamps ──────────────────────────────────────────────────────────

/// Return the current UTC time as an ISO-8601 string (millisecond precision).
/// Uses `std::time::SystemTime` to avoid adding a chrono dependency.
pub fn now_iso() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let secs = dur.as_secs();
    let t = secs % 86400;
    let (y, m, d) = epoch_days_to_ymd((secs / 86400) as i64);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        y,
        m,
        d,
        t / 3600,
        (t % 3600) / 60,
        t % 60,
        dur.subsec_millis()
    )
}

/// Convert days since Unix epoch (1970-01-01) to (year, month, day).
pub fn epoch_days_to_ymd(mut days: i64) -> (i64, u32, u32) {
    // Shift epoch from 1970-01-01 to 0000-03-01 for easier leap-year math.
    days += 719_468;
    let era = if days >= 0 { days } else { days - 146_096 } / 146_097;
    let doe = (days - era * 146_097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}
