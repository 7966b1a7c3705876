// frame.rs — Snapshots the live video buffer into a JPEG still, base64-encoded
// for transfer to the oracle. The still keeps the source's native resolution;
// only the JPEG quality trades size for fidelity.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{now_iso, CaptureError, MediaStream, VideoFrame};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

// ── Captured frame ──────────────────────────────────────────────────────
/// A still image taken from the live feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedFrame {
    /// Process-unique id; two captures never share one.
    pub id: u64,
    /// Base64-encoded JPEG image data
    pub data: String,
    pub width: u32,
    pub height: u32,
    /// ISO-8601 timestamp of when the frame was captured
    pub captured_at: String,
}

// ── FrameCapture ────────────────────────────────────────────────────────
/// Stateless snapshotter; holds only the encoder setting.
#[derive(Debug, Clone)]
pub struct FrameCapture {
    /// JPEG compression quality (1–100).
    jpeg_quality: u8,
}

impl Default for FrameCapture {
    fn default() -> Self {
        Self::new(80)
    }
}

impl FrameCapture {
    pub fn new(jpeg_quality: u8) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Snapshot whatever the stream is showing right now.
    ///
    /// Returns [`CaptureError::FrameUnavailable`] when the source has no frame
    /// yet; callers treat that as a no-op.
    pub fn capture(&self, stream: &dyn MediaStream) -> Result<CapturedFrame, CaptureError> {
        if !stream.is_active() {
            return Err(CaptureError::FrameUnavailable);
        }
        let frame = stream.current_frame().ok_or(CaptureError::FrameUnavailable)?;
        self.encode(frame)
    }

    /// JPEG-encode and base64-encode a raw frame.
    pub fn encode(&self, frame: VideoFrame) -> Result<CapturedFrame, CaptureError> {
        let VideoFrame { width, height, rgba } = frame;
        if width == 0 || height == 0 {
            return Err(CaptureError::FrameUnavailable);
        }
        let raw = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
            CaptureError::Encode(format!("buffer does not match {}x{} RGBA", width, height))
        })?;
        let img = DynamicImage::ImageRgba8(raw);

        let mut jpeg_buf: Vec<u8> = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_buf, self.jpeg_quality);
            encoder
                .encode(img.to_rgb8().as_raw(), width, height, image::ExtendedColorType::Rgb8)
                .map_err(|e| CaptureError::Encode(format!("jpeg encode: {e}")))?;
        }

        let id = NEXT_FRAME_ID.fetch_add(1, Ordering::SeqCst);
        log::debug!(
            "Captured frame #{} ({}x{}, {} bytes jpeg)",
            id,
            width,
            height,
            jpeg_buf.len()
        );

        Ok(CapturedFrame {
            id,
            data: BASE64.encode(&jpeg_buf),
            width,
            height,
            captured_at: now_iso(),
        })
    }
}
