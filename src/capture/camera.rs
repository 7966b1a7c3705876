// camera.rs — Local media devices: a video source plus the cpal microphone,
// combined into one `MediaStream`.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::microphone::CpalMicrophone;
use super::{AudioTrack, CaptureError, MediaConstraints, MediaDevices, MediaStream, VideoFrame};

/// Anything that can report the frame currently in its buffer.
pub trait VideoSource: Send + Sync {
    fn latest_frame(&self) -> Option<VideoFrame>;
}

/// A "camera" that always shows the same photo. Used by the CLI to run a
/// session against a picture of the broken object.
pub struct StillImageCamera {
    frame: VideoFrame,
}

impl StillImageCamera {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|e| CaptureError::NoDevice(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        log::info!("Still camera: {} ({}x{})", path.display(), width, height);
        Ok(Self {
            frame: VideoFrame {
                width,
                height,
                rgba: img.into_raw(),
            },
        })
    }
}

impl VideoSource for StillImageCamera {
    fn latest_frame(&self) -> Option<VideoFrame> {
        Some(self.frame.clone())
    }
}

/// Local device set: a video source and, optionally, the default microphone.
pub struct LocalDevices {
    video: Arc<dyn VideoSource>,
    with_microphone: bool,
}

impl LocalDevices {
    pub fn new(video: Arc<dyn VideoSource>, with_microphone: bool) -> Self {
        Self {
            video,
            with_microphone,
        }
    }
}

#[async_trait]
impl MediaDevices for LocalDevices {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Arc<dyn MediaStream>, CaptureError> {
        let mic = if constraints.audio && self.with_microphone {
            let mic = tokio::task::spawn_blocking(CpalMicrophone::open)
                .await
                .map_err(|e| CaptureError::Stream(e.to_string()))??;
            Some(Arc::new(mic))
        } else {
            None
        };

        log::info!(
            "Media stream acquired (facing={:?}, microphone={})",
            constraints.facing,
            mic.is_some()
        );
        Ok(Arc::new(LocalStream {
            video: Arc::clone(&self.video),
            mic,
            active: AtomicBool::new(true),
        }))
    }
}

struct LocalStream {
    video: Arc<dyn VideoSource>,
    mic: Option<Arc<CpalMicrophone>>,
    active: AtomicBool,
}

impl MediaStream for LocalStream {
    fn current_frame(&self) -> Option<VideoFrame> {
        if !self.is_active() {
            return None;
        }
        self.video.latest_frame()
    }

    fn audio_track(&self) -> Option<Arc<dyn AudioTrack>> {
        self.mic
            .as_ref()
            .map(|m| Arc::clone(m) as Arc<dyn AudioTrack>)
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            if let Some(mic) = &self.mic {
                mic.stop();
            }
            log::info!("Media stream released");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn still_camera_reads_native_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        RgbaImage::from_pixel(48, 32, Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let cam = StillImageCamera::open(&path).unwrap();
        let frame = cam.latest_frame().unwrap();
        assert_eq!((frame.width, frame.height), (48, 32));
        assert_eq!(frame.rgba.len(), 48 * 32 * 4);
    }

    #[test]
    fn missing_image_is_no_device() {
        assert!(matches!(
            StillImageCamera::open("/definitely/not/here.jpg"),
            Err(CaptureError::NoDevice(_))
        ));
    }

    #[tokio::test]
    async fn stream_without_microphone_stops_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])).save(&path).unwrap();
        let devices = LocalDevices::new(Arc::new(StillImageCamera::open(&path).unwrap()), false);

        let stream = devices.acquire(&MediaConstraints::default()).await.unwrap();
        assert!(stream.audio_track().is_none());
        assert!(stream.current_frame().is_some());

        stream.stop();
        stream.stop();
        assert!(!stream.is_active());
        assert!(stream.current_frame().is_none());
    }
}
