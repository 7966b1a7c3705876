// microphone.rs — Default input device via cpal, exposed as an `AudioTrack`.
//
// The cpal stream lives on a dedicated OS thread (streams are `!Send` on some
// backends). Every callback buffer is converted to f32 and fanned out to the
// currently open taps; taps whose receiver was dropped are pruned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tokio::sync::mpsc;

use super::{AudioChunk, AudioTrack, CaptureError};

type Taps = Arc<Mutex<Vec<mpsc::UnboundedSender<AudioChunk>>>>;

/// Live microphone. Dropping it (or calling [`CpalMicrophone::stop`]) ends
/// the capture thread and releases the device.
pub struct CpalMicrophone {
    taps: Taps,
    /// Shared flag: `true` while capturing, `false` to stop.
    running: Arc<AtomicBool>,
}

impl CpalMicrophone {
    /// Open the default input device and start streaming.
    ///
    /// Blocks until the device has either started or failed, so a denied or
    /// missing microphone is reported here rather than on first use.
    pub fn open() -> Result<Self, CaptureError> {
        let taps: Taps = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), CaptureError>>();

        let thread_taps = Arc::clone(&taps);
        let thread_running = Arc::clone(&running);
        std::thread::spawn(move || {
            let stream = match build_input_stream(thread_taps) {
                Ok(s) => s,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(CaptureError::Stream(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            log::info!("Microphone stream started");

            while thread_running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(50));
            }
            // The stream is dropped here, releasing the device.
            log::info!("Microphone stream stopped");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { taps, running }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::Stream("capture thread exited".into())),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Ok(mut taps) = self.taps.lock() {
            taps.clear();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

impl AudioTrack for CpalMicrophone {
    fn open_tap(&self) -> mpsc::UnboundedReceiver<AudioChunk> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.is_running() {
            if let Ok(mut taps) = self.taps.lock() {
                taps.push(tx);
            }
        }
        rx
    }
}

/// Send one buffer to every open tap, pruning closed ones.
fn fan_out(taps: &Taps, samples: Vec<f32>, sample_rate: u32, channels: u16) {
    if let Ok(mut taps) = taps.lock() {
        if taps.is_empty() {
            return;
        }
        let chunk = AudioChunk {
            samples,
            sample_rate,
            channels,
        };
        taps.retain(|tap| tap.send(chunk.clone()).is_ok());
    }
}

fn build_input_stream(taps: Taps) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::NoDevice("no default input device".into()))?;

    log::info!(
        "Microphone device: {}",
        device.name().unwrap_or_else(|_| "<unknown>".into())
    );

    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    log::info!(
        "Microphone config: {}Hz, {} ch, {:?}",
        sample_rate,
        channels,
        sample_format
    );

    let on_error = |err: cpal::StreamError| log::error!("Microphone stream error: {err}");

    // Every sample format is converted to f32 for uniform processing.
    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                fan_out(&taps, data.to_vec(), sample_rate, channels);
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats = data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                fan_out(&taps, floats, sample_rate, channels);
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let floats = data
                    .iter()
                    .map(|&s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
                    .collect();
                fan_out(&taps, floats, sample_rate, channels);
            },
            on_error,
            None,
        ),
        other => {
            return Err(CaptureError::Stream(format!(
                "unsupported sample format: {other:?}"
            )))
        }
    };

    stream.map_err(|e| CaptureError::PermissionDenied(e.to_string()))
}
