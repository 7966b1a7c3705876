// voice.rs — Push-to-talk question recording.
//
// idle ──start──▶ recording ──stop──▶ encoding ──clip ready──▶ idle
//
// While recording, chunks from the stream's microphone track are collected in
// arrival order. Stopping concatenates them, down-mixes to mono, resamples to
// 24 kHz, quantises to 16-bit PCM and wraps the result as a base64 WAV clip.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::sync::mpsc;

use super::{AudioChunk, MediaStream};

/// Sample rate of every encoded clip.
pub const CLIP_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Recording,
    Encoding,
}

/// A finished recording, ready to send to the oracle.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    /// Base64-encoded mono 16-bit PCM WAV.
    pub data: String,
    pub sample_rate: u32,
    pub duration_ms: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("Already listening")]
    AlreadyListening,
    #[error("Not listening")]
    NotListening,
    #[error("No audio was captured")]
    EmptyClip,
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Records one clip at a time from a stream's audio track.
pub struct VoicePipeline {
    state: VoiceState,
    tap: Option<mpsc::UnboundedReceiver<AudioChunk>>,
}

impl Default for VoicePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl VoicePipeline {
    pub fn new() -> Self {
        Self {
            state: VoiceState::Idle,
            tap: None,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_listening(&self) -> bool {
        self.state == VoiceState::Recording
    }

    /// Begin recording from the stream's microphone.
    ///
    /// Returns `Ok(false)` without changing state when there is no active
    /// stream or it has no audio track. A second start while a clip is being
    /// recorded or encoded is rejected with [`VoiceError::AlreadyListening`].
    pub fn start_listening(&mut self, stream: Option<&dyn MediaStream>) -> Result<bool, VoiceError> {
        if self.state != VoiceState::Idle {
            return Err(VoiceError::AlreadyListening);
        }
        let track = match stream.filter(|s| s.is_active()).and_then(|s| s.audio_track()) {
            Some(t) => t,
            None => {
                log::debug!("startListening ignored: no active audio track");
                return Ok(false);
            }
        };
        self.tap = Some(track.open_tap());
        self.state = VoiceState::Recording;
        log::info!("Voice capture: recording");
        Ok(true)
    }

    /// Close the tap and move to `Encoding`, returning the recorded chunks in
    /// arrival order. Encode them off the async runtime with [`encode_clip`],
    /// then call [`Self::finish_encoding`].
    pub fn finish_recording(&mut self) -> Result<Vec<AudioChunk>, VoiceError> {
        if self.state != VoiceState::Recording {
            return Err(VoiceError::NotListening);
        }
        let mut chunks = Vec::new();
        if let Some(mut tap) = self.tap.take() {
            tap.close();
            while let Ok(chunk) = tap.try_recv() {
                chunks.push(chunk);
            }
        }
        self.state = VoiceState::Encoding;
        log::debug!("Voice capture: {} chunks recorded", chunks.len());
        Ok(chunks)
    }

    pub fn finish_encoding(&mut self) {
        if self.state == VoiceState::Encoding {
            self.state = VoiceState::Idle;
        }
    }

    /// Drop any recording in progress and return to `Idle`.
    pub fn cancel(&mut self) {
        self.tap = None;
        self.state = VoiceState::Idle;
    }
}

/// Concatenate chunks into a single mono 24 kHz WAV clip.
pub fn encode_clip(chunks: &[AudioChunk]) -> Result<AudioClip, VoiceError> {
    let mut mono: Vec<f32> = Vec::new();
    for chunk in chunks {
        let m = downmix_to_mono(&chunk.samples, chunk.channels.max(1) as usize);
        mono.extend(resample(&m, chunk.sample_rate, CLIP_SAMPLE_RATE));
    }
    if mono.is_empty() {
        return Err(VoiceError::EmptyClip);
    }

    let pcm: Vec<i16> = mono
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect();
    log::debug!(
        "Voice clip: {} samples, RMS={:.4}",
        pcm.len(),
        compute_rms(&pcm)
    );

    let duration_ms = (pcm.len() as u64 * 1000 / CLIP_SAMPLE_RATE as u64) as u32;
    let wav = wav_bytes(&pcm, CLIP_SAMPLE_RATE);
    Ok(AudioClip {
        data: BASE64.encode(&wav),
        sample_rate: CLIP_SAMPLE_RATE,
        duration_ms,
    })
}

// ─── DSP helpers ───────────────────────────────────────────────────────────────

/// Down-mix interleaved multi-channel audio to mono by averaging channels.
fn downmix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample audio using simple linear interpolation.
/// Good enough for speech; not audiophile-grade.
fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = ((input.len() as f64) / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < input.len() {
            input[idx] as f64 * (1.0 - frac) + input[idx + 1] as f64 * frac
        } else {
            input.get(idx).copied().unwrap_or(0.0) as f64
        };

        output.push(sample as f32);
    }

    output
}

/// Compute the RMS (Root Mean Square) of PCM i16 samples.
/// Returns a value in the range 0.0–1.0.
pub fn compute_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    (sum / samples.len() as f64).sqrt() as f32 / i16::MAX as f32
}

/// Wrap mono 16-bit PCM in a canonical 44-byte RIFF/WAVE header.
fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend(samples.iter().flat_map(|s| s.to_le_bytes()));
    out
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AudioTrack, VideoFrame};
    use std::sync::{Arc, Mutex};

    /// Track whose taps are fed by the test.
    #[derive(Default)]
    struct FakeTrack {
        taps: Mutex<Vec<mpsc::UnboundedSender<AudioChunk>>>,
    }

    impl FakeTrack {
        fn push(&self, samples: Vec<f32>) {
            for tap in self.taps.lock().unwrap().iter() {
                let _ = tap.send(AudioChunk {
                    samples: samples.clone(),
                    sample_rate: CLIP_SAMPLE_RATE,
                    channels: 1,
                });
            }
        }
    }

    impl AudioTrack for FakeTrack {
        fn open_tap(&self) -> mpsc::UnboundedReceiver<AudioChunk> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.taps.lock().unwrap().push(tx);
            rx
        }
    }

    struct FakeStream {
        track: Option<Arc<FakeTrack>>,
    }

    impl MediaStream for FakeStream {
        fn current_frame(&self) -> Option<VideoFrame> {
            None
        }
        fn audio_track(&self) -> Option<Arc<dyn AudioTrack>> {
            self.track.clone().map(|t| t as Arc<dyn AudioTrack>)
        }
        fn stop(&self) {}
        fn is_active(&self) -> bool {
            true
        }
    }

    /// Stop, encode and return to idle, as the session does around its
    /// blocking encode.
    fn stop(vp: &mut VoicePipeline) -> Result<AudioClip, VoiceError> {
        let chunks = vp.finish_recording()?;
        let clip = encode_clip(&chunks);
        vp.finish_encoding();
        clip
    }

    fn decode_wav_samples(clip: &AudioClip) -> Vec<i16> {
        let bytes = BASE64.decode(&clip.data).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        bytes[44..]
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }

    #[test]
    fn records_chunks_in_arrival_order() {
        let track = Arc::new(FakeTrack::default());
        let stream = FakeStream { track: Some(track.clone()) };
        let mut vp = VoicePipeline::new();

        assert!(vp.start_listening(Some(&stream)).unwrap());
        assert_eq!(vp.state(), VoiceState::Recording);
        track.push(vec![0.5; 4]);
        track.push(vec![-0.5; 2]);

        let chunks = vp.finish_recording().unwrap();
        assert_eq!(vp.state(), VoiceState::Encoding);
        let clip = encode_clip(&chunks).unwrap();
        vp.finish_encoding();
        assert_eq!(vp.state(), VoiceState::Idle);

        let samples = decode_wav_samples(&clip);
        assert_eq!(samples.len(), 6);
        assert!(samples[..4].iter().all(|&s| s > 0));
        assert!(samples[4..].iter().all(|&s| s < 0));
    }

    #[test]
    fn second_start_is_rejected() {
        let stream = FakeStream { track: Some(Arc::new(FakeTrack::default())) };
        let mut vp = VoicePipeline::new();
        vp.start_listening(Some(&stream)).unwrap();
        assert!(matches!(
            vp.start_listening(Some(&stream)),
            Err(VoiceError::AlreadyListening)
        ));
        assert!(vp.is_listening());
    }

    #[test]
    fn start_without_audio_track_is_noop() {
        let mut vp = VoicePipeline::new();
        assert!(!vp.start_listening(Some(&FakeStream { track: None })).unwrap());
        assert!(!vp.start_listening(None).unwrap());
        assert_eq!(vp.state(), VoiceState::Idle);
    }

    #[test]
    fn stop_without_start_is_error() {
        let mut vp = VoicePipeline::new();
        assert!(matches!(stop(&mut vp), Err(VoiceError::NotListening)));
    }

    #[test]
    fn silent_recording_is_empty_clip() {
        let stream = FakeStream { track: Some(Arc::new(FakeTrack::default())) };
        let mut vp = VoicePipeline::new();
        vp.start_listening(Some(&stream)).unwrap();
        assert!(matches!(stop(&mut vp), Err(VoiceError::EmptyClip)));
        assert_eq!(vp.state(), VoiceState::Idle);
    }

    #[test]
    fn encode_clip_downmixes_and_resamples() {
        // 480 stereo frames @ 48kHz → 240 mono samples @ 24kHz
        let chunk = AudioChunk {
            samples: vec![0.25; 960],
            sample_rate: 48_000,
            channels: 2,
        };
        let clip = encode_clip(&[chunk]).unwrap();
        assert_eq!(clip.sample_rate, CLIP_SAMPLE_RATE);
        assert_eq!(clip.duration_ms, 10);
        assert_eq!(decode_wav_samples(&clip).len(), 240);
    }

    #[test]
    fn wav_header_fields() {
        let wav = wav_bytes(&[0, 1, -1], 24_000);
        assert_eq!(wav.len(), 44 + 6);
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 36 + 6);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 6);
    }

    #[test]
    fn downmix_stereo_to_mono() {
        let stereo = vec![1.0f32, -1.0, 0.5, 0.5];
        let mono = downmix_to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.0).abs() < f32::EPSILON);
        assert!((mono[1] - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(compute_rms(&[0i16; 100]), 0.0);
        assert_eq!(compute_rms(&[]), 0.0);
    }
}
