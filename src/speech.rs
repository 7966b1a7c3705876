// speech.rs — Spoken feedback.
//
// The device has one audio output and no queue: starting an utterance
// cancels whatever is still playing (last speaker wins).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Platform text-to-speech engine.
pub trait SpeechSynthesizer: Send + Sync {
    /// Start speaking `text`. Fire-and-forget.
    fn utter(&self, text: &str);

    /// Stop the utterance in progress, if any.
    fn cancel(&self);
}

/// Serialises access to a [`SpeechSynthesizer`].
pub struct Speaker {
    engine: Arc<dyn SpeechSynthesizer>,
    utterances: AtomicU64,
}

impl Speaker {
    pub fn new(engine: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            engine,
            utterances: AtomicU64::new(0),
        }
    }

    /// Cancel any utterance in progress, then speak `text`.
    pub fn speak(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.engine.cancel();
        let n = self.utterances.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Speech #{}: {:?}", n, text);
        self.engine.utter(text);
    }

    pub fn silence(&self) {
        self.engine.cancel();
    }

    /// Number of utterances started so far.
    pub fn utterance_count(&self) -> u64 {
        self.utterances.load(Ordering::SeqCst)
    }
}

/// Synthesizer for headless runs: writes utterances to the log.
#[derive(Debug, Default)]
pub struct LogSpeech;

impl SpeechSynthesizer for LogSpeech {
    fn utter(&self, text: &str) {
        log::info!("[speech] {}", text);
    }

    fn cancel(&self) {}
}
