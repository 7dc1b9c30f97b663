//! Speech capture service.
//!
//! Wraps a platform recognizer behind the narrow [`SpeechRecognizer`] trait
//! and exposes listening state, the running transcript, and elapsed capture
//! time through the reactive container. The device mechanics (microphone
//! access, recognition engine, recording) stay on the other side of the
//! trait.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use glossa_core::Result;
use glossa_core::language::Language;
use glossa_core::service::{Observer, Service};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Caller-settable capture input.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    /// Expected language of the speech, used to pick a recognition locale.
    pub language: Option<Language>,
    /// Whether the raw audio should be recorded alongside recognition.
    pub record_audio: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            language: None,
            record_audio: true,
        }
    }
}

impl CaptureOptions {
    pub fn with_language(mut self, language: Option<Language>) -> Self {
        self.language = language;
        self
    }

    pub fn with_record_audio(mut self, record_audio: bool) -> Self {
        self.record_audio = record_audio;
        self
    }
}

/// Observable capture state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureState {
    pub is_listening: bool,
    /// The transcript so far, replaced wholesale on every recognizer update.
    pub transcript: String,
    /// URL of the recorded audio once the recognizer produced one.
    pub audio_url: Option<String>,
    /// Seconds since listening started, updated once per second.
    pub elapsed_seconds: f64,
}

impl CaptureState {
    pub fn with_listening(mut self, is_listening: bool) -> Self {
        self.is_listening = is_listening;
        self
    }

    pub fn with_transcript(mut self, transcript: String) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn with_audio_url(mut self, audio_url: Option<String>) -> Self {
        self.audio_url = audio_url;
        self
    }

    pub fn with_elapsed_seconds(mut self, elapsed_seconds: f64) -> Self {
        self.elapsed_seconds = elapsed_seconds;
        self
    }
}

/// Output of a running recognizer.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Full transcript so far (not a delta).
    Transcript(String),
    /// The recorded audio is available at this URL.
    AudioCaptured(String),
}

/// Narrow interface to a platform speech recognizer.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Begins recognition and returns the event feed. The feed ends when
    /// recognition stops.
    async fn start(
        &self,
        language: Option<&Language>,
        record_audio: bool,
    ) -> Result<mpsc::UnboundedReceiver<CaptureEvent>>;

    /// Stops recognition. Must tolerate being called when idle.
    async fn stop(&self);
}

/// Reactive speech-to-text service.
pub struct SpeechCapture {
    service: Service<CaptureOptions, CaptureState>,
    recognizer: Arc<dyn SpeechRecognizer>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SpeechCapture {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            service: Service::new(CaptureOptions::default(), CaptureState::default()),
            recognizer,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> CaptureOptions {
        self.service.options()
    }

    pub fn state(&self) -> CaptureState {
        self.service.state()
    }

    pub fn update_options<F>(&self, f: F) -> CaptureOptions
    where
        F: FnOnce(CaptureOptions) -> CaptureOptions,
    {
        self.service.update_options(f)
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<CaptureOptions, CaptureState>>) {
        self.service.subscribe(observer);
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<CaptureOptions, CaptureState>>) {
        self.service.unsubscribe(observer);
    }

    /// Starts listening. Does nothing when already listening; call
    /// [`SpeechCapture::stop_listening`] first to restart.
    pub async fn start_listening(self: &Arc<Self>) {
        if self.service.state().is_listening {
            return;
        }
        // leftovers from an unbalanced stop
        self.abort_tasks();

        let options = self.service.options();
        let mut events = match self
            .recognizer
            .start(options.language.as_ref(), options.record_audio)
            .await
        {
            Ok(events) => events,
            Err(err) => {
                tracing::error!(error = %err, "speech recognition unavailable");
                return;
            }
        };
        tracing::debug!(
            language = options.language.as_ref().map(|l| l.key),
            "listening started"
        );

        // fresh state for the new capture
        self.service
            .update_state(|_| CaptureState::default().with_listening(true));

        let started = Instant::now();
        let this = Arc::clone(self);
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.tick().await; // the first tick completes immediately
            loop {
                interval.tick().await;
                let elapsed = round_to_hundredths(started.elapsed().as_secs_f64());
                this.service
                    .update_state(|s| s.with_elapsed_seconds(elapsed));
            }
        });

        let this = Arc::clone(self);
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    CaptureEvent::Transcript(transcript) => {
                        this.service
                            .update_state(|s| s.with_transcript(transcript));
                    }
                    CaptureEvent::AudioCaptured(url) => {
                        this.service.update_state(|s| s.with_audio_url(Some(url)));
                    }
                }
            }
        });

        *self.tasks.lock().expect("capture tasks poisoned") = vec![ticker, pump];
    }

    /// Stops listening. Does nothing when not listening; safe to call any
    /// number of times.
    pub async fn stop_listening(&self) {
        self.abort_tasks();
        self.recognizer.stop().await;
        self.service.update_state(|s| s.with_listening(false));
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().expect("capture tasks poisoned").drain(..) {
            task.abort();
        }
    }
}

fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
