//! Speech synthesis service.
//!
//! Wraps a platform synthesizer behind the narrow [`SpeechSynthesizer`]
//! trait: enumerate voices, filter them by language, and speak the pending
//! text with a resolved voice, rate, and pitch. Audio playback mechanics
//! stay on the other side of the trait.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use glossa_core::Result;
use glossa_core::language::{self, Iso639_1, Iso639_3, Language};
use glossa_core::service::{Observer, Service};

/// A voice offered by the platform synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub name: String,
    /// True when synthesis runs on-device rather than via a network service.
    pub is_local: bool,
    /// Keys of the supported languages this voice can speak.
    pub language_keys: Vec<String>,
}

impl Voice {
    /// Builds a voice from the device's descriptor, mapping its BCP 47 /
    /// ISO language code onto the supported-language table. Voices speaking
    /// an unsupported language end up with no keys and are never matched.
    pub fn from_device(name: impl Into<String>, is_local: bool, language_code: &str) -> Self {
        Self {
            name: name.into(),
            is_local,
            language_keys: languages_for_code(language_code)
                .into_iter()
                .map(|l| l.key.to_string())
                .collect(),
        }
    }

    pub fn speaks(&self, language: &Language) -> bool {
        self.language_keys.iter().any(|key| key == language.key)
    }
}

/// Supported languages matching a device language code.
///
/// Unlike `language::by_code` this does not fall back to English: a voice
/// with an unsupported code matches nothing.
fn languages_for_code(code: &str) -> Vec<&'static Language> {
    let bare = code.split('-').next().unwrap_or(code);

    if let Ok(iso1) = Iso639_1::from_str(bare) {
        return language::all()
            .iter()
            .filter(|l| l.iso1 == iso1)
            .collect();
    }
    if let Ok(iso3) = Iso639_3::from_str(bare) {
        return language::all()
            .iter()
            .filter(|l| l.includes.contains(&iso3))
            .collect();
    }
    Vec::new()
}

/// Caller-settable synthesis input.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakOptions {
    /// The text to speak.
    pub input_text: Option<String>,
    /// Explicit voice; when absent the first catalog voice speaking
    /// `language` is used.
    pub voice: Option<Voice>,
    /// Language of the utterance.
    pub language: Option<Language>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: Option<f32>,
}

impl Default for SpeakOptions {
    fn default() -> Self {
        Self {
            input_text: None,
            voice: None,
            language: None,
            rate: 1.0,
            pitch: 1.0,
            volume: None,
        }
    }
}

impl SpeakOptions {
    pub fn with_input_text(mut self, input_text: Option<String>) -> Self {
        self.input_text = input_text;
        self
    }

    pub fn with_voice(mut self, voice: Option<Voice>) -> Self {
        self.voice = voice;
        self
    }

    pub fn with_language(mut self, language: Option<Language>) -> Self {
        self.language = language;
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }
}

/// Observable synthesis state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeakState {
    pub is_speaking: bool,
    /// The platform's voice catalog.
    pub voices: Vec<Voice>,
}

impl SpeakState {
    pub fn with_speaking(mut self, is_speaking: bool) -> Self {
        self.is_speaking = is_speaking;
        self
    }

    pub fn with_voices(mut self, voices: Vec<Voice>) -> Self {
        self.voices = voices;
        self
    }
}

/// A fully resolved utterance handed to the synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice: Voice,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Playback progress reported by the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakEvent {
    Started,
    Paused,
    Resumed,
    Finished,
}

/// Narrow interface to a platform speech synthesizer.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// The currently available voices.
    async fn voices(&self) -> Vec<Voice>;

    /// Speaks the utterance, reporting progress on the returned feed.
    async fn speak(&self, utterance: Utterance) -> Result<mpsc::UnboundedReceiver<SpeakEvent>>;
}

/// Reactive text-to-speech service.
pub struct SpeechSynthesis {
    service: Service<SpeakOptions, SpeakState>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl SpeechSynthesis {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            service: Service::new(SpeakOptions::default(), SpeakState::default()),
            synthesizer,
        }
    }

    pub fn options(&self) -> SpeakOptions {
        self.service.options()
    }

    pub fn state(&self) -> SpeakState {
        self.service.state()
    }

    pub fn update_options<F>(&self, f: F) -> SpeakOptions
    where
        F: FnOnce(SpeakOptions) -> SpeakOptions,
    {
        self.service.update_options(f)
    }

    pub fn subscribe(&self, observer: Arc<dyn Observer<SpeakOptions, SpeakState>>) {
        self.service.subscribe(observer);
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn Observer<SpeakOptions, SpeakState>>) {
        self.service.unsubscribe(observer);
    }

    /// Re-reads the platform's voice catalog into state.
    pub async fn refresh_voices(&self) {
        let voices = self.synthesizer.voices().await;
        tracing::debug!(voice_count = voices.len(), "voice catalog refreshed");
        self.service.update_state(|s| s.with_voices(voices));
    }

    /// Catalog voices able to speak the given language.
    pub fn voices_for(&self, language: &Language) -> Vec<Voice> {
        self.service
            .state()
            .voices
            .into_iter()
            .filter(|voice| voice.speaks(language))
            .collect()
    }

    /// Speaks the pending input text.
    ///
    /// The voice is taken from the options, falling back to the first
    /// catalog voice speaking the utterance language. Returns `false` (with
    /// a log line) when the language, voice, or text is missing.
    pub async fn speak_text(self: &Arc<Self>) -> bool {
        let options = self.service.options();
        let Some(language) = options.language.clone() else {
            tracing::error!("no utterance language set");
            return false;
        };

        let voice = match options.voice.clone() {
            Some(voice) => Some(voice),
            None => {
                self.refresh_voices().await;
                let fallback = self.voices_for(&language).into_iter().next();
                if let Some(ref voice) = fallback {
                    tracing::warn!(voice = %voice.name, "no voice selected, using default");
                }
                fallback
            }
        };
        let Some(voice) = voice else {
            tracing::error!(language = language.key, "no voice available for language");
            return false;
        };

        let text = options
            .input_text
            .clone()
            .filter(|text| !text.trim().is_empty());
        let Some(text) = text else {
            tracing::error!("no input text to speak");
            return false;
        };

        let utterance = Utterance {
            text,
            voice,
            rate: options.rate,
            pitch: options.pitch,
            volume: options.volume.unwrap_or(1.0),
        };

        match self.synthesizer.speak(utterance).await {
            Ok(mut events) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        let speaking = matches!(event, SpeakEvent::Started | SpeakEvent::Resumed);
                        this.service.update_state(|s| s.with_speaking(speaking));
                        if event == SpeakEvent::Finished {
                            break;
                        }
                    }
                });
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "speech synthesis failed");
                false
            }
        }
    }
}
