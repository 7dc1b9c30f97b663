//! Speech services for the Glossa chat client.
//!
//! Speech-to-text ([`capture`]) and text-to-speech ([`synthesis`]) built on
//! the same reactive container as the coach service. Platform device access
//! is consumed through the narrow [`capture::SpeechRecognizer`] and
//! [`synthesis::SpeechSynthesizer`] traits; this crate only deals in their
//! result values.

pub mod capture;
pub mod synthesis;

pub use capture::{CaptureEvent, CaptureOptions, CaptureState, SpeechCapture, SpeechRecognizer};
pub use synthesis::{
    SpeakEvent, SpeakOptions, SpeakState, SpeechSynthesis, SpeechSynthesizer, Utterance, Voice,
};
