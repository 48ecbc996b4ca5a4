//! # xbridge_midi
//!
//! The USB-MIDI wire event type the engine's MIDI bridge moves between the
//! device's bulk endpoints and the host's MIDI rings.

pub mod message;

pub use message::{MidiEvent, CIN_CHANNEL_VOICE_MAX, CIN_CHANNEL_VOICE_MIN};
