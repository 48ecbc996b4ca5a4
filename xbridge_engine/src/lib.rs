//! # xbridge_engine
//!
//! The USB audio/MIDI bridge engine: a bi-directional transfer pump, the
//! big-endian/fixed-point block codec, the audio and MIDI bridges that
//! couple those transfers to host-supplied ring buffers, and the
//! lifecycle supervisor that ties the two worker threads together.
//!
//! The engine owns no ring buffers, no clock, no resampler and no DLL of
//! its own — those are supplied by the enclosing program through
//! [`collaborator::IoBuffers`] and the traits in [`collaborator`].

pub mod audio;
pub mod block;
pub mod collaborator;
pub mod config;
pub mod engine;
pub mod error;
pub mod midi;
pub mod status;
pub mod transfer;
pub mod usb;

pub use collaborator::{ByteRing, Clock, DelayLockedLoop, IoBuffers, LinearResampler, Resampler};
pub use config::{BlockLayout, DeviceDescriptor, EngineConfig};
pub use engine::Engine;
pub use error::{get_err_str, EngineError, Result};
pub use status::Status;
