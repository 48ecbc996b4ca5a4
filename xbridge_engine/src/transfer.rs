//! Transfer Pump: owns the four USB transfer buffers and the round-robin
//! poll loop that drives them, since `rusb`'s stable API has no async
//! submit/callback interface, only blocking reads/writes with a timeout.
//!
//! Each poll call drives one round of one endpoint. Audio uses interrupt
//! transfers, MIDI uses bulk transfers. Audio-out is refilled from its
//! encoded buffer before being resubmitted. MIDI-out is only ever driven
//! by the MIDI scheduler: the pump submits whatever is already staged and
//! otherwise leaves the endpoint idle.

use std::time::Duration;

use crate::config::BlockLayout;
use crate::usb::{UsbTransport, EP_AUDIO_IN, EP_AUDIO_OUT, EP_MIDI_IN, EP_MIDI_OUT};

/// Bounded per-endpoint timeout for one poll round. Short enough that the
/// pump cycles through all four endpoints many times a millisecond; long
/// enough not to busy-spin the kernel with zero-timeout reads.
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Owns the four transfer buffers (audio-in, audio-out, midi-in, midi-out)
/// and pumps them against a [`UsbTransport`].
pub struct TransferPump {
    audio_in: Vec<u8>,
    audio_out: Vec<u8>,
    midi_in: Vec<u8>,
    midi_out: Vec<u8>,
}

impl TransferPump {
    /// Sizes the audio buffers from the block layout and channel counts;
    /// MIDI buffers are fixed-size (one USB-MIDI packet per transfer in
    /// the common case, more during bursts).
    pub fn new(layout: &BlockLayout, in_channels: usize, out_channels: usize, midi_transfer_size: usize) -> Self {
        Self {
            audio_in: vec![0u8; layout.transfer_size(in_channels)],
            audio_out: vec![0u8; layout.transfer_size(out_channels)],
            midi_in: vec![0u8; midi_transfer_size],
            midi_out: vec![0u8; midi_transfer_size],
        }
    }

    /// Polls the audio-in endpoint. Returns `Some` with the number of bytes
    /// read when a full transfer arrived, `None` on timeout (nothing ready
    /// this round — not an error, just an empty cycle).
    pub fn poll_audio_in(&mut self, transport: &dyn UsbTransport) -> crate::error::Result<Option<&[u8]>> {
        let n = transport.read_interrupt(EP_AUDIO_IN, &mut self.audio_in, POLL_TIMEOUT)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(&self.audio_in[..n]))
    }

    /// Submits the audio-out buffer. Encoding always happens before
    /// resubmission — callers must encode into [`Self::audio_out_buf`]
    /// before calling this.
    pub fn poll_audio_out(&mut self, transport: &dyn UsbTransport) -> crate::error::Result<usize> {
        transport.write_interrupt(EP_AUDIO_OUT, &self.audio_out, POLL_TIMEOUT)
    }

    /// Mutable access to the audio-out staging buffer, for the audio
    /// bridge to encode into before [`Self::poll_audio_out`].
    pub fn audio_out_buf(&mut self) -> &mut [u8] {
        &mut self.audio_out
    }

    /// Polls the MIDI-in endpoint. Returns the bytes read, or `None` on
    /// timeout.
    pub fn poll_midi_in(&mut self, transport: &dyn UsbTransport) -> crate::error::Result<Option<&[u8]>> {
        let n = transport.read_bulk(EP_MIDI_IN, &mut self.midi_in, POLL_TIMEOUT)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(&self.midi_in[..n]))
    }

    /// Submits `bytes` on the MIDI-out endpoint. Only ever called by the
    /// MIDI scheduler with bytes it has already paced; the pump itself
    /// never decides when MIDI-out fires.
    pub fn submit_midi_out(&mut self, transport: &dyn UsbTransport, bytes: &[u8]) -> crate::error::Result<usize> {
        self.midi_out[..bytes.len()].copy_from_slice(bytes);
        transport.write_bulk(EP_MIDI_OUT, &self.midi_out[..bytes.len()], POLL_TIMEOUT)
    }
}
