//! MIDI Bridge: inbound cable-code filtering into the o2p MIDI ring, and
//! the outbound pacing scheduler that coalesces same-timestamp events into
//! bursts and sleeps out the gaps between them.

use std::time::Duration;

use xbridge_core::{Spinlock, StackVec};
use xbridge_midi::MidiEvent;

use crate::collaborator::{ByteRing, Clock};
use crate::status::Status;

/// Size of the outbound MIDI staging buffer and the USB-MIDI bulk burst:
/// up to 128 events per burst.
pub const USB_BULK_MIDI_SIZE: usize = 512;

/// Half the average wait for a 32-sample buffer at the device's sample
/// rate; used as the spin-wait granularity when no event is pending.
/// Callers supply the actual sample period; this constant only names the
/// fixed 32-sample window.
pub const SMALLEST_SLEEP_FRAMES: u32 = 16; // 32 / 2

/// Inbound path: filters a burst of raw USB-MIDI 4-byte events down to
/// channel-voice events, stamps them all with one `get_time()` reading,
/// and writes survivors to `o2p_midi`. Drops everything if `status < RUN`.
pub fn on_midi_in(wire: &[u8], status: Status, clock: &dyn Clock, o2p_midi: &mut dyn ByteRing) {
    if status < Status::Run {
        return;
    }

    let now = clock.now();
    for chunk in wire.chunks_exact(4) {
        let Some(event) = MidiEvent::from_wire(chunk, now) else { continue };
        if !event.is_channel_voice() {
            continue;
        }
        if o2p_midi.write_space() >= MidiEvent::WIRE_SIZE {
            o2p_midi.write(&event.bytes, MidiEvent::WIRE_SIZE);
        } else {
            log::warn!("o2p MIDI ring overflow, dropping one event");
        }
    }
}

/// Shared flag set once an outbound MIDI submission completes and cleared
/// by the scheduler just before submitting a burst.
pub type MidiReadyFlag = Spinlock<bool>;

/// One step of the outbound pacing loop. Pulls whole events out of
/// `p2o_midi` one at a time, coalescing same-timestamp events into a
/// single burst; returns the burst (if any) plus how long the caller
/// should sleep before the next call.
pub struct MidiScheduler {
    staging: StackVec<u8, USB_BULK_MIDI_SIZE>,
    held_event: Option<MidiEvent>,
    last_time: f64,
}

/// What [`MidiScheduler::step`] wants the caller to do next.
pub struct SchedulerStep {
    /// A burst ready to submit on the outbound MIDI transfer, if any
    /// events were staged this step.
    pub burst: Option<Vec<u8>>,
    /// How long to sleep before the next step: the inter-event gap if a
    /// later-timestamped event was seen, else the spin-wait granularity.
    pub sleep_for: Duration,
}

impl MidiScheduler {
    pub fn new() -> Self {
        Self { staging: StackVec::new(), held_event: None, last_time: 0.0 }
    }

    /// Runs one outer iteration of the pacing algorithm: stages whatever
    /// events are ready to coalesce into one burst. Submitting that burst
    /// and clearing/setting the ready flag around it is the caller's
    /// responsibility.
    pub fn step(&mut self, p2o_midi: &mut dyn ByteRing, smallest_sleep: Duration) -> SchedulerStep {
        let mut diff = 0.0f64;

        while self.staging.len() + MidiEvent::WIRE_SIZE <= self.staging.capacity() {
            if self.staging.is_empty() {
                diff = 0.0;
            }

            if self.held_event.is_none() {
                if p2o_midi.read_space() < MidiEvent::WIRE_SIZE + 8 {
                    break;
                }
                let mut buf = [0u8; 12];
                p2o_midi.read(Some(&mut buf), 12);
                let bytes: [u8; 4] = buf[..4].try_into().unwrap();
                let timestamp = f64::from_le_bytes(buf[4..12].try_into().unwrap());
                self.held_event = Some(MidiEvent::new(bytes, timestamp));
            }

            let event = self.held_event.as_ref().unwrap();
            if event.timestamp > self.last_time {
                diff = event.timestamp - self.last_time;
                self.last_time = event.timestamp;
                break;
            }

            let event = self.held_event.take().unwrap();
            for byte in event.bytes {
                self.staging.push(byte).ok();
            }
        }

        let burst = if !self.staging.is_empty() {
            let bytes = self.staging.as_slice().to_vec();
            self.staging.clear();
            Some(bytes)
        } else {
            None
        };

        let sleep_for = if diff > 0.0 { Duration::from_secs_f64(diff) } else { smallest_sleep };

        SchedulerStep { burst, sleep_for }
    }
}

impl Default for MidiScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes a host-side MIDI event into a ring as `4 bytes + 8-byte
/// little-endian timestamp`, the wire format [`MidiScheduler::step`]
/// expects to read back. The engine's `p2o_midi` ring is defined in
/// terms of this layout; production collaborators must match it.
pub fn push_midi_event(ring: &mut dyn ByteRing, event: &MidiEvent) {
    let mut buf = [0u8; 12];
    buf[..4].copy_from_slice(&event.bytes);
    buf[4..12].copy_from_slice(&event.timestamp.to_le_bytes());
    ring.write(&buf, 12);
}
