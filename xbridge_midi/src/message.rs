//! USB-MIDI 1.0 wire event: 4 raw bytes, as carried in a USB-MIDI bulk
//! endpoint, paired with a host-clock timestamp once it reaches program
//! side.

/// Lowest Code Index Number (CIN) carrying a channel voice message.
///
/// CINs below this (0x0-0x7) are reserved/miscellaneous/system-common
/// framing the engine does not forward; see [`MidiEvent::is_channel_voice`].
pub const CIN_CHANNEL_VOICE_MIN: u8 = 0x08;

/// Highest CIN the engine forwards (single-byte realtime messages).
pub const CIN_CHANNEL_VOICE_MAX: u8 = 0x0F;

/// One USB-MIDI event: a 4-byte wire packet plus the host time it was
/// observed (device→host) or is scheduled for (host→device).
///
/// `#[repr(C)]` keeps a stable, predictable layout: 4 bytes of wire data,
/// padding to the `f64`'s alignment, then the timestamp. This is the
/// in-memory shape only; any ring or staging buffer that stores events on
/// the wire packs its own fields rather than transmuting this struct.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    /// Raw 4-byte USB-MIDI event: `[cable_and_cin, data0, data1, data2]`.
    pub bytes: [u8; 4],
    /// Host-clock timestamp in seconds, from the collaborator's `get_time`.
    pub timestamp: f64,
}

impl MidiEvent {
    /// Size in bytes of one event on the wire (not `size_of::<Self>()`,
    /// which includes the timestamp only once the event is host-side).
    pub const WIRE_SIZE: usize = 4;

    /// Builds an event from its wire bytes and a timestamp.
    pub fn new(bytes: [u8; 4], timestamp: f64) -> Self {
        Self { bytes, timestamp }
    }

    /// Parses one event out of a 4-byte wire slice.
    ///
    /// Returns `None` if `wire` is shorter than [`Self::WIRE_SIZE`].
    pub fn from_wire(wire: &[u8], timestamp: f64) -> Option<Self> {
        if wire.len() < Self::WIRE_SIZE {
            return None;
        }
        Some(Self {
            bytes: [wire[0], wire[1], wire[2], wire[3]],
            timestamp,
        })
    }

    /// Writes this event's 4 wire bytes into `dst`.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`Self::WIRE_SIZE`].
    pub fn write_wire(&self, dst: &mut [u8]) {
        dst[..Self::WIRE_SIZE].copy_from_slice(&self.bytes);
    }

    /// The USB-MIDI Code Index Number (cable assumed 0, so this is simply
    /// the first wire byte).
    #[inline]
    pub fn cable_code_index(&self) -> u8 {
        self.bytes[0]
    }

    /// Whether this event's CIN falls in the channel-voice / single-byte
    /// realtime range `[0x08, 0x0F]` the engine forwards to the host.
    #[inline]
    pub fn is_channel_voice(&self) -> bool {
        (CIN_CHANNEL_VOICE_MIN..=CIN_CHANNEL_VOICE_MAX).contains(&self.cable_code_index())
    }
}
