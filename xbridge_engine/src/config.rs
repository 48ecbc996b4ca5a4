//! Engine configuration: the immutable per-device parameters (channel
//! counts, blocks-per-transfer, block framing), validated once before
//! `Engine::init` proceeds.

use crate::error::{EngineError, Result};

/// Fixed sentinel written into every outbound block's `header` field.
pub const BLOCK_HEADER_SENTINEL: u16 = 0x07FF;

/// Divisor used to convert between the device's 32-bit fixed-point wire
/// samples and host-side normalised floats.
pub const INT_MAX: f32 = i32::MAX as f32;

/// The human-readable name, input channel count, and output channel count
/// for an opened device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: String,
    /// Number of channels the device accepts for playback (host→device).
    pub inputs: usize,
    /// Number of channels the device produces for capture (device→host).
    pub outputs: usize,
}

/// The block-framing parameters dictated by the device (the "header",
/// "frames", "padding" and "data" fields of one wire block) plus how many
/// blocks make up one USB transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    /// Frames (multichannel sample tuples) carried by one block.
    pub frames_per_block: usize,
    /// Opaque device-specific bytes following the block's 4-byte header.
    pub padding_size: usize,
    /// Blocks carried by one USB transfer.
    pub blocks_per_transfer: usize,
}

impl BlockLayout {
    /// Bytes in a block before its sample data: `header` + `frames` + padding.
    #[inline]
    pub fn header_size(&self) -> usize {
        4 + self.padding_size
    }

    /// Total wire size of one block carrying `channels` interleaved samples.
    #[inline]
    pub fn block_size(&self, channels: usize) -> usize {
        self.header_size() + self.frames_per_block * channels * 4
    }

    /// Total wire size of one transfer (`blocks_per_transfer` blocks).
    #[inline]
    pub fn transfer_size(&self, channels: usize) -> usize {
        self.block_size(channels) * self.blocks_per_transfer
    }

    /// Frames per transfer: `F = B * FRAMES_PER_BLOCK`.
    #[inline]
    pub fn frames_per_transfer(&self) -> usize {
        self.frames_per_block * self.blocks_per_transfer
    }
}

/// Immutable configuration for one opened engine, minus the USB handle
/// and endpoint addresses which are protocol-fixed constants, not
/// per-device — see [`crate::usb`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub device: DeviceDescriptor,
    pub layout: BlockLayout,
    /// Device sample rate, used only to size the MIDI scheduler's
    /// `smallest_sleep_time` (half the average wait for a 32-sample
    /// buffer).
    pub sample_rate_hz: u32,
}

impl EngineConfig {
    pub fn new(device: DeviceDescriptor, layout: BlockLayout, sample_rate_hz: u32) -> Self {
        Self { device, layout, sample_rate_hz }
    }

    /// Validates the configuration before `Engine::init` proceeds.
    pub fn validate(&self) -> Result<()> {
        if self.layout.blocks_per_transfer == 0 {
            return Err(EngineError::InvalidConfig("blocks_per_transfer must be nonzero"));
        }
        if self.layout.frames_per_block == 0 {
            return Err(EngineError::InvalidConfig("frames_per_block must be nonzero"));
        }
        if self.device.inputs == 0 && self.device.outputs == 0 {
            return Err(EngineError::InvalidConfig("device must have at least one input or output channel"));
        }
        if self.sample_rate_hz == 0 {
            return Err(EngineError::InvalidConfig("sample_rate_hz must be nonzero"));
        }
        Ok(())
    }

    #[inline]
    pub fn frames_per_transfer(&self) -> usize {
        self.layout.frames_per_transfer()
    }
}
