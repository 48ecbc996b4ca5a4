//! Audio Bridge: glues the audio-in/audio-out transfers to the two
//! external audio rings, applies one-shot resampling on host→device
//! underflow, and tracks latency statistics.

use xbridge_core::Spinlock;

use crate::block::{decode_inbound, encode_outbound};
use crate::collaborator::{ByteRing, Clock, DelayLockedLoop, Resampler};
use crate::config::BlockLayout;
use crate::status::Status;

/// Fields shared between the audio-in and audio-out paths and guarded by
/// the engine's single spinlock: `status`, the latency pair, and whether
/// playback is currently enabled.
pub struct AudioLockedState {
    pub status: Status,
    pub p2o_latency: usize,
    pub p2o_max_latency: usize,
    pub p2o_audio_enabled: bool,
}

impl AudioLockedState {
    pub fn new() -> Self {
        Self { status: Status::Ready, p2o_latency: 0, p2o_max_latency: 0, p2o_audio_enabled: true }
    }
}

impl Default for AudioLockedState {
    fn default() -> Self {
        Self::new()
    }
}

/// The outbound sub-machine state: whether the bridge is still waiting
/// for the host ring to fill before starting playback, or is already
/// running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadingAtP2oEnd {
    WaitingToStart,
    Running,
}

/// Drives decode/encode against the two audio rings and an optional DLL.
/// Owns no USB buffers itself — callers pass the raw wire slices in and
/// out, matching the Transfer Pump's ownership of those buffers.
pub struct AudioBridge {
    layout: BlockLayout,
    in_channels: usize,
    out_channels: usize,
    reading_at_p2o_end: ReadingAtP2oEnd,
    decode_scratch: Vec<f32>,
    resample_scratch: Vec<f32>,
    encode_scratch: Vec<f32>,
}

impl AudioBridge {
    pub fn new(layout: BlockLayout, in_channels: usize, out_channels: usize) -> Self {
        let frames = layout.frames_per_transfer();
        Self {
            layout,
            in_channels,
            out_channels,
            reading_at_p2o_end: ReadingAtP2oEnd::WaitingToStart,
            decode_scratch: vec![0.0; frames * out_channels],
            resample_scratch: vec![0.0; frames * in_channels],
            encode_scratch: vec![0.0; frames * in_channels],
        }
    }

    /// Inbound path: tick the DLL under lock, snapshot status, decode,
    /// then publish to `o2p_audio` unless still warming up or the ring is
    /// full.
    pub fn on_audio_in(
        &mut self,
        wire: &[u8],
        locked: &Spinlock<AudioLockedState>,
        dll: Option<&Spinlock<Box<dyn DelayLockedLoop>>>,
        clock: Option<&dyn Clock>,
        o2p_audio: &mut dyn ByteRing,
    ) {
        let status = {
            let mut state = locked.lock();
            if let (Some(dll), Some(clock)) = (dll, clock) {
                dll.lock().tick(self.layout.frames_per_transfer() as u32, clock.now());
            }
            state.status
        };

        decode_inbound(wire, &self.layout, self.out_channels, &mut self.decode_scratch);

        if status < Status::Run {
            return;
        }

        let transfer_bytes = self.decode_scratch.len() * 4;
        if o2p_audio.write_space() >= transfer_bytes {
            let bytes = floats_to_bytes(&self.decode_scratch);
            o2p_audio.write(&bytes, bytes.len());
        } else {
            log::warn!("o2p audio ring overflow, dropping one transfer ({} bytes)", transfer_bytes);
        }
    }

    /// Outbound path: runs the two-state sub-machine, then encodes the
    /// result into `wire` with `frames_counter`.
    pub fn on_audio_out(
        &mut self,
        wire: &mut [u8],
        frames_counter: &mut u16,
        locked: &Spinlock<AudioLockedState>,
        p2o_audio: &mut dyn ByteRing,
        resampler: &mut dyn Resampler,
    ) {
        let frames_per_transfer = self.layout.frames_per_transfer();
        let transfer_bytes = frames_per_transfer * self.in_channels * 4;

        let enabled = locked.lock().p2o_audio_enabled;

        match self.reading_at_p2o_end {
            ReadingAtP2oEnd::WaitingToStart => {
                if enabled && p2o_audio.read_space() >= transfer_bytes {
                    let frame_bytes = self.in_channels * 4;
                    let whole_frames = p2o_audio.read_space() / frame_bytes;
                    p2o_audio.read(None, whole_frames * frame_bytes);
                    self.reading_at_p2o_end = ReadingAtP2oEnd::Running;
                }
                // Otherwise wire is left unchanged (silence from init/last block).
                return;
            }
            ReadingAtP2oEnd::Running => {
                if !enabled {
                    wire.fill(0);
                    self.reading_at_p2o_end = ReadingAtP2oEnd::WaitingToStart;
                    return;
                }
            }
        }

        let readable = p2o_audio.read_space();
        {
            let mut state = locked.lock();
            state.p2o_latency = readable;
            if readable > state.p2o_max_latency {
                state.p2o_max_latency = readable;
            }
        }

        if readable >= transfer_bytes {
            let mut buf = vec![0u8; transfer_bytes];
            p2o_audio.read(Some(&mut buf), transfer_bytes);
            bytes_to_floats(&buf, &mut self.encode_scratch);
        } else {
            let frame_bytes = self.in_channels * 4;
            let available_frames = readable / frame_bytes;
            if available_frames == 0 {
                log::warn!("p2o audio underflow with nothing readable, emitting silence");
                self.encode_scratch.fill(0.0);
            } else {
                let available_bytes = available_frames * frame_bytes;
                let mut buf = vec![0u8; available_bytes];
                p2o_audio.read(Some(&mut buf), available_bytes);
                self.resample_scratch.resize(available_frames * self.in_channels, 0.0);
                bytes_to_floats(&buf, &mut self.resample_scratch);

                let src_ratio = frames_per_transfer as f64 / available_frames as f64;
                let produced = resampler.process(&self.resample_scratch, &mut self.encode_scratch, self.in_channels, src_ratio);
                let produced_frames = produced;
                if produced_frames < frames_per_transfer {
                    log::warn!(
                        "resampler produced {} of {} requested frames during p2o underflow",
                        produced_frames,
                        frames_per_transfer
                    );
                    self.encode_scratch[produced_frames * self.in_channels..].fill(0.0);
                }
            }
        }

        encode_outbound(&self.encode_scratch, &self.layout, self.in_channels, frames_counter, wire);
    }

    /// Returns the outbound sub-machine to `WaitingToStart`, for cycle
    /// re-entry: the next `on_audio_out` call will drain `p2o_audio` to a
    /// frame boundary again before resuming playback.
    pub fn reset_outbound(&mut self) {
        self.reading_at_p2o_end = ReadingAtP2oEnd::WaitingToStart;
    }
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for sample in floats {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8], out: &mut [f32]) {
    for (chunk, slot) in bytes.chunks_exact(4).zip(out.iter_mut()) {
        *slot = f32::from_le_bytes(chunk.try_into().unwrap());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct VecRing {
        data: VecDeque<u8>,
        capacity: usize,
    }

    impl VecRing {
        fn new(capacity: usize) -> Self {
            Self { data: VecDeque::new(), capacity }
        }

        fn push_floats(&mut self, floats: &[f32]) {
            for sample in floats {
                self.data.extend(sample.to_le_bytes());
            }
        }
    }

    impl ByteRing for VecRing {
        fn read_space(&self) -> usize {
            self.data.len()
        }

        fn write_space(&self) -> usize {
            self.capacity.saturating_sub(self.data.len())
        }

        fn read(&mut self, dst: Option<&mut [u8]>, n: usize) {
            if let Some(dst) = dst {
                for (i, slot) in dst.iter_mut().take(n).enumerate() {
                    *slot = self.data[i];
                }
            }
            for _ in 0..n {
                self.data.pop_front();
            }
        }

        fn write(&mut self, src: &[u8], n: usize) {
            self.data.extend(src[..n].iter().copied());
        }
    }

    struct NoopClock;
    impl Clock for NoopClock {
        fn now(&self) -> f64 {
            0.0
        }
    }

    fn layout() -> BlockLayout {
        BlockLayout { frames_per_block: 4, padding_size: 0, blocks_per_transfer: 2 }
    }

    #[test]
    fn on_audio_in_drops_during_warmup() {
        let mut bridge = AudioBridge::new(layout(), 2, 2);
        let locked = Spinlock::new(AudioLockedState::new());
        let wire = vec![0u8; layout().transfer_size(2)];
        let mut o2p = VecRing::new(4096);

        bridge.on_audio_in(&wire, &locked, None, None, &mut o2p);
        assert_eq!(o2p.read_space(), 0);
    }

    #[test]
    fn on_audio_in_publishes_once_running() {
        let mut bridge = AudioBridge::new(layout(), 2, 2);
        let locked = Spinlock::new(AudioLockedState { status: Status::Run, ..AudioLockedState::new() });
        let wire = vec![0u8; layout().transfer_size(2)];
        let mut o2p = VecRing::new(4096);

        bridge.on_audio_in(&wire, &locked, None, None, &mut o2p);
        let frames = layout().frames_per_transfer();
        assert_eq!(o2p.read_space(), frames * 2 * 4);
    }

    #[test]
    fn on_audio_in_logs_overflow_without_writing() {
        let mut bridge = AudioBridge::new(layout(), 2, 2);
        let locked = Spinlock::new(AudioLockedState { status: Status::Run, ..AudioLockedState::new() });
        let wire = vec![0u8; layout().transfer_size(2)];
        let mut o2p = VecRing::new(4); // too small for a full transfer

        bridge.on_audio_in(&wire, &locked, None, None, &mut o2p);
        assert_eq!(o2p.read_space(), 0);
    }

    #[test]
    fn on_audio_out_waits_until_ring_has_full_transfer() {
        let mut bridge = AudioBridge::new(layout(), 2, 2);
        let locked = Spinlock::new(AudioLockedState::new());
        let mut wire = vec![0xFFu8; layout().transfer_size(2)];
        let mut p2o = VecRing::new(4096);
        let mut resampler = crate::collaborator::LinearResampler;
        let mut counter = 0u16;

        bridge.on_audio_out(&mut wire, &mut counter, &locked, &mut p2o, &mut resampler);
        // Nothing staged yet: wire untouched, still in WaitingToStart.
        assert!(wire.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn on_audio_out_starts_running_once_ring_fills() {
        let mut bridge = AudioBridge::new(layout(), 2, 2);
        let locked = Spinlock::new(AudioLockedState::new());
        let frames = layout().frames_per_transfer();
        let mut p2o = VecRing::new(4096);
        p2o.push_floats(&vec![0.5f32; frames * 2]);

        let mut wire = vec![0u8; layout().transfer_size(2)];
        let mut resampler = crate::collaborator::LinearResampler;
        let mut counter = 0u16;

        // First call drains to boundary and switches to Running.
        bridge.on_audio_out(&mut wire, &mut counter, &locked, &mut p2o, &mut resampler);
        assert_eq!(bridge.reading_at_p2o_end, ReadingAtP2oEnd::Running);
    }

    #[test]
    fn on_audio_out_disable_mid_stream_zeros_and_resets() {
        let mut bridge = AudioBridge::new(layout(), 2, 2);
        bridge.reading_at_p2o_end = ReadingAtP2oEnd::Running;
        let locked = Spinlock::new(AudioLockedState { p2o_audio_enabled: false, ..AudioLockedState::new() });
        let mut wire = vec![0xAAu8; layout().transfer_size(2)];
        let mut p2o = VecRing::new(4096);
        let mut resampler = crate::collaborator::LinearResampler;
        let mut counter = 0u16;

        bridge.on_audio_out(&mut wire, &mut counter, &locked, &mut p2o, &mut resampler);
        assert!(wire.iter().all(|&b| b == 0));
        assert_eq!(bridge.reading_at_p2o_end, ReadingAtP2oEnd::WaitingToStart);
    }

    #[test]
    fn on_audio_out_max_latency_is_non_decreasing() {
        let mut bridge = AudioBridge::new(layout(), 2, 2);
        bridge.reading_at_p2o_end = ReadingAtP2oEnd::Running;
        let locked = Spinlock::new(AudioLockedState::new());
        let frames = layout().frames_per_transfer();
        let mut p2o = VecRing::new(8192);
        p2o.push_floats(&vec![0.1f32; frames * 2 * 3]);

        let mut wire = vec![0u8; layout().transfer_size(2)];
        let mut resampler = crate::collaborator::LinearResampler;
        let mut counter = 0u16;

        let mut last_max = 0usize;
        for _ in 0..3 {
            bridge.on_audio_out(&mut wire, &mut counter, &locked, &mut p2o, &mut resampler);
            let max = locked.lock().p2o_max_latency;
            assert!(max >= last_max);
            last_max = max;
        }
    }
}
