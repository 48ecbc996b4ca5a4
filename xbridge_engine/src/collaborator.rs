//! The collaborator interface: everything the enclosing program supplies
//! and the engine treats as an opaque dependency — ring buffers, the host
//! clock, the sample-rate converter, and the DLL. The engine never
//! implements any of these for production use; it only defines the
//! contract and ships one minimal default (the linear resampler) for the
//! rare underflow path where a "good enough" stand-in is acceptable.

/// A byte-oriented ring buffer with one producer and one consumer.
///
/// Implementations must make `read_space`/`write_space` monotonic with
/// respect to the concurrent single producer/consumer: once bytes are
/// reported readable (or writable), that report must not retract before
/// the corresponding `read`/`write` call. The engine relies on this to
/// avoid re-checking space between deciding to act and acting.
pub trait ByteRing: Send {
    /// Bytes currently available to read.
    fn read_space(&self) -> usize;

    /// Bytes currently available to write.
    fn write_space(&self) -> usize;

    /// Consumes exactly `n` bytes. If `dst` is `Some`, the bytes are
    /// copied there (`dst.len() >= n` is the caller's responsibility);
    /// if `None`, the bytes are discarded.
    ///
    /// The caller guarantees `n <= read_space()` at the time of the call.
    fn read(&mut self, dst: Option<&mut [u8]>, n: usize);

    /// Writes exactly `n` bytes from `src`.
    ///
    /// The caller guarantees `n <= write_space()` at the time of the call
    /// and `src.len() >= n`.
    fn write(&mut self, src: &[u8], n: usize);
}

/// Monotonic host time, in seconds, from the collaborator's audio graph.
pub trait Clock: Send + Sync {
    /// Returns the current host time in seconds.
    fn now(&self) -> f64;
}

/// A sample-rate converter, invoked only on outbound-audio underflow.
/// Exposed behind an interface so a higher-quality implementation can be
/// swapped in; the engine ships only a simple linear default for this
/// rare path.
pub trait Resampler: Send {
    /// Resamples `input` (frame-interleaved, `channels` wide) to fill as
    /// much of `output` as possible at the given `src_ratio` (output
    /// frames per input frame). Returns the number of frames actually
    /// written to `output`; this may be fewer than the caller asked for,
    /// which the caller logs and continues with.
    fn process(&mut self, input: &[f32], output: &mut [f32], channels: usize, src_ratio: f64) -> usize;
}

/// A delay-locked loop tracking host-vs-device clock drift from periodic
/// `(frames, host_time)` samples. The engine only ever calls `tick`; the
/// DLL's internal filter coefficients are entirely the collaborator's
/// concern.
pub trait DelayLockedLoop: Send {
    /// Feeds one timing sample: `frames` processed since the last tick,
    /// observed at host time `now` seconds.
    fn tick(&mut self, frames: u32, now: f64);

    /// Resets the filter to its startup state. Called once at the start
    /// of every engine cycle, before the first `tick` of that cycle.
    fn reset(&mut self);
}

/// The four ring-buffer handles plus the clock and resampler the engine
/// needs to run. MIDI is optional: either both `o2p_midi` and `p2o_midi`
/// are present (and `get_time` with them), or neither is — `Engine::activate`
/// enforces this.
pub struct IoBuffers {
    pub o2p_audio: Box<dyn ByteRing>,
    pub p2o_audio: Box<dyn ByteRing>,
    pub o2p_midi: Option<Box<dyn ByteRing>>,
    pub p2o_midi: Option<Box<dyn ByteRing>>,
    pub get_time: Option<std::sync::Arc<dyn Clock>>,
    pub resampler: Box<dyn Resampler>,
}

impl IoBuffers {
    /// Builds an `IoBuffers` with the mandatory audio rings and the
    /// default [`LinearResampler`]. MIDI and the clock are added with
    /// [`Self::with_midi`].
    pub fn new(o2p_audio: Box<dyn ByteRing>, p2o_audio: Box<dyn ByteRing>) -> Self {
        Self {
            o2p_audio,
            p2o_audio,
            o2p_midi: None,
            p2o_midi: None,
            get_time: None,
            resampler: Box::new(LinearResampler::default()),
        }
    }

    /// Attaches the MIDI rings and clock. MIDI is all-or-nothing: this is
    /// the only way to set any of the three, so a partially-specified
    /// collaborator is unrepresentable.
    pub fn with_midi(
        mut self,
        o2p_midi: Box<dyn ByteRing>,
        p2o_midi: Box<dyn ByteRing>,
        get_time: std::sync::Arc<dyn Clock>,
    ) -> Self {
        self.o2p_midi = Some(o2p_midi);
        self.p2o_midi = Some(p2o_midi);
        self.get_time = Some(get_time);
        self
    }

    /// Attaches just the clock, for DLL-only use without MIDI (a DLL
    /// always requires `get_time`, with or without MIDI attached).
    pub fn with_clock(mut self, get_time: std::sync::Arc<dyn Clock>) -> Self {
        self.get_time = Some(get_time);
        self
    }

    pub fn with_resampler(mut self, resampler: Box<dyn Resampler>) -> Self {
        self.resampler = resampler;
        self
    }
}

/// A linear-interpolation resampler: acceptable only because outbound
/// underflow is rare. Not intended for production audio quality;
/// production collaborators should supply something like a windowed-sinc
/// or polyphase converter instead.
#[derive(Default)]
pub struct LinearResampler;

impl Resampler for LinearResampler {
    fn process(&mut self, input: &[f32], output: &mut [f32], channels: usize, src_ratio: f64) -> usize {
        if channels == 0 || src_ratio <= 0.0 {
            return 0;
        }
        let input_frames = input.len() / channels;
        if input_frames == 0 {
            return 0;
        }
        let output_frames = (output.len() / channels).min(((input_frames as f64) * src_ratio) as usize);

        for out_frame in 0..output_frames {
            let src_pos = out_frame as f64 / src_ratio;
            let i0 = src_pos.floor() as usize;
            let frac = src_pos - i0 as f64;
            let i1 = (i0 + 1).min(input_frames - 1);
            let i0 = i0.min(input_frames - 1);

            for ch in 0..channels {
                let a = input[i0 * channels + ch];
                let b = input[i1 * channels + ch];
                output[out_frame * channels + ch] = a + (b - a) * frac as f32;
            }
        }

        output_frames
    }
}
