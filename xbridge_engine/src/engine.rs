//! Engine Supervisor: device open/setup, lifecycle state machine, and the
//! two worker threads — the USB/audio thread (audio-in, audio-out,
//! MIDI-in) and the MIDI-out pacing thread.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use xbridge_core::Spinlock;

use crate::audio::{AudioBridge, AudioLockedState};
use crate::block;
use crate::collaborator::{ByteRing, Clock, DelayLockedLoop, IoBuffers, Resampler};
use crate::config::{DeviceDescriptor, EngineConfig};
use crate::error::{EngineError, Result};
use crate::midi::{self, MidiReadyFlag, MidiScheduler};
use crate::status::Status;
use crate::transfer::TransferPump;
use crate::usb::{self, RusbTransport, UsbTransport};

/// State shared between the engine handle and both worker threads.
struct Shared {
    transport: Box<dyn UsbTransport>,
    config: EngineConfig,
    locked: Spinlock<AudioLockedState>,
    dll: Option<Spinlock<Box<dyn DelayLockedLoop>>>,
    midi_ready: MidiReadyFlag,
}

/// One opened device and its lifecycle. Dropping an `Engine` stops it and
/// joins both worker threads.
pub struct Engine {
    shared: Arc<Shared>,
    audio_thread: Option<JoinHandle<()>>,
    midi_thread: Option<JoinHandle<()>>,
}

/// Everything the audio/USB thread needs to own for the lifetime of one
/// activation: the two mandatory audio rings, the optional inbound MIDI
/// ring, the clock (shared with the MIDI-out thread), and the resampler.
struct AudioThreadIo {
    o2p_audio: Box<dyn ByteRing>,
    p2o_audio: Box<dyn ByteRing>,
    o2p_midi: Option<Box<dyn ByteRing>>,
    clock: Option<Arc<dyn Clock>>,
    resampler: Box<dyn Resampler>,
}

impl Engine {
    /// Opens the device at `(bus, address)`, runs the USB setup sequence,
    /// and returns a handle in `Status::Ready`. `config` carries the
    /// device descriptor and block layout — looking those up from a
    /// vendor/product table is the caller's concern, not the engine's.
    pub fn init(bus: u8, address: u8, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let transport = RusbTransport::open(bus, address)?;
        usb::setup_device(&transport)?;

        let shared = Arc::new(Shared {
            transport: Box::new(transport),
            config,
            locked: Spinlock::new(AudioLockedState::new()),
            dll: None,
            midi_ready: Spinlock::new(true),
        });

        Ok(Self { shared, audio_thread: None, midi_thread: None })
    }

    /// Activates the engine without drift compensation.
    pub fn activate(&mut self, io: IoBuffers) -> Result<()> {
        self.do_activate(io, None)
    }

    /// Activates the engine with a delay-locked loop driving drift
    /// compensation from inbound transfer timing. A DLL always requires
    /// `get_time`.
    pub fn activate_with_dll(&mut self, io: IoBuffers, dll: Box<dyn DelayLockedLoop>) -> Result<()> {
        if io.get_time.is_none() {
            return Err(EngineError::MissingCollaboratorHook("get_time"));
        }
        self.do_activate(io, Some(dll))
    }

    fn do_activate(&mut self, io: IoBuffers, dll: Option<Box<dyn DelayLockedLoop>>) -> Result<()> {
        let IoBuffers { o2p_audio, p2o_audio, o2p_midi, p2o_midi, get_time, resampler } = io;

        let midi_flags = [o2p_midi.is_some(), p2o_midi.is_some(), get_time.is_some()];
        if midi_flags.iter().any(|&present| present) && !midi_flags.iter().all(|&present| present) {
            return Err(EngineError::MissingCollaboratorHook("o2p_midi/p2o_midi/get_time"));
        }

        if let Some(dll) = dll {
            Arc::get_mut(&mut self.shared)
                .expect("activate called before any worker thread was spawned")
                .dll = Some(Spinlock::new(dll));
        }

        self.shared.locked.lock().status = Status::Boot;

        let layout = self.shared.config.layout;
        let in_channels = self.shared.config.device.inputs;
        let out_channels = self.shared.config.device.outputs;

        let mut pump = TransferPump::new(&layout, in_channels, out_channels, midi::USB_BULK_MIDI_SIZE);
        block::init_outbound_headers(&layout, in_channels, pump.audio_out_buf());
        let bridge = AudioBridge::new(layout, in_channels, out_channels);
        let audio_io = AudioThreadIo { o2p_audio, p2o_audio, o2p_midi, clock: get_time.clone(), resampler };

        let audio_shared = Arc::clone(&self.shared);
        self.audio_thread = Some(
            thread::Builder::new()
                .name("xbridge-audio".into())
                .spawn(move || run_audio_thread(audio_shared, pump, bridge, audio_io))
                .map_err(|_| EngineError::ThreadSpawn)?,
        );

        if let (Some(p2o_midi), Some(_)) = (p2o_midi, get_time) {
            let midi_shared = Arc::clone(&self.shared);
            self.midi_thread = Some(
                thread::Builder::new()
                    .name("xbridge-midi-out".into())
                    .spawn(move || run_midi_out_thread(midi_shared, p2o_midi))
                    .map_err(|_| EngineError::ThreadSpawn)?,
            );
        }

        Ok(())
    }

    /// Joins both worker threads (blocks until they exit).
    pub fn wait(&mut self) {
        if let Some(handle) = self.audio_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.midi_thread.take() {
            let _ = handle.join();
        }
    }

    /// Requests shutdown; threads observe this at their next check.
    pub fn stop(&self) {
        self.set_status(Status::Stop);
    }

    pub fn get_status(&self) -> Status {
        self.shared.locked.lock().status
    }

    pub fn set_status(&self, status: Status) {
        self.shared.locked.lock().status = status;
    }

    pub fn is_p2o_audio_enable(&self) -> bool {
        self.shared.locked.lock().p2o_audio_enabled
    }

    pub fn set_p2o_audio_enable(&self, enabled: bool) {
        self.shared.locked.lock().p2o_audio_enabled = enabled;
    }

    pub fn get_device_desc(&self) -> &DeviceDescriptor {
        &self.shared.config.device
    }

    /// `(p2o_latency, p2o_max_latency)`, both in bytes. `p2o_max_latency`
    /// is non-decreasing across a session.
    pub fn p2o_latency(&self) -> (usize, usize) {
        let state = self.shared.locked.lock();
        (state.p2o_latency, state.p2o_max_latency)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.wait();
    }
}

/// The USB/audio thread: drives audio-in, audio-out and inbound MIDI
/// every round; a single submit failure on any endpoint raises
/// `Status::Error` and ends the loop.
fn run_audio_thread(shared: Arc<Shared>, mut pump: TransferPump, mut bridge: AudioBridge, mut io: AudioThreadIo) {
    let mut frames_counter: u16 = 0;

    loop {
        let status = shared.locked.lock().status;
        if status.should_terminate() {
            break;
        }

        if status == Status::Boot {
            let frame_bytes = shared.config.device.inputs * 4;
            if frame_bytes > 0 {
                let whole_frames = io.p2o_audio.read_space() / frame_bytes;
                io.p2o_audio.read(None, whole_frames * frame_bytes);
            }
            pump.audio_out_buf().fill(0);
            bridge.reset_outbound();

            if let Some(dll) = shared.dll.as_ref() {
                dll.lock().reset();
            }

            let mut state = shared.locked.lock();
            state.p2o_latency = 0;
            state.p2o_max_latency = 0;
            state.status = Status::Wait;
            continue;
        }

        if !status.is_cycling() {
            thread::yield_now();
            continue;
        }

        match pump.poll_audio_in(shared.transport.as_ref()) {
            Ok(Some(wire)) => {
                bridge.on_audio_in(wire, &shared.locked, shared.dll.as_ref(), io.clock.as_deref(), io.o2p_audio.as_mut());
            }
            Ok(None) => {}
            Err(_) => {
                shared.locked.lock().status = Status::Error;
                break;
            }
        }

        if let Some(o2p_midi) = io.o2p_midi.as_mut() {
            match pump.poll_midi_in(shared.transport.as_ref()) {
                Ok(Some(wire)) => {
                    if let Some(clock) = io.clock.as_deref() {
                        let status = shared.locked.lock().status;
                        midi::on_midi_in(wire, status, clock, o2p_midi.as_mut());
                    }
                }
                Ok(None) => {}
                Err(_) => {
                    shared.locked.lock().status = Status::Error;
                    break;
                }
            }
        }

        bridge.on_audio_out(
            pump.audio_out_buf(),
            &mut frames_counter,
            &shared.locked,
            io.p2o_audio.as_mut(),
            io.resampler.as_mut(),
        );

        if pump.poll_audio_out(shared.transport.as_ref()).is_err() {
            shared.locked.lock().status = Status::Error;
            break;
        }
    }
}

/// The MIDI-out thread: paces staged bursts against event timestamps.
/// Submission here is synchronous, so there's no window between
/// submitting a burst and the ready flag being observable true again —
/// the flag is set immediately after `write_bulk` returns.
fn run_midi_out_thread(shared: Arc<Shared>, mut p2o_midi: Box<dyn ByteRing>) {
    let sample_time_ns = 1_000_000_000u64 / shared.config.sample_rate_hz.max(1) as u64;
    let smallest_sleep = Duration::from_nanos(sample_time_ns * midi::SMALLEST_SLEEP_FRAMES as u64);
    let mut scheduler = MidiScheduler::new();

    loop {
        if shared.locked.lock().status.should_terminate() {
            break;
        }

        let step = scheduler.step(p2o_midi.as_mut(), smallest_sleep);
        if let Some(burst) = step.burst {
            *shared.midi_ready.lock() = false;
            match shared.transport.write_bulk(usb::EP_MIDI_OUT, &burst, Duration::from_millis(1)) {
                Ok(_) => *shared.midi_ready.lock() = true,
                Err(_) => {
                    shared.locked.lock().status = Status::Error;
                    break;
                }
            }
        }

        thread::sleep(step.sleep_for);
    }
}
