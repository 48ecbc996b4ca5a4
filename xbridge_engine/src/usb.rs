//! USB transport: a thin trait boundary over the device handle, so
//! [`crate::transfer`] and tests don't need a real USB device. Grounded on
//! `rusb`'s blocking, synchronous API: device setup, then a round-robin
//! poll loop over the four endpoints, since stable `rusb` has no async
//! transfer submission.
//!
//! Audio moves over interrupt transfers, MIDI over bulk transfers — two
//! distinct endpoint types on the device, so the trait exposes both.
//!
//! Methods take `&self`, matching `rusb::DeviceHandle`: libusb serialises
//! transfers on different endpoints internally, so the audio thread and
//! the MIDI-out thread can share one transport without an engine-side
//! lock held across I/O.

use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, UsbContext};

use crate::error::{EngineError, Result};

/// Endpoint addresses, fixed by the device's USB descriptor. Audio
/// endpoints are interrupt transfers; MIDI endpoints are bulk. Direction
/// bit (0x80) set for IN endpoints.
pub const EP_AUDIO_IN: u8 = 0x83;
pub const EP_AUDIO_OUT: u8 = 0x03;
pub const EP_MIDI_IN: u8 = 0x81;
pub const EP_MIDI_OUT: u8 = 0x01;

/// Interface numbers and alternate settings selected during setup:
/// audio-in, audio-out, then MIDI, each on interface 1..3.
const SETUP: [(u8, u8); 3] = [(1, 3), (2, 2), (3, 0)];

const CONFIGURATION: u8 = 1;

/// Everything the transfer pump and engine setup need from a USB device,
/// abstracted so tests can run against a fake.
pub trait UsbTransport: Send + Sync {
    fn set_configuration(&self, configuration: u8) -> Result<()>;
    fn claim_interface(&self, interface: u8) -> Result<()>;
    fn set_alternate_setting(&self, interface: u8, setting: u8) -> Result<()>;
    fn clear_halt(&self, endpoint: u8) -> Result<()>;

    /// Blocking bulk read with a bounded timeout; returns the number of
    /// bytes actually read (may be fewer than `buf.len()` on timeout,
    /// which the transfer pump treats as "nothing ready yet"). Used for
    /// the MIDI endpoints.
    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Blocking bulk write with a bounded timeout. Used for the MIDI
    /// endpoints.
    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize>;

    /// Blocking interrupt read with a bounded timeout, same semantics as
    /// [`Self::read_bulk`]. Used for the audio-in endpoint.
    fn read_interrupt(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Blocking interrupt write with a bounded timeout. Used for the
    /// audio-out endpoint.
    fn write_interrupt(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize>;
}

/// Runs the full device setup sequence: select the configuration, then
/// for each interface claim it and select the alternate setting that
/// activates its endpoints, then clear any stall left over from a
/// previous session on all four endpoints.
pub fn setup_device(transport: &dyn UsbTransport) -> Result<()> {
    transport.set_configuration(CONFIGURATION)?;
    for (interface, setting) in SETUP {
        transport.claim_interface(interface)?;
        transport.set_alternate_setting(interface, setting)?;
    }
    for endpoint in [EP_AUDIO_IN, EP_AUDIO_OUT, EP_MIDI_IN, EP_MIDI_OUT] {
        transport.clear_halt(endpoint)?;
    }
    Ok(())
}

/// `UsbTransport` backed by a real `rusb` device handle.
pub struct RusbTransport {
    handle: DeviceHandle<Context>,
}

impl RusbTransport {
    /// Opens the device at the given USB bus/address.
    pub fn open(bus: u8, address: u8) -> Result<Self> {
        let context = Context::new().map_err(|_| EngineError::UsbInit)?;
        let device = find_device(&context, bus, address).ok_or(EngineError::DeviceNotFound)?;
        let handle = device.open().map_err(|_| EngineError::DeviceNotFound)?;
        Ok(Self { handle })
    }
}

fn find_device(context: &Context, bus: u8, address: u8) -> Option<Device<Context>> {
    context
        .devices()
        .ok()?
        .iter()
        .find(|device| device.bus_number() == bus && device.address() == address)
}

impl UsbTransport for RusbTransport {
    fn set_configuration(&self, configuration: u8) -> Result<()> {
        self.handle
            .set_active_configuration(configuration)
            .map_err(|_| EngineError::SetConfiguration)
    }

    fn claim_interface(&self, interface: u8) -> Result<()> {
        self.handle.claim_interface(interface).map_err(|_| EngineError::ClaimInterface)
    }

    fn set_alternate_setting(&self, interface: u8, setting: u8) -> Result<()> {
        self.handle
            .set_alternate_setting(interface, setting)
            .map_err(|_| EngineError::SetAltSetting)
    }

    fn clear_halt(&self, endpoint: u8) -> Result<()> {
        self.handle.clear_halt(endpoint).map_err(|_| EngineError::ClearEndpoint)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self.handle.read_bulk(endpoint, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(_) => Err(EngineError::PrepareTransfer),
        }
    }

    fn write_bulk(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize> {
        match self.handle.write_bulk(endpoint, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(_) => Err(EngineError::PrepareTransfer),
        }
    }

    fn read_interrupt(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        match self.handle.read_interrupt(endpoint, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(_) => Err(EngineError::PrepareTransfer),
        }
    }

    fn write_interrupt(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize> {
        match self.handle.write_interrupt(endpoint, buf, timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(_) => Err(EngineError::PrepareTransfer),
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// An in-memory `UsbTransport` for exercising setup/transfer logic
    /// without a real device. Interior-mutable so it can implement the
    /// same `&self` trait as [`super::RusbTransport`].
    #[derive(Default)]
    pub struct FakeTransport {
        inner: Mutex<FakeInner>,
    }

    #[derive(Default)]
    struct FakeInner {
        configuration: Option<u8>,
        claimed: Vec<u8>,
        alt_settings: Vec<(u8, u8)>,
        cleared_halts: Vec<u8>,
        inbound: std::collections::HashMap<u8, VecDeque<u8>>,
        outbound: std::collections::HashMap<u8, Vec<u8>>,
        fail_claim_interface: Option<u8>,
    }

    impl FakeTransport {
        pub fn with_fail_claim_interface(interface: u8) -> Self {
            let fake = Self::default();
            fake.inner.lock().unwrap().fail_claim_interface = Some(interface);
            fake
        }

        pub fn queue_inbound(&self, endpoint: u8, bytes: impl IntoIterator<Item = u8>) {
            self.inner.lock().unwrap().inbound.entry(endpoint).or_default().extend(bytes);
        }

        pub fn configuration(&self) -> Option<u8> {
            self.inner.lock().unwrap().configuration
        }

        pub fn claimed(&self) -> Vec<u8> {
            self.inner.lock().unwrap().claimed.clone()
        }

        pub fn alt_settings(&self) -> Vec<(u8, u8)> {
            self.inner.lock().unwrap().alt_settings.clone()
        }

        pub fn cleared_halts(&self) -> Vec<u8> {
            self.inner.lock().unwrap().cleared_halts.clone()
        }

        pub fn outbound(&self, endpoint: u8) -> Vec<u8> {
            self.inner.lock().unwrap().outbound.get(&endpoint).cloned().unwrap_or_default()
        }
    }

    impl UsbTransport for FakeTransport {
        fn set_configuration(&self, configuration: u8) -> Result<()> {
            self.inner.lock().unwrap().configuration = Some(configuration);
            Ok(())
        }

        fn claim_interface(&self, interface: u8) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_claim_interface == Some(interface) {
                return Err(EngineError::ClaimInterface);
            }
            inner.claimed.push(interface);
            Ok(())
        }

        fn set_alternate_setting(&self, interface: u8, setting: u8) -> Result<()> {
            self.inner.lock().unwrap().alt_settings.push((interface, setting));
            Ok(())
        }

        fn clear_halt(&self, endpoint: u8) -> Result<()> {
            self.inner.lock().unwrap().cleared_halts.push(endpoint);
            Ok(())
        }

        fn read_bulk(&self, endpoint: u8, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            let mut inner = self.inner.lock().unwrap();
            let queue = inner.inbound.entry(endpoint).or_default();
            let n = buf.len().min(queue.len());
            for slot in buf.iter_mut().take(n) {
                *slot = queue.pop_front().unwrap();
            }
            Ok(n)
        }

        fn write_bulk(&self, endpoint: u8, buf: &[u8], _timeout: Duration) -> Result<usize> {
            self.inner.lock().unwrap().outbound.entry(endpoint).or_default().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn read_interrupt(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
            self.read_bulk(endpoint, buf, timeout)
        }

        fn write_interrupt(&self, endpoint: u8, buf: &[u8], timeout: Duration) -> Result<usize> {
            self.write_bulk(endpoint, buf, timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeTransport;
    use super::*;

    #[test]
    fn setup_device_claims_three_interfaces_with_expected_alt_settings() {
        let fake = FakeTransport::default();
        setup_device(&fake).unwrap();

        assert_eq!(fake.configuration(), Some(CONFIGURATION));
        assert_eq!(fake.claimed(), vec![1, 2, 3]);
        assert_eq!(fake.alt_settings(), vec![(1, 3), (2, 2), (3, 0)]);
        assert_eq!(fake.cleared_halts(), vec![EP_AUDIO_IN, EP_AUDIO_OUT, EP_MIDI_IN, EP_MIDI_OUT]);
    }

    #[test]
    fn setup_device_propagates_claim_failure() {
        let fake = FakeTransport::with_fail_claim_interface(2);
        let err = setup_device(&fake).unwrap_err();
        assert_eq!(err, EngineError::ClaimInterface);
        // Never reached interface 3.
        assert_eq!(fake.claimed(), vec![1]);
    }

    #[test]
    fn fake_read_bulk_drains_queued_bytes_and_reports_len() {
        let fake = FakeTransport::default();
        fake.queue_inbound(EP_AUDIO_IN, [1u8, 2, 3]);

        let mut buf = [0u8; 8];
        let n = fake.read_bulk(EP_AUDIO_IN, &mut buf, Duration::from_millis(10)).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }
}
