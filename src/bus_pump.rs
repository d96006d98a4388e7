//! Bus Pump: the only thread that ever touches the USB device.
//!
//! Runs a supervisor loop: a hello-check gate, conditional read/write
//! depending on which side is mid-stitch, and a full reset-with-retry-cap
//! on fatal errors. Both sides interleave within one loop iteration with
//! short, bounded timeouts instead of spinning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::device::DeviceHandle;
use crate::frame::UsbPacket;
use crate::protocol::wire::HostFsCommand;
use crate::protocol::{EP_DATA_IN, EP_DATA_OUT, EP_HELLO, MAGIC_HOSTFS, MAX_USB_PACKET_SIZE};
use crate::queue::BoundedQueue;
use crate::reassembly::{Decoder, DecoderAction};
use crate::config::BridgeConfig;

const HELLO_WRITE_TIMEOUT: Duration = Duration::from_millis(1000);
const HELLO_POLL_TIMEOUT: Duration = Duration::from_millis(1000);
const HELLO_REPLY_TIMEOUT: Duration = Duration::from_millis(10_000);
const RESET_BACKOFF: Duration = Duration::from_millis(100);

pub struct BusPump {
    device: Option<DeviceHandle>,
    decoder: Decoder,
    config: BridgeConfig,
    usb_out: Arc<BoundedQueue<UsbPacket>>,
    stop: Arc<AtomicBool>,
    hello_confirmed: bool,
    send_stitching: bool,
    rw_retries: u32,
    fatal_retries: u32,
}

impl BusPump {
    pub fn new(
        device: DeviceHandle,
        decoder: Decoder,
        config: BridgeConfig,
        usb_out: Arc<BoundedQueue<UsbPacket>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device: Some(device),
            decoder,
            config,
            usb_out,
            stop,
            hello_confirmed: false,
            send_stitching: false,
            rw_retries: 0,
            fatal_retries: 0,
        }
    }

    /// Runs until `stop` is set or the fatal-retry budget is exhausted.
    /// Consumes `self` — the Bus Pump owns the device handle for its
    /// entire lifetime and has nothing useful to return.
    pub fn run(mut self) {
        while !self.stop.load(Ordering::Relaxed) {
            if !self.hello_confirmed {
                if !self.do_handshake() {
                    if self.stop.load(Ordering::Relaxed) {
                        break;
                    }
                    if !self.full_reset() {
                        break;
                    }
                }
                continue;
            }

            let receive_stitching = self.decoder.is_stitching();

            if !self.send_stitching {
                if let Err(()) = self.try_read() {
                    if !self.full_reset() {
                        break;
                    }
                    continue;
                }
            }

            if !receive_stitching {
                if let Err(()) = self.try_write() {
                    if !self.full_reset() {
                        break;
                    }
                    continue;
                }
            }
        }

        if let Some(device) = self.device.take() {
            device.close();
        }
        info!("bus pump stopped");
    }

    /// Write the 4-byte HostFS magic, await the console's Hello reply, and
    /// echo a full `HostFsCommand::hello()` back. Returns `false` on a
    /// hard USB error (the caller resets); a read timeout just retries.
    fn do_handshake(&mut self) -> bool {
        let Some(device) = self.device.as_ref() else {
            return false;
        };

        let magic = MAGIC_HOSTFS.to_le_bytes();
        match device.write_bulk(EP_HELLO, &magic, HELLO_WRITE_TIMEOUT) {
            Ok(n) if n == magic.len() => {}
            Ok(n) => {
                warn!("hello write was short ({n} of {} bytes)", magic.len());
                return false;
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return true,
            Err(err) => {
                warn!("hello write failed: {err}");
                return false;
            }
        }

        let mut buf = [0u8; MAX_USB_PACKET_SIZE];
        let read = match device.read_bulk(EP_DATA_IN, &mut buf, HELLO_POLL_TIMEOUT) {
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("still waiting for hello reply");
                return true;
            }
            Err(err) => {
                warn!("hello read failed: {err}");
                return false;
            }
        };

        match self.decoder.handle_packet(&buf[..read]) {
            DecoderAction::SendHello => {
                let reply = HostFsCommand::hello().to_bytes();
                if let Err(err) = device.write_bulk(EP_HELLO, &reply, HELLO_REPLY_TIMEOUT) {
                    warn!("hello reply failed: {err}");
                    return false;
                }
                info!("hello handshake complete");
                self.hello_confirmed = true;
                self.rw_retries = 0;
                true
            }
            DecoderAction::FatalPeer => false,
            DecoderAction::None => true,
        }
    }

    fn try_read(&mut self) -> Result<(), ()> {
        let Some(device) = self.device.as_ref() else {
            return Err(());
        };

        let mut buf = [0u8; MAX_USB_PACKET_SIZE];
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        match device.read_bulk(EP_DATA_IN, &mut buf, timeout) {
            Ok(n) => {
                self.rw_retries = 0;
                match self.decoder.handle_packet(&buf[..n]) {
                    DecoderAction::FatalPeer => Err(()),
                    DecoderAction::SendHello => {
                        // Console re-greeted mid-session; answer and carry on.
                        if let Some(device) = self.device.as_ref() {
                            let reply = HostFsCommand::hello().to_bytes();
                            let _ = device.write_bulk(EP_HELLO, &reply, HELLO_REPLY_TIMEOUT);
                        }
                        Ok(())
                    }
                    DecoderAction::None => Ok(()),
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(timeout);
                Ok(())
            }
            Err(err) => {
                debug!("bulk read error: {err}");
                self.count_retry()
            }
        }
    }

    fn try_write(&mut self) -> Result<(), ()> {
        let Some(packet) = self.usb_out.try_pop() else {
            return Ok(());
        };

        let Some(device) = self.device.as_ref() else {
            return Err(());
        };

        let timeout = Duration::from_millis(self.config.write_timeout_ms);
        match device.write_bulk(EP_DATA_OUT, packet.as_slice(), timeout) {
            Ok(_) => {
                self.rw_retries = 0;
                self.send_stitching = packet.more;
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(timeout);
                Ok(())
            }
            Err(err) => {
                debug!("bulk write error: {err}");
                self.count_retry()
            }
        }
    }

    fn count_retry(&mut self) -> Result<(), ()> {
        self.rw_retries += 1;
        if self.rw_retries >= self.config.max_read_write_retries {
            error!("read/write retry budget exhausted ({})", self.rw_retries);
            Err(())
        } else {
            Ok(())
        }
    }

    /// Tear down and reopen the device, clear all in-flight state, and
    /// retry the hello handshake. Returns `false` once the fatal-retry
    /// budget is exhausted, telling `run` to give up entirely.
    fn full_reset(&mut self) -> bool {
        self.fatal_retries += 1;
        if self.fatal_retries > self.config.max_fatal_retries {
            error!("fatal retry budget exhausted ({}), giving up", self.fatal_retries);
            return false;
        }

        warn!("resetting USB device (attempt {})", self.fatal_retries);

        if let Some(device) = self.device.take() {
            device.close();
        }
        self.decoder.reset();
        self.usb_out.clear();
        self.hello_confirmed = false;
        self.send_stitching = false;
        self.rw_retries = 0;

        std::thread::sleep(RESET_BACKOFF);

        match DeviceHandle::open() {
            Ok(device) => {
                self.device = Some(device);
                true
            }
            Err(err) => {
                warn!("reopen failed: {err}");
                true
            }
        }
    }

    pub fn request_stop(stop: &Arc<AtomicBool>) {
        stop.store(true, Ordering::Relaxed);
    }
}
