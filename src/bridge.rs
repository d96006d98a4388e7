//! Top-level lifecycle API: the one type applications outside this crate
//! construct and drive.
//!
//! Wires together a Bus Pump owning the device, a Segmenter turning
//! outbound frames into USB packets, and the Decoder running inline on
//! the Bus Pump thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{error, warn};

use crate::bus_pump::BusPump;
use crate::config::BridgeConfig;
use crate::device::DeviceHandle;
use crate::egress::EgressSink;
use crate::frame::{UsbPacket, WifiFrame};
use crate::queue::BoundedQueue;
use crate::reassembly::Decoder;
use crate::segmenter::Segmenter;

/// The PSP-USB-to-XLink-Kai bridge. Construct with [`Bridge::new`], call
/// [`Bridge::open`] to claim the device, attach an egress sink, then
/// [`Bridge::start`] to spin up the worker threads.
pub struct Bridge {
    config: BridgeConfig,
    device: Option<DeviceHandle>,
    egress: Option<Arc<dyn EgressSink>>,
    wifi_in: Arc<BoundedQueue<WifiFrame>>,
    usb_out: Arc<BoundedQueue<UsbPacket>>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            wifi_in: Arc::new(BoundedQueue::new(config.max_buffered_messages)),
            usb_out: Arc::new(BoundedQueue::new(config.max_buffered_messages)),
            config,
            device: None,
            egress: None,
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    /// Enumerate and claim the PSP's USB interface. Returns `false` if no
    /// matching device is present or claiming fails; the caller should
    /// retry rather than treat this as fatal.
    pub fn open(&mut self) -> bool {
        match DeviceHandle::open() {
            Ok(device) => {
                self.device = Some(device);
                true
            }
            Err(err) => {
                warn!("open failed: {err}");
                false
            }
        }
    }

    /// Attach the collaborator that receives reassembled WiFi frames. Must
    /// be called before [`Bridge::start`].
    pub fn set_egress_sink(&mut self, sink: Arc<dyn EgressSink>) {
        self.egress = Some(sink);
    }

    /// Enqueue a frame to be segmented and sent to the console.
    /// Non-blocking; returns `false` and drops the frame if the queue is
    /// already at `max_buffered_messages` capacity.
    pub fn push(&self, bytes: &[u8]) -> bool {
        let Some(frame) = WifiFrame::from_slice(bytes) else {
            warn!("rejecting frame of {} bytes (invalid length)", bytes.len());
            return false;
        };

        let depth = self.wifi_in.len();
        if depth >= self.config.warn_depth() {
            warn!("wifi-in queue at {depth}/{}", self.wifi_in.capacity());
        }

        self.wifi_in.push(frame)
    }

    /// Spin up the Bus Pump and Segmenter threads. Requires a prior
    /// successful [`Bridge::open`] and [`Bridge::set_egress_sink`] call.
    pub fn start(&mut self) -> bool {
        let Some(device) = self.device.take() else {
            error!("start called before a successful open");
            return false;
        };
        let Some(egress) = self.egress.clone() else {
            error!("start called before an egress sink was attached");
            return false;
        };

        let decoder = Decoder::new(egress);
        let bus_pump = BusPump::new(device, decoder, self.config, self.usb_out.clone(), self.stop.clone());
        self.workers.push(std::thread::spawn(move || bus_pump.run()));

        let segmenter = Segmenter::new();
        let wifi_in = self.wifi_in.clone();
        let usb_out = self.usb_out.clone();
        self.workers.push(std::thread::spawn(move || segmenter.run(wifi_in, usb_out)));

        true
    }

    /// Signal both worker threads to stop. Does not block; call
    /// [`Bridge::join`] afterwards to wait for a clean shutdown.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
        self.wifi_in.stop();
        self.usb_out.stop();
    }

    /// Wait for both worker threads to exit. Safe to call even if
    /// [`Bridge::start`] was never called.
    pub fn join(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("a bridge worker thread panicked");
            }
        }
    }

    pub fn close(&mut self) {
        self.request_stop();
        self.join();
        if let Some(device) = self.device.take() {
            device.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_before_start_queues_without_panicking() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert!(bridge.push(&[1, 2, 3]));
        assert_eq!(bridge.wifi_in.len(), 1);
    }

    #[test]
    fn push_rejects_oversized_frames() {
        let bridge = Bridge::new(BridgeConfig::default());
        let oversized = vec![0u8; crate::protocol::MAX_WIFI_FRAME_LEN + 1];
        assert!(!bridge.push(&oversized));
    }

    #[test]
    fn start_without_open_fails() {
        let mut bridge = Bridge::new(BridgeConfig::default());
        bridge.set_egress_sink(Arc::new(crate::egress::LoggingSink::new("test")));
        assert!(!bridge.start());
    }

    #[test]
    fn join_with_no_workers_returns_immediately() {
        let mut bridge = Bridge::new(BridgeConfig::default());
        bridge.join();
    }
}
