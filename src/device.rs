//! Synchronous USB device handle: enumeration, claim and bulk transfers.
//!
//! The USB library itself is an external collaborator assumed to expose
//! synchronous bulk read/write, enumeration and claim primitives — exactly
//! what `rusb` provides directly. The Bus Pump already owns a dedicated
//! OS thread, so there's no need to wrap these calls for an async
//! runtime; `rusb::DeviceHandle` is called synchronously.

use std::time::Duration;

use log::{info, trace, warn};
use rusb::GlobalContext;

use crate::error::{BridgeError, Result};
use crate::protocol::{PSP_PRODUCT_ID, PSP_VENDOR_ID, USB_CONFIGURATION, USB_INTERFACE};

/// An open, claimed connection to the PSP's USB ad-hoc interface.
///
/// Exactly one exists at any time: it's opened on startup and on every
/// error recovery, and closed on shutdown, error, or claim failure.
pub struct DeviceHandle {
    inner: rusb::DeviceHandle<GlobalContext>,
}

impl DeviceHandle {
    /// Enumerate USB devices, open the first one matching the PSP's
    /// VID:PID, configure and claim it. Logs every non-matching device at
    /// `trace` (useful when the PSP isn't showing up) and returns an error
    /// describing whichever step failed.
    pub fn open() -> Result<Self> {
        let devices = rusb::devices()?;

        for device in devices.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    warn!("could not read device descriptor: {err}");
                    continue;
                }
            };

            if descriptor.vendor_id() != PSP_VENDOR_ID || descriptor.product_id() != PSP_PRODUCT_ID {
                trace!(
                    "non-matching device found: {:04x}:{:04x}",
                    descriptor.vendor_id(),
                    descriptor.product_id()
                );
                continue;
            }

            let mut handle = device.open()?;
            let _ = handle.set_auto_detach_kernel_driver(true);

            handle
                .set_active_configuration(USB_CONFIGURATION)
                .map_err(BridgeError::from)?;
            handle
                .claim_interface(USB_INTERFACE)
                .map_err(BridgeError::from)?;

            info!(
                "opened PSP device {:04x}:{:04x}, configuration {}, interface {}",
                PSP_VENDOR_ID, PSP_PRODUCT_ID, USB_CONFIGURATION, USB_INTERFACE
            );

            return Ok(Self { inner: handle });
        }

        Err(BridgeError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no device matching {PSP_VENDOR_ID:04x}:{PSP_PRODUCT_ID:04x} found"),
        )))
    }

    pub fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> std::io::Result<usize> {
        self.inner
            .read_bulk(endpoint, buf, timeout)
            .map_err(|e| BridgeError::from(e).into())
    }

    pub fn write_bulk(&self, endpoint: u8, data: &[u8], timeout: Duration) -> std::io::Result<usize> {
        self.inner
            .write_bulk(endpoint, data, timeout)
            .map_err(|e| BridgeError::from(e).into())
    }

    /// Reset, release, re-attach the kernel driver and close. Errors here
    /// are logged, not propagated — by the time we're closing, there's
    /// nothing useful to do with a failure.
    pub fn close(self) {
        if let Err(err) = self.inner.reset() {
            warn!("device reset on close failed: {err}");
        }
        if let Err(err) = self.inner.release_interface(USB_INTERFACE) {
            warn!("release_interface on close failed: {err}");
        }
        let _ = self.inner.attach_kernel_driver(USB_INTERFACE);
    }
}
