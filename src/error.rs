//! Crate-level error type for the USB device layer.
//!
//! Grounded in `libusb-async::UsbAsyncError`: a thin wrapper around the
//! underlying USB library's error type with a `Display`/`Error` impl and an
//! `io::Error` conversion that maps the handful of error kinds the bridge
//! actually branches on (timeout, stall, disconnect) to matching
//! `io::ErrorKind`s, collapsing everything else to `io::ErrorKind::Other`.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum BridgeError {
    Usb(rusb::Error),
    Io(io::Error),
}

impl From<rusb::Error> for BridgeError {
    fn from(err: rusb::Error) -> Self {
        BridgeError::Usb(err)
    }
}

impl From<io::Error> for BridgeError {
    fn from(err: io::Error) -> Self {
        BridgeError::Io(err)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Usb(err) => write!(f, "USB operation failed: {err}"),
            BridgeError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Usb(err) => Some(err),
            BridgeError::Io(err) => Some(err),
        }
    }
}

impl From<BridgeError> for io::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Usb(rusb::Error::Timeout) => {
                io::Error::new(io::ErrorKind::WouldBlock, rusb::Error::Timeout)
            }
            BridgeError::Usb(rusb::Error::Pipe) => {
                io::Error::new(io::ErrorKind::BrokenPipe, rusb::Error::Pipe)
            }
            BridgeError::Usb(rusb::Error::Busy) => {
                io::Error::new(io::ErrorKind::WouldBlock, rusb::Error::Busy)
            }
            BridgeError::Usb(rusb::Error::NoDevice) => {
                io::Error::new(io::ErrorKind::NotConnected, rusb::Error::NoDevice)
            }
            BridgeError::Usb(other) => io::Error::new(io::ErrorKind::Other, other),
            BridgeError::Io(err) => err,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
