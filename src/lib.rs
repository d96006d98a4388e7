//! Bridges 802.11 ad-hoc frames between a PSP console's USB HostFS/Async
//! tunnel and a WiFi-plugin collaborator such as XLink Kai.
//!
//! The [`Bridge`] type is the entry point: open a device, attach an
//! [`EgressSink`], and start the worker threads. See `SPEC_FULL.md` in the
//! repository root for the full protocol and concurrency design.

pub mod bridge;
pub mod bus_pump;
pub mod config;
pub mod device;
pub mod egress;
pub mod error;
pub mod frame;
pub mod protocol;
pub mod queue;
pub mod reassembly;
pub mod segmenter;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use egress::{EgressSink, LoggingSink};
pub use error::BridgeError;
