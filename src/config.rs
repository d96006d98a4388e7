//! Tunables recognized at construction time.
//!
//! A small `serde`-derived struct, in the same shape used elsewhere in
//! this codebase for IPC-passed configuration. Loading a `BridgeConfig`
//! from a file is left to the CLI binary; the core library only ever
//! takes an already-built value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Capacity of each bounded queue (WiFi-in and USB-out).
    pub max_buffered_messages: usize,
    /// Cap on full device-reset cycles before terminal shutdown.
    pub max_fatal_retries: u32,
    /// Cap on consecutive bulk read/write failures before escalating to a fatal error.
    pub max_read_write_retries: u32,
    /// Per bulk-read timeout, in milliseconds.
    pub read_timeout_ms: u64,
    /// Per bulk-write timeout, in milliseconds.
    pub write_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_buffered_messages: 1000,
            max_fatal_retries: 5000,
            max_read_write_retries: 5000,
            read_timeout_ms: 2,
            write_timeout_ms: 2,
        }
    }
}

impl BridgeConfig {
    /// Depth at which a queue is considered over half full and should warn.
    pub fn warn_depth(&self) -> usize {
        self.max_buffered_messages / 2
    }
}
