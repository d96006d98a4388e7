//! Wire protocol: magic-tagged framing used between the bridge and the
//! PSP's USB-tunneled WiFi plugin.

pub mod constants;
pub mod wire;

pub use constants::*;
pub use wire::{AsyncCommand, AsyncSubHeader, HostFsCommand};
