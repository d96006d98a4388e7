//! Explicit little-endian (de)serialization for the three packed wire
//! headers. The original C++ reads these by casting buffer pointers to
//! `#pragma pack(1)` structs; we parse the byte layout by hand instead so
//! the result doesn't depend on host endianness or struct layout.

use super::constants::*;

/// `HostFsCommand`: magic:u32 | command:u32 | extralen:u32 (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFsCommand {
    pub magic: u32,
    pub command: u32,
    pub extralen: u32,
}

impl HostFsCommand {
    pub const LEN: usize = HOSTFS_COMMAND_LEN;

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::LEN {
            return None;
        }
        Some(Self {
            magic: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            command: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            extralen: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
        })
    }

    pub fn hello() -> Self {
        Self {
            magic: MAGIC_HOSTFS,
            command: HOSTFS_HELLO,
            extralen: 0,
        }
    }

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.command.to_le_bytes());
        out[8..12].copy_from_slice(&self.extralen.to_le_bytes());
        out
    }
}

/// `AsyncCommand`: magic:u32 | channel:u32 (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncCommand {
    pub magic: u32,
    pub channel: u32,
}

impl AsyncCommand {
    pub const LEN: usize = ASYNC_COMMAND_LEN;

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::LEN {
            return None;
        }
        Some(Self {
            magic: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            channel: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
        })
    }

    pub fn user_channel() -> Self {
        Self {
            magic: MAGIC_ASYNC,
            channel: USER_CHANNEL,
        }
    }

    pub fn write_into(self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.channel.to_le_bytes());
    }
}

/// `AsyncSubHeader`: magic:u32 | mode:i32 | size:i32 | ref:i32 (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsyncSubHeader {
    pub magic: u32,
    pub mode: i32,
    pub size: i32,
    pub reference: i32,
}

impl AsyncSubHeader {
    pub const LEN: usize = ASYNC_SUBHEADER_LEN;

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::LEN {
            return None;
        }
        Some(Self {
            magic: u32::from_le_bytes(bytes[0..4].try_into().ok()?),
            mode: i32::from_le_bytes(bytes[4..8].try_into().ok()?),
            size: i32::from_le_bytes(bytes[8..12].try_into().ok()?),
            reference: i32::from_le_bytes(bytes[12..16].try_into().ok()?),
        })
    }

    /// Sub-header for the first fragment of an outbound stitched send.
    pub fn for_send(length: u16) -> Self {
        Self {
            magic: MAGIC_DEBUGPRINT,
            mode: MODE_SEND,
            size: length as i32,
            reference: REF_SEND,
        }
    }

    pub fn write_into(self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.magic.to_le_bytes());
        out[4..8].copy_from_slice(&self.mode.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
        out[12..16].copy_from_slice(&self.reference.to_le_bytes());
    }

    pub fn is_network_packet(&self) -> bool {
        self.magic == MAGIC_DEBUGPRINT && self.mode == MODE_PACKET && self.reference == REF_SEND_PACKET
    }

    pub fn is_debug_text(&self) -> bool {
        self.magic == MAGIC_DEBUGPRINT && self.mode == MODE_DEBUG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostfs_command_round_trips() {
        let cmd = HostFsCommand::hello();
        let bytes = cmd.to_bytes();
        assert_eq!(HostFsCommand::parse(&bytes), Some(cmd));
    }

    #[test]
    fn hostfs_command_matches_scenario_bytes() {
        // Hello handshake bytes: [12 08 2F 78] [BE 00 FC 8F] [00 00 00 00]
        let bytes: [u8; 12] = [
            0x12, 0x08, 0x2F, 0x78, 0xBE, 0x00, 0xFC, 0x8F, 0x00, 0x00, 0x00, 0x00,
        ];
        let cmd = HostFsCommand::parse(&bytes).unwrap();
        assert_eq!(cmd.magic, MAGIC_HOSTFS);
        assert_eq!(cmd.command, HOSTFS_HELLO);
        assert_eq!(cmd.to_bytes(), bytes);
    }

    #[test]
    fn async_command_round_trips() {
        let cmd = AsyncCommand::user_channel();
        let mut buf = [0u8; AsyncCommand::LEN];
        cmd.write_into(&mut buf);
        assert_eq!(AsyncCommand::parse(&buf), Some(cmd));
    }

    #[test]
    fn subheader_for_send_is_mode3_ref0() {
        let header = AsyncSubHeader::for_send(700);
        assert_eq!(header.mode, 3);
        assert_eq!(header.reference, 0);
        assert_eq!(header.size, 700);
    }

    #[test]
    fn short_buffers_fail_to_parse() {
        assert_eq!(HostFsCommand::parse(&[0u8; 11]), None);
        assert_eq!(AsyncCommand::parse(&[0u8; 7]), None);
        assert_eq!(AsyncSubHeader::parse(&[0u8; 15]), None);
    }
}
