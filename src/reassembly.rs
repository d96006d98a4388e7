//! Protocol Decoder & Reassembler: parses the three magic framings and
//! rebuilds complete WiFi frames from consecutive 512-byte USB packets.
//!
//! Pure and single-threaded — called only from the Bus Pump, one received
//! USB packet at a time. It never touches the device; anything that needs
//! device access (the hello handshake, a fatal reset) is reported back as
//! a [`DecoderAction`] for the Bus Pump to act on.

use std::sync::Arc;

use log::{debug, error, trace, warn};

use crate::egress::EgressSink;
use crate::frame::WifiFrame;
use crate::protocol::*;

/// What the Bus Pump should do after handing a packet to the decoder.
#[derive(Debug, PartialEq, Eq)]
pub enum DecoderAction {
    /// Nothing beyond normal bookkeeping.
    None,
    /// The console sent a HostFS Hello; the Bus Pump should reply.
    SendHello,
    /// The console sent something other than Hello on the HostFS channel —
    /// a rude peer. Triggers a full reset.
    FatalPeer,
}

pub struct Decoder {
    egress: Arc<dyn EgressSink>,
    stitching: bool,
    filled: usize,
    target: usize,
    buffer: Box<[u8; MAX_WIFI_FRAME_LEN]>,
    last_emitted: Option<WifiFrame>,
}

impl Decoder {
    pub fn new(egress: Arc<dyn EgressSink>) -> Self {
        Self {
            egress,
            stitching: false,
            filled: 0,
            target: 0,
            buffer: Box::new([0u8; MAX_WIFI_FRAME_LEN]),
            last_emitted: None,
        }
    }

    /// Discard in-flight reassembly state. Called on device reset so
    /// stale fragments from before the reset are never stitched onto
    /// frames received after it.
    pub fn reset(&mut self) {
        self.stitching = false;
        self.filled = 0;
        self.target = 0;
    }

    pub fn is_stitching(&self) -> bool {
        self.stitching
    }

    /// Feed one received USB packet to the decoder.
    pub fn handle_packet(&mut self, bytes: &[u8]) -> DecoderAction {
        if bytes.len() < HostFsCommand::LEN {
            debug!("packet too short to be usable ({} bytes)", bytes.len());
            return DecoderAction::None;
        }

        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        match magic {
            MAGIC_HOSTFS => self.handle_hostfs(bytes),
            MAGIC_ASYNC => {
                self.handle_async(bytes);
                DecoderAction::None
            }
            MAGIC_BULK => {
                debug!("bulk frame received, unexpected on this channel");
                DecoderAction::None
            }
            other => {
                debug!("magic not recognized: {other:#010x}");
                DecoderAction::None
            }
        }
    }

    fn handle_hostfs(&mut self, bytes: &[u8]) -> DecoderAction {
        let Some(cmd) = HostFsCommand::parse(bytes) else {
            return DecoderAction::None;
        };
        if cmd.command == HOSTFS_HELLO {
            DecoderAction::SendHello
        } else {
            error!(
                "PSP is being rude and not sending a Hello back: {:#010x}",
                cmd.command
            );
            DecoderAction::FatalPeer
        }
    }

    fn handle_async(&mut self, bytes: &[u8]) {
        let Some(header) = AsyncCommand::parse(bytes) else {
            return;
        };
        if header.channel != USER_CHANNEL {
            debug!("async channel {} ignored (not the user channel)", header.channel);
            return;
        }

        if self.stitching {
            self.handle_stitching(bytes);
        } else {
            self.handle_not_stitching(bytes);
        }
    }

    fn handle_not_stitching(&mut self, bytes: &[u8]) {
        if bytes.len() <= ASYNC_HEADER_AND_SUBHEADER_LEN {
            trace!("async packet too short to carry a sub-header, dropping");
            return;
        }

        let Some(sub) = AsyncSubHeader::parse(&bytes[ASYNC_COMMAND_LEN..]) else {
            return;
        };

        if sub.is_network_packet() {
            let Some(target) = valid_target(sub.size) else {
                warn!("sub-header claims implausible size {}, dropping", sub.size);
                return;
            };

            let payload = &bytes[ASYNC_HEADER_AND_SUBHEADER_LEN..];
            self.filled = payload.len();
            self.target = target;
            self.buffer[..payload.len()].copy_from_slice(payload);

            if target > FIRST_FRAGMENT_PAYLOAD_MAX {
                self.stitching = true;
            } else {
                self.emit_and_reset();
            }
        } else if sub.is_debug_text() {
            let text_bytes = &bytes[ASYNC_HEADER_AND_SUBHEADER_LEN..];
            debug!("PSP: {}", String::from_utf8_lossy(text_bytes));
        } else {
            debug!("unrecognized async sub-header: {sub:?}");
        }
    }

    fn handle_stitching(&mut self, bytes: &[u8]) {
        if looks_like_new_subheader(bytes) {
            warn!(
                "new frame started mid-stitch at {} of {} bytes, emitting partial frame and resyncing",
                self.filled, self.target
            );
            self.emit_and_reset();
            self.handle_not_stitching(bytes);
            return;
        }

        if bytes.len() <= ASYNC_COMMAND_LEN {
            trace!("continuation packet too short to carry data, dropping");
            return;
        }

        let payload = &bytes[ASYNC_COMMAND_LEN..];
        let new_filled = self.filled + payload.len();
        if new_filled > MAX_WIFI_FRAME_LEN {
            error!(
                "reassembly overflow ({new_filled} > {MAX_WIFI_FRAME_LEN}), dropping frame"
            );
            self.reset();
            return;
        }

        self.buffer[self.filled..new_filled].copy_from_slice(payload);
        self.filled = new_filled;

        if self.filled >= self.target {
            self.emit_and_reset();
        }
    }

    fn emit_and_reset(&mut self) {
        let Some(frame) = WifiFrame::from_slice(&self.buffer[..self.filled]) else {
            self.reset();
            return;
        };

        let is_duplicate = self.last_emitted.as_ref() == Some(&frame);
        if !is_duplicate {
            self.egress.send(frame.as_slice());
            self.last_emitted = Some(frame);
        } else {
            trace!("dropping duplicate {} byte frame", self.filled);
        }

        self.reset();
    }
}

/// Reject sizes that can't possibly be a real 802.11 frame before they're
/// used to size a copy or drive the stitching state machine.
fn valid_target(size: i32) -> Option<usize> {
    if size <= 0 {
        return None;
    }
    let size = size as usize;
    if size > MAX_WIFI_FRAME_LEN {
        return None;
    }
    Some(size)
}

/// Detects whether a packet arriving mid-stitch is actually the start of a
/// new frame: it carries a sub-header whose magic is `DEBUGPRINT`. This is
/// the only signal the console gives when a stitched frame happens to be
/// exactly packet-aligned and has no terminator.
fn looks_like_new_subheader(bytes: &[u8]) -> bool {
    if bytes.len() <= ASYNC_HEADER_AND_SUBHEADER_LEN {
        return false;
    }
    matches!(
        AsyncSubHeader::parse(&bytes[ASYNC_COMMAND_LEN..]),
        Some(sub) if sub.magic == MAGIC_DEBUGPRINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::egress::test_support::CollectingSink;

    fn async_header(buf: &mut Vec<u8>) {
        let cmd = AsyncCommand::user_channel();
        let mut hdr = [0u8; AsyncCommand::LEN];
        cmd.write_into(&mut hdr);
        buf.extend_from_slice(&hdr);
    }

    fn sub_header(buf: &mut Vec<u8>, mode: i32, reference: i32, size: i32) {
        let sub = AsyncSubHeader {
            magic: MAGIC_DEBUGPRINT,
            mode,
            size,
            reference,
        };
        let mut hdr = [0u8; AsyncSubHeader::LEN];
        sub.write_into(&mut hdr);
        buf.extend_from_slice(&hdr);
    }

    fn new_decoder() -> (Decoder, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::default());
        (Decoder::new(sink.clone()), sink)
    }

    #[test]
    fn hostfs_hello_triggers_send_hello() {
        let (mut decoder, _) = new_decoder();
        let cmd = HostFsCommand::hello();
        let action = decoder.handle_packet(&cmd.to_bytes());
        assert_eq!(action, DecoderAction::SendHello);
    }

    #[test]
    fn hostfs_non_hello_is_fatal() {
        let (mut decoder, _) = new_decoder();
        let cmd = HostFsCommand {
            magic: MAGIC_HOSTFS,
            command: 0xDEAD,
            extralen: 0,
        };
        let action = decoder.handle_packet(&cmd.to_bytes());
        assert_eq!(action, DecoderAction::FatalPeer);
    }

    #[test]
    fn unknown_magic_is_ignored() {
        let (mut decoder, sink) = new_decoder();
        let mut bytes = 0xDEADBEEFu32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let action = decoder.handle_packet(&bytes);
        assert_eq!(action, DecoderAction::None);
        assert!(sink.frames.lock().unwrap().is_empty());
        assert!(!decoder.is_stitching());
    }

    #[test]
    fn single_packet_frame_emits_payload_only() {
        let (mut decoder, sink) = new_decoder();
        let payload = vec![0xABu8; 36];

        let mut packet = Vec::new();
        async_header(&mut packet);
        sub_header(&mut packet, MODE_PACKET, REF_SEND_PACKET, 36);
        packet.extend_from_slice(&payload);

        decoder.handle_packet(&packet);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], payload);
        assert!(!decoder.is_stitching());
    }

    #[test]
    fn two_packet_stitched_frame_reassembles() {
        let (mut decoder, sink) = new_decoder();
        let total_len = 700usize;
        let full: Vec<u8> = (0..total_len).map(|i| (i % 256) as u8).collect();

        let mut first = Vec::new();
        async_header(&mut first);
        sub_header(&mut first, MODE_PACKET, REF_SEND_PACKET, total_len as i32);
        first.extend_from_slice(&full[..488]);
        assert_eq!(first.len(), MAX_USB_PACKET_SIZE);

        decoder.handle_packet(&first);
        assert!(decoder.is_stitching());

        let mut second = Vec::new();
        async_header(&mut second);
        second.extend_from_slice(&full[488..]);

        decoder.handle_packet(&second);
        assert!(!decoder.is_stitching());

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], full);
    }

    #[test]
    fn resync_emits_partial_frame_then_starts_fresh() {
        let (mut decoder, sink) = new_decoder();

        let mut first = Vec::new();
        async_header(&mut first);
        sub_header(&mut first, MODE_PACKET, REF_SEND_PACKET, 1000);
        first.extend_from_slice(&vec![0x11u8; 488]);
        decoder.handle_packet(&first);
        assert!(decoder.is_stitching());

        // A new frame starts before the first ever completes.
        let fresh_payload = vec![0x22u8; 10];
        let mut second = Vec::new();
        async_header(&mut second);
        sub_header(&mut second, MODE_PACKET, REF_SEND_PACKET, 10);
        second.extend_from_slice(&fresh_payload);
        decoder.handle_packet(&second);

        let frames = sink.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], vec![0x11u8; 488]);
        assert_eq!(frames[1], fresh_payload);
        assert!(!decoder.is_stitching());
    }

    #[test]
    fn overflow_is_dropped_without_panicking() {
        let (mut decoder, sink) = new_decoder();

        let mut first = Vec::new();
        async_header(&mut first);
        sub_header(&mut first, MODE_PACKET, REF_SEND_PACKET, 2304);
        first.extend_from_slice(&vec![0x33u8; 488]);
        decoder.handle_packet(&first);

        // Keep appending continuation packets well past the 2304 cap.
        for _ in 0..10 {
            let mut cont = Vec::new();
            async_header(&mut cont);
            cont.extend_from_slice(&vec![0x44u8; 504]);
            decoder.handle_packet(&cont);
        }

        assert!(!decoder.is_stitching());
        assert!(sink.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn dedup_drops_consecutive_identical_frames() {
        let (mut decoder, sink) = new_decoder();
        let payload = vec![0x55u8; 20];

        for _ in 0..2 {
            let mut packet = Vec::new();
            async_header(&mut packet);
            sub_header(&mut packet, MODE_PACKET, REF_SEND_PACKET, 20);
            packet.extend_from_slice(&payload);
            decoder.handle_packet(&packet);
        }

        assert_eq!(sink.frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn debug_text_is_dropped_not_emitted() {
        let (mut decoder, sink) = new_decoder();
        let mut packet = Vec::new();
        async_header(&mut packet);
        sub_header(&mut packet, MODE_DEBUG, REF_DEBUG, 0);
        packet.extend_from_slice(b"hello from the psp");
        decoder.handle_packet(&packet);
        assert!(sink.frames.lock().unwrap().is_empty());
    }
}
