//! Send Segmenter: fragments outbound WiFi frames into header-prefixed USB
//! packets and runs as its own thread, independent of the Bus Pump.
//!
//! The first fragment carries both the `AsyncCommand` and
//! `AsyncSubHeader` (24 bytes of overhead, 488 bytes of payload); every
//! later fragment carries only the `AsyncCommand` (8 bytes of overhead,
//! 504 bytes of payload).

use std::sync::Arc;
use std::time::Duration;

use log::{error, trace, warn};

use crate::frame::{UsbPacket, WifiFrame};
use crate::protocol::*;
use crate::queue::BoundedQueue;

pub struct Segmenter {
    last_sent: Option<WifiFrame>,
}

impl Segmenter {
    pub fn new() -> Self {
        Self { last_sent: None }
    }

    /// Run the segmenter loop until `wifi_in` is stopped. Pops one frame at
    /// a time, deduplicates against the previous frame, and fragments it
    /// onto `usb_out`.
    pub fn run(mut self, wifi_in: Arc<BoundedQueue<WifiFrame>>, usb_out: Arc<BoundedQueue<UsbPacket>>) {
        while let Some(frame) = wifi_in.pop_timeout(Duration::from_millis(200)) {
            self.handle_frame(frame, &usb_out);
        }
    }

    fn handle_frame(&mut self, frame: WifiFrame, usb_out: &BoundedQueue<UsbPacket>) {
        if self.last_sent.as_ref() == Some(&frame) {
            trace!("dropping duplicate {} byte outbound frame", frame.length);
            return;
        }

        self.fragment(frame.as_slice(), usb_out);
        self.last_sent = Some(frame);
    }

    fn fragment(&self, bytes: &[u8], usb_out: &BoundedQueue<UsbPacket>) {
        let total_len = bytes.len();
        let mut offset = 0usize;
        let mut first = true;

        while offset < total_len {
            let header_len = if first {
                ASYNC_HEADER_AND_SUBHEADER_LEN
            } else {
                ASYNC_COMMAND_LEN
            };
            let payload_max = MAX_USB_PACKET_SIZE - header_len;
            let remaining = total_len - offset;
            let chunk_len = remaining.min(payload_max);
            let more = remaining > chunk_len;

            let packet = build_packet(
                first,
                total_len as u16,
                &bytes[offset..offset + chunk_len],
                more,
            );

            let depth = usb_out.len();
            if depth >= usb_out.capacity() / 2 {
                warn!("usb-out queue at {depth}/{}", usb_out.capacity());
            }

            if !usb_out.push(packet) {
                error!(
                    "USB-out queue full, dropping remainder of {} byte frame ({} bytes already sent)",
                    total_len, offset
                );
                return;
            }

            offset += chunk_len;
            first = false;
        }
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

fn build_packet(first: bool, total_len: u16, payload: &[u8], more: bool) -> UsbPacket {
    let mut packet = UsbPacket::empty();
    let header_len = if first {
        ASYNC_HEADER_AND_SUBHEADER_LEN
    } else {
        ASYNC_COMMAND_LEN
    };

    AsyncCommand::user_channel().write_into(&mut packet.data[0..ASYNC_COMMAND_LEN]);
    if first {
        AsyncSubHeader::for_send(total_len)
            .write_into(&mut packet.data[ASYNC_COMMAND_LEN..ASYNC_HEADER_AND_SUBHEADER_LEN]);
    }

    packet.data[header_len..header_len + payload.len()].copy_from_slice(payload);
    packet.length = (header_len + payload.len()) as u16;
    packet.more = more;
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> BoundedQueue<UsbPacket> {
        BoundedQueue::new(16)
    }

    #[test]
    fn single_small_frame_produces_one_packet() {
        let mut segmenter = Segmenter::new();
        let q = queue();
        let frame = WifiFrame::from_slice(&[0xAAu8; 40]).unwrap();
        segmenter.handle_frame(frame, &q);

        assert_eq!(q.len(), 1);
        let packet = q.try_pop().unwrap();
        assert!(!packet.more);
        assert_eq!(packet.length as usize, ASYNC_HEADER_AND_SUBHEADER_LEN + 40);

        let sub = AsyncSubHeader::parse(&packet.data[ASYNC_COMMAND_LEN..]).unwrap();
        assert_eq!(sub.mode, MODE_SEND);
        assert_eq!(sub.reference, REF_SEND);
        assert_eq!(sub.size, 40);
    }

    #[test]
    fn large_frame_splits_into_first_and_continuation_fragments() {
        let mut segmenter = Segmenter::new();
        let q = queue();
        let total = 700usize;
        let payload: Vec<u8> = (0..total).map(|i| (i % 256) as u8).collect();
        let frame = WifiFrame::from_slice(&payload).unwrap();
        segmenter.handle_frame(frame, &q);

        assert_eq!(q.len(), 2);

        let first = q.try_pop().unwrap();
        assert!(first.more);
        assert_eq!(first.length as usize, MAX_USB_PACKET_SIZE);
        let sub = AsyncSubHeader::parse(&first.data[ASYNC_COMMAND_LEN..]).unwrap();
        assert_eq!(sub.size, total as i32);

        let second = q.try_pop().unwrap();
        assert!(!second.more);
        assert_eq!(second.length as usize, ASYNC_COMMAND_LEN + (total - FIRST_FRAGMENT_PAYLOAD_MAX));

        let mut reassembled = first.as_slice()[ASYNC_HEADER_AND_SUBHEADER_LEN..].to_vec();
        reassembled.extend_from_slice(&second.as_slice()[ASYNC_COMMAND_LEN..]);
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn consecutive_identical_frames_are_deduplicated() {
        let mut segmenter = Segmenter::new();
        let q = queue();
        let frame = WifiFrame::from_slice(&[0x11u8; 20]).unwrap();
        segmenter.handle_frame(frame.clone(), &q);
        segmenter.handle_frame(frame, &q);

        assert_eq!(q.len(), 1);
    }

    #[test]
    fn distinct_frames_are_not_deduplicated() {
        let mut segmenter = Segmenter::new();
        let q = queue();
        segmenter.handle_frame(WifiFrame::from_slice(&[0x11u8; 20]).unwrap(), &q);
        segmenter.handle_frame(WifiFrame::from_slice(&[0x22u8; 20]).unwrap(), &q);

        assert_eq!(q.len(), 2);
    }

    #[test]
    fn full_queue_drops_remainder_of_frame() {
        let mut segmenter = Segmenter::new();
        let q: BoundedQueue<UsbPacket> = BoundedQueue::new(1);
        let total = 700usize;
        let frame = WifiFrame::from_slice(&vec![0x33u8; total]).unwrap();
        segmenter.handle_frame(frame, &q);

        // Only the first fragment fit; the continuation was dropped, not queued later.
        assert_eq!(q.len(), 1);
    }
}
