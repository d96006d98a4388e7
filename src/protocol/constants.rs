//! Wire constants for the PSP HostFS/Async/Bulk framing (see `USB_Constants`
//! in the original CWUSB C++ sources this protocol was ported from).

/// USB vendor ID of the PSP in ad-hoc USB mode.
pub const PSP_VENDOR_ID: u16 = 0x054C;
/// USB product ID of the PSP in ad-hoc USB mode.
pub const PSP_PRODUCT_ID: u16 = 0x01C9;

/// USB configuration claimed on the device.
pub const USB_CONFIGURATION: u8 = 1;
/// USB interface claimed on the device.
pub const USB_INTERFACE: u8 = 0;

/// Bulk IN endpoint: data from the console.
pub const EP_DATA_IN: u8 = 0x81;
/// Bulk OUT endpoint: the HostFS handshake.
pub const EP_HELLO: u8 = 0x02;
/// Bulk OUT endpoint: data to the console.
pub const EP_DATA_OUT: u8 = 0x03;

/// Top-level magic: HostFS handshake framing.
pub const MAGIC_HOSTFS: u32 = 0x782F0812;
/// Top-level magic: Async channel framing (carries the WiFi tunnel).
pub const MAGIC_ASYNC: u32 = 0x782F0813;
/// Top-level magic: Bulk framing. Never produced by the WiFi plugin; logged and ignored.
pub const MAGIC_BULK: u32 = 0x782F0814;
/// Sub-header magic identifying DebugPrint-framed Async payloads.
pub const MAGIC_DEBUGPRINT: u32 = 0x909ACCEF;

/// The only recognized HostFS command.
pub const HOSTFS_HELLO: u32 = (0x8FFC << 16) | 190;

/// Async channel carrying WiFi-plugin traffic.
pub const USER_CHANNEL: u32 = 4;

/// Sub-header `(mode, ref)` pair identifying a network packet on receive.
pub const MODE_PACKET: i32 = 2;
pub const REF_SEND_PACKET: i32 = 77;

/// Sub-header `(mode, ref)` pair identifying debug text on receive.
pub const MODE_DEBUG: i32 = 1;
pub const REF_DEBUG: i32 = 66;

/// Sub-header `(mode, ref)` pair used when segmenting outbound packets.
/// Asymmetric with the receive-side `(MODE_PACKET, REF_SEND_PACKET)` pair by
/// design — this is the empirically working convention the console's
/// receiver expects; see DESIGN.md for why it isn't unified.
pub const MODE_SEND: i32 = 3;
pub const REF_SEND: i32 = 0;

/// `HostFsCommand`: magic:u32 | command:u32 | extralen:u32
pub const HOSTFS_COMMAND_LEN: usize = 12;
/// `AsyncCommand`: magic:u32 | channel:u32
pub const ASYNC_COMMAND_LEN: usize = 8;
/// `AsyncSubHeader`: magic:u32 | mode:i32 | size:i32 | ref:i32
pub const ASYNC_SUBHEADER_LEN: usize = 16;
/// Async header + sub-header, the overhead on the first fragment of a stitched frame.
pub const ASYNC_HEADER_AND_SUBHEADER_LEN: usize = ASYNC_COMMAND_LEN + ASYNC_SUBHEADER_LEN;

/// Maximum size of a single USB packet on this bus.
pub const MAX_USB_PACKET_SIZE: usize = 512;
/// Maximum size of a reassembled 802.11 WiFi frame.
pub const MAX_WIFI_FRAME_LEN: usize = 2304;

/// Usable payload bytes in the first fragment of a stitched send (512 - 24).
pub const FIRST_FRAGMENT_PAYLOAD_MAX: usize = MAX_USB_PACKET_SIZE - ASYNC_HEADER_AND_SUBHEADER_LEN;
/// Usable payload bytes in continuation fragments of a stitched send (512 - 8).
pub const CONT_FRAGMENT_PAYLOAD_MAX: usize = MAX_USB_PACKET_SIZE - ASYNC_COMMAND_LEN;
