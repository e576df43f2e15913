//! AOA_GET_PROTOCOL request and reply decoding
//!
//! An Android device that implements the Open Accessory protocol answers the
//! vendor request 51 on endpoint 0 with its protocol version as a
//! little-endian `u16`. Devices without AOA support stall the request or
//! answer zero.

use std::fmt;

/// Vendor request code that queries the supported AOA protocol version
pub const AOA_GET_PROTOCOL: u8 = 51;

/// Length of the AOA_GET_PROTOCOL reply in bytes
pub const AOA_PROTOCOL_REPLY_LEN: usize = 2;

/// bmRequestType direction bit: device-to-host
pub const ENDPOINT_IN: u8 = 0x80;

/// bmRequestType type field: vendor
pub const REQUEST_TYPE_VENDOR: u8 = 0x02 << 5;

/// bmRequestType recipient field: device
pub const RECIPIENT_DEVICE: u8 = 0x00;

/// bmRequestType for AOA_GET_PROTOCOL (IN | VENDOR | DEVICE)
pub const fn get_protocol_request_type() -> u8 {
    ENDPOINT_IN | REQUEST_TYPE_VENDOR | RECIPIENT_DEVICE
}

/// Result of interrogating a device with AOA_GET_PROTOCOL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AoaSupport {
    /// The device stalled the request or reported version 0
    Unsupported,
    /// The device reported a non-zero protocol version
    Supported(u16),
}

impl AoaSupport {
    /// Decode the reply payload of AOA_GET_PROTOCOL.
    ///
    /// The payload is assembled byte by byte as little-endian so the result
    /// does not depend on host endianness. A short reply leaves the missing
    /// high byte as zero; bytes past the second are ignored.
    pub fn from_reply(reply: &[u8]) -> Self {
        let low = reply.first().copied().unwrap_or(0);
        let high = reply.get(1).copied().unwrap_or(0);

        match u16::from_le_bytes([low, high]) {
            0 => AoaSupport::Unsupported,
            version => AoaSupport::Supported(version),
        }
    }
}

impl fmt::Display for AoaSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AoaSupport::Unsupported => write!(f, "not found AOA supports."),
            AoaSupport::Supported(version) => {
                write!(f, "Device supports AOA {}.0!, {:x}", version, version)
            }
        }
    }
}
