//! Android Open Accessory protocol knowledge for aoa-probe
//!
//! This crate holds everything about the AOA handshake and the probe's report
//! format that does not need a USB stack: the `AOA_GET_PROTOCOL` request, the
//! decoding of its two-byte reply, the `bus-port[.port...]` topology string,
//! and the exact report lines printed for every probed device.
//!
//! # Example
//!
//! ```
//! use protocol::{AoaSupport, DeviceIdentity, PortPath};
//!
//! let identity = DeviceIdentity {
//!     vendor_id: 0x18d1,
//!     product_id: 0x4ee7,
//!     port_path: PortPath::new(1, vec![2]).unwrap(),
//!     manufacturer: "Google".to_string(),
//! };
//! assert_eq!(
//!     identity.to_string(),
//!     "Found device 18d1:4ee7, port path is: 1-2, manufacturer is Google"
//! );
//!
//! let support = AoaSupport::from_reply(&[0x02, 0x00]);
//! assert_eq!(support.to_string(), "Device supports AOA 2.0!, 2");
//! ```

pub mod aoa;
pub mod error;
pub mod types;

pub use aoa::{
    AOA_GET_PROTOCOL, AOA_PROTOCOL_REPLY_LEN, AoaSupport, ENDPOINT_IN, RECIPIENT_DEVICE,
    REQUEST_TYPE_VENDOR, get_protocol_request_type,
};
pub use error::{ProtocolError, Result};
pub use types::{DeviceIdentity, MAX_PORT_DEPTH, PortPath, ProbeReport};
