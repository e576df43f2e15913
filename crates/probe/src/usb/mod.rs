//! USB subsystem
//!
//! Platform traits the probe is written against, the libusb implementation
//! used by the binary, and an in-process fake used by tests.

pub mod fake;
pub mod host;
pub mod platform;

pub use host::{RusbDevice, RusbPlatform};
pub use platform::{
    ArrivalFilter, DeviceSummary, HotplugSink, UsbDevice, UsbDeviceHandle, UsbPlatform,
};
