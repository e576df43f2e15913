//! USB platform capability surface
//!
//! The dispatcher and the probe workers only talk to the USB stack through
//! these traits. `host::RusbPlatform` implements them on top of libusb via
//! `rusb`; `fake::FakePlatform` implements them in-process for tests.

use crate::error::PlatformError;
use std::time::Duration;

/// Vendor / product / class wildcards for an arrival subscription
///
/// `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArrivalFilter {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub class_code: Option<u8>,
}

impl ArrivalFilter {
    /// Filter matching every device
    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, summary: &DeviceSummary) -> bool {
        self.vendor_id.is_none_or(|v| v == summary.vendor_id)
            && self.product_id.is_none_or(|p| p == summary.product_id)
            && self.class_code.is_none_or(|c| c == summary.class_code)
    }
}

/// The device descriptor fields the probe needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub class_code: u8,
    /// iManufacturer; `None` when the device has no manufacturer string
    pub manufacturer_index: Option<u8>,
}

/// Receiver of hotplug notifications
///
/// Called synchronously from inside [`UsbPlatform::pump_once`] (or from
/// [`UsbPlatform::subscribe_arrivals`] for the initial enumeration burst).
/// Implementations must return promptly. The device is owned by the
/// callee, so it can be moved to another thread.
pub trait HotplugSink<D>: Send {
    fn device_arrived(&mut self, device: D);
    fn device_left(&mut self, device: D);
}

/// Host USB context
pub trait UsbPlatform: Send {
    type Device: UsbDevice;
    type Registration;

    /// Register `sink` for device arrivals matching `filter`
    ///
    /// With `enumerate` set, every matching device already present is
    /// delivered once before any later arrival.
    fn subscribe_arrivals(
        &self,
        filter: ArrivalFilter,
        enumerate: bool,
        sink: Box<dyn HotplugSink<Self::Device>>,
    ) -> Result<Self::Registration, PlatformError>;

    /// Remove a subscription; no callbacks for it are delivered afterwards
    fn unsubscribe(&self, registration: Self::Registration);

    /// Service pending events, blocking for at most `timeout`
    fn pump_once(&self, timeout: Duration) -> Result<(), PlatformError>;

    /// Tear down the context
    ///
    /// Must only be called once every subscription has been removed.
    fn shutdown(self)
    where
        Self: Sized;
}

/// An enumerated USB device
///
/// Holding a device keeps it referenceable after it is unplugged; operations
/// on it then fail with [`PlatformError::NoDevice`].
pub trait UsbDevice: Send + 'static {
    type Handle: UsbDeviceHandle;

    /// Open a session on the device; dropping the handle closes it
    fn open(&self) -> Result<Self::Handle, PlatformError>;

    fn descriptor(&self) -> Result<DeviceSummary, PlatformError>;

    fn bus_number(&self) -> u8;

    fn address(&self) -> u8;

    /// Hub ports from the root down to the device
    fn port_numbers(&self) -> Result<Vec<u8>, PlatformError>;
}

/// An open device session
pub trait UsbDeviceHandle {
    /// Read a string descriptor as ASCII, truncated to `max_len` bytes
    fn read_string_ascii(&self, index: u8, max_len: usize) -> Result<String, PlatformError>;

    /// Device-to-host control transfer on endpoint 0
    ///
    /// Returns the number of bytes written into `buf`.
    fn control_in(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PlatformError>;
}

/// Truncate a descriptor string to at most `max_len` bytes
pub fn truncate_string(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
