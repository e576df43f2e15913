//! libusb platform
//!
//! Implements the platform traits on top of `rusb`. A `rusb::Device` holds a
//! reference to its context, so a device handed to a probe worker stays
//! valid even if the worker outlives the dispatcher's own context handle.

use crate::error::PlatformError;
use crate::usb::platform::{
    ArrivalFilter, DeviceSummary, HotplugSink, UsbDevice, UsbDeviceHandle, UsbPlatform,
    truncate_string,
};
use rusb::{Context, Device, DeviceHandle, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::time::Duration;
use tracing::debug;

/// Host USB context backed by libusb
pub struct RusbPlatform {
    context: Context,
}

impl RusbPlatform {
    /// Create the libusb context
    pub fn init() -> Result<Self, PlatformError> {
        let context = Context::new()?;
        debug!("libusb context created");
        Ok(Self { context })
    }
}

impl UsbPlatform for RusbPlatform {
    type Device = RusbDevice;
    type Registration = Registration<Context>;

    fn subscribe_arrivals(
        &self,
        filter: ArrivalFilter,
        enumerate: bool,
        sink: Box<dyn HotplugSink<RusbDevice>>,
    ) -> Result<Registration<Context>, PlatformError> {
        if !rusb::has_hotplug() {
            return Err(PlatformError::NotSupported);
        }

        let mut builder = HotplugBuilder::new();
        builder.enumerate(enumerate);
        if let Some(vendor_id) = filter.vendor_id {
            builder.vendor_id(vendor_id);
        }
        if let Some(product_id) = filter.product_id {
            builder.product_id(product_id);
        }
        if let Some(class_code) = filter.class_code {
            builder.class(class_code);
        }

        let registration = builder.register(&self.context, Box::new(HotplugAdapter { sink }))?;
        debug!("Hot-plug callback registered (enumerate={})", enumerate);
        Ok(registration)
    }

    fn unsubscribe(&self, registration: Registration<Context>) {
        self.context.unregister_callback(registration);
        debug!("Hot-plug callback deregistered");
    }

    fn pump_once(&self, timeout: Duration) -> Result<(), PlatformError> {
        self.context.handle_events(Some(timeout))?;
        Ok(())
    }

    fn shutdown(self) {
        // libusb_exit runs once the last device reference is gone
        drop(self.context);
        debug!("libusb context released");
    }
}

/// Bridges rusb's hotplug callback to a [`HotplugSink`]
struct HotplugAdapter {
    sink: Box<dyn HotplugSink<RusbDevice>>,
}

impl Hotplug<Context> for HotplugAdapter {
    fn device_arrived(&mut self, device: Device<Context>) {
        self.sink.device_arrived(RusbDevice(device));
    }

    fn device_left(&mut self, device: Device<Context>) {
        self.sink.device_left(RusbDevice(device));
    }
}

/// Device reference owned by whoever received it from the hotplug callback
pub struct RusbDevice(Device<Context>);

impl UsbDevice for RusbDevice {
    type Handle = DeviceHandle<Context>;

    fn open(&self) -> Result<DeviceHandle<Context>, PlatformError> {
        Ok(self.0.open()?)
    }

    fn descriptor(&self) -> Result<DeviceSummary, PlatformError> {
        let desc = self.0.device_descriptor()?;
        Ok(DeviceSummary {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            class_code: desc.class_code(),
            manufacturer_index: desc.manufacturer_string_index(),
        })
    }

    fn bus_number(&self) -> u8 {
        self.0.bus_number()
    }

    fn address(&self) -> u8 {
        self.0.address()
    }

    fn port_numbers(&self) -> Result<Vec<u8>, PlatformError> {
        Ok(self.0.port_numbers()?)
    }
}

impl UsbDeviceHandle for DeviceHandle<Context> {
    fn read_string_ascii(&self, index: u8, max_len: usize) -> Result<String, PlatformError> {
        let s = self.read_string_descriptor_ascii(index)?;
        Ok(truncate_string(s, max_len))
    }

    fn control_in(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, PlatformError> {
        Ok(self.read_control(request_type, request, value, index, buf, timeout)?)
    }
}
