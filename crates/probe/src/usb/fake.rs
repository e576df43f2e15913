//! In-process USB platform for tests
//!
//! `FakeUsb` is the test's view of a simulated bus: it plugs devices, fails
//! operations on demand, and records what the code under test did.
//! `FakePlatform` is the side handed to the dispatcher.
//!
//! # Example
//!
//! ```
//! use probe::usb::fake::{ControlReply, FakeDevice, FakeUsb};
//!
//! let usb = FakeUsb::new();
//! let phone = FakeDevice::builder(0x18d1, 0x4ee7)
//!     .bus(1)
//!     .ports(vec![2])
//!     .manufacturer("Google")
//!     .aoa_reply(ControlReply::Data(vec![0x02, 0x00]))
//!     .build();
//! usb.plug(phone.clone());
//!
//! let platform = usb.platform();
//! # drop(platform);
//! assert_eq!(phone.open_count(), 0);
//! ```

use crate::error::PlatformError;
use crate::usb::platform::{
    ArrivalFilter, DeviceSummary, HotplugSink, UsbDevice, UsbDeviceHandle, UsbPlatform,
    truncate_string,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// String descriptor index used for the manufacturer of fake devices
pub const FAKE_MANUFACTURER_INDEX: u8 = 1;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// One-shot latch that blocked transfers wait on
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every current and future waiter
    pub fn open(&self) {
        let (opened, cond) = &*self.inner;
        *lock(opened) = true;
        cond.notify_all();
    }

    pub fn wait(&self) {
        let (opened, cond) = &*self.inner;
        let guard = lock(opened);
        let _guard = cond
            .wait_while(guard, |opened| !*opened)
            .unwrap_or_else(|e| e.into_inner());
    }
}

/// Scripted answer to a control transfer
#[derive(Debug, Clone)]
pub enum ControlReply {
    /// Return these bytes (truncated to the buffer)
    Data(Vec<u8>),
    /// Fail with this error
    Fail(PlatformError),
    /// Block until the gate opens, then fail with a timeout
    BlockUntil(Gate),
}

/// A control transfer as issued by the code under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: usize,
    pub timeout: Duration,
}

#[derive(Debug)]
struct FakeDeviceInner {
    bus: u8,
    address: u8,
    ports: Vec<u8>,
    vendor_id: u16,
    product_id: u16,
    class_code: u8,
    manufacturer: Option<String>,
    manufacturer_error: Option<PlatformError>,
    open_error: Option<PlatformError>,
    aoa_reply: ControlReply,
    opens: AtomicUsize,
    closes: AtomicUsize,
    last_request: Mutex<Option<ControlRequest>>,
}

/// Builder for [`FakeDevice`]
#[derive(Debug)]
pub struct FakeDeviceBuilder {
    bus: u8,
    address: u8,
    ports: Vec<u8>,
    vendor_id: u16,
    product_id: u16,
    class_code: u8,
    manufacturer: Option<String>,
    manufacturer_error: Option<PlatformError>,
    open_error: Option<PlatformError>,
    aoa_reply: ControlReply,
}

impl FakeDeviceBuilder {
    pub fn bus(mut self, bus: u8) -> Self {
        self.bus = bus;
        self
    }

    pub fn address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn ports(mut self, ports: Vec<u8>) -> Self {
        self.ports = ports;
        self
    }

    pub fn class_code(mut self, class_code: u8) -> Self {
        self.class_code = class_code;
        self
    }

    pub fn manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = Some(manufacturer.to_string());
        self
    }

    /// The device has a manufacturer string but reading it fails
    pub fn manufacturer_error(mut self, error: PlatformError) -> Self {
        self.manufacturer_error = Some(error);
        self
    }

    pub fn open_error(mut self, error: PlatformError) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn aoa_reply(mut self, reply: ControlReply) -> Self {
        self.aoa_reply = reply;
        self
    }

    pub fn build(self) -> FakeDevice {
        FakeDevice {
            inner: Arc::new(FakeDeviceInner {
                bus: self.bus,
                address: self.address,
                ports: self.ports,
                vendor_id: self.vendor_id,
                product_id: self.product_id,
                class_code: self.class_code,
                manufacturer: self.manufacturer,
                manufacturer_error: self.manufacturer_error,
                open_error: self.open_error,
                aoa_reply: self.aoa_reply,
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }),
        }
    }
}

/// Simulated device; clones share state and counters
#[derive(Debug, Clone)]
pub struct FakeDevice {
    inner: Arc<FakeDeviceInner>,
}

impl FakeDevice {
    /// Device on bus 1, port 1 that answers AOA_GET_PROTOCOL with zero
    pub fn builder(vendor_id: u16, product_id: u16) -> FakeDeviceBuilder {
        FakeDeviceBuilder {
            bus: 1,
            address: 1,
            ports: vec![1],
            vendor_id,
            product_id,
            class_code: 0,
            manufacturer: None,
            manufacturer_error: None,
            open_error: None,
            aoa_reply: ControlReply::Data(vec![0x00, 0x00]),
        }
    }

    /// Successful opens so far
    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    /// Handles closed so far
    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn last_control_request(&self) -> Option<ControlRequest> {
        lock(&self.inner.last_request).clone()
    }

    fn summary(&self) -> DeviceSummary {
        let has_manufacturer =
            self.inner.manufacturer.is_some() || self.inner.manufacturer_error.is_some();
        DeviceSummary {
            vendor_id: self.inner.vendor_id,
            product_id: self.inner.product_id,
            class_code: self.inner.class_code,
            manufacturer_index: has_manufacturer.then_some(FAKE_MANUFACTURER_INDEX),
        }
    }
}

impl UsbDevice for FakeDevice {
    type Handle = FakeHandle;

    fn open(&self) -> Result<FakeHandle, PlatformError> {
        if let Some(e) = &self.inner.open_error {
            return Err(e.clone());
        }
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeHandle {
            device: self.inner.clone(),
        })
    }

    fn descriptor(&self) -> Result<DeviceSummary, PlatformError> {
        Ok(self.summary())
    }

    fn bus_number(&self) -> u8 {
        self.inner.bus
    }

    fn address(&self) -> u8 {
        self.inner.address
    }

    fn port_numbers(&self) -> Result<Vec<u8>, PlatformError> {
        Ok(self.inner.ports.clone())
    }
}

/// Open session on a [`FakeDevice`]; counts a close when dropped
#[derive(Debug)]
pub struct FakeHandle {
    device: Arc<FakeDeviceInner>,
}

impl UsbDeviceHandle for FakeHandle {
    fn read_string_ascii(&self, index: u8, max_len: usize) -> Result<String, PlatformError> {
        if let Some(e) = &self.device.manufacturer_error {
            return Err(e.clone());
        }
        match (&self.device.manufacturer, index) {
            (Some(s), FAKE_MANUFACTURER_INDEX) => Ok(truncate_string(s.clone(), max_len)),
            _ => Err(PlatformError::InvalidParam),
        }
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
        *lock(&self.device.last_request) = Some(ControlRequest {
            request_type,
            request,
            value,
            index,
            length: buf.len(),
            timeout,
        });

        match &self.device.aoa_reply {
            ControlReply::Data(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            ControlReply::Fail(e) => Err(e.clone()),
            ControlReply::BlockUntil(gate) => {
                gate.wait();
                Err(PlatformError::Timeout)
            }
        }
    }
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.device.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Platform operation recorded by [`FakeUsb`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Subscribe { enumerate: bool },
    Unsubscribe,
    Shutdown,
}

#[derive(Debug)]
enum FakeEvent {
    Arrived(FakeDevice),
    Left(FakeDevice),
}

#[derive(Default)]
struct FakeUsbState {
    present: Mutex<Vec<FakeDevice>>,
    pending: Mutex<VecDeque<FakeEvent>>,
    subscription: Mutex<Option<(ArrivalFilter, Box<dyn HotplugSink<FakeDevice>>)>>,
    calls: Mutex<Vec<PlatformCall>>,
    delivered: Mutex<Vec<(u16, u16)>>,
    subscribe_error: Mutex<Option<PlatformError>>,
    pump_error: Mutex<Option<PlatformError>>,
    pumps: AtomicUsize,
    next_registration: AtomicU32,
}

/// Test-side handle to a simulated bus
#[derive(Clone, Default)]
pub struct FakeUsb {
    state: Arc<FakeUsbState>,
}

impl FakeUsb {
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform side, to hand to the code under test
    pub fn platform(&self) -> FakePlatform {
        FakePlatform { usb: self.clone() }
    }

    /// Attach a device
    ///
    /// Before a subscription exists the device is only present, so it is
    /// reported by initial enumeration; afterwards an arrival is queued for
    /// the next pump.
    pub fn plug(&self, device: FakeDevice) {
        // Lock order: subscription, present, pending
        let subscription = lock(&self.state.subscription);
        lock(&self.state.present).push(device.clone());
        if subscription.is_some() {
            lock(&self.state.pending).push_back(FakeEvent::Arrived(device));
        }
    }

    /// Detach a device, queuing a removal event for the next pump
    pub fn unplug(&self, device: &FakeDevice) {
        let subscription = lock(&self.state.subscription);
        lock(&self.state.present).retain(|d| !Arc::ptr_eq(&d.inner, &device.inner));
        if subscription.is_some() {
            lock(&self.state.pending).push_back(FakeEvent::Left(device.clone()));
        }
    }

    /// Make the next subscription attempt fail
    pub fn fail_subscribe(&self, error: PlatformError) {
        *lock(&self.state.subscribe_error) = Some(error);
    }

    /// Make every pump call fail until cleared with `None`
    pub fn fail_pump(&self, error: Option<PlatformError>) {
        *lock(&self.state.pump_error) = error;
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        lock(&self.state.calls).clone()
    }

    /// `(vendor_id, product_id)` of every arrival handed to the subscriber,
    /// in delivery order
    pub fn delivered_arrivals(&self) -> Vec<(u16, u16)> {
        lock(&self.state.delivered).clone()
    }

    pub fn pump_count(&self) -> usize {
        self.state.pumps.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.state.subscription).is_some()
    }

    fn record(&self, call: PlatformCall) {
        lock(&self.state.calls).push(call);
    }

    fn deliver(&self, sink: &mut dyn HotplugSink<FakeDevice>, device: FakeDevice) {
        let summary = device.summary();
        lock(&self.state.delivered).push((summary.vendor_id, summary.product_id));
        sink.device_arrived(device);
    }
}

/// Token for a fake subscription
#[derive(Debug, PartialEq, Eq)]
pub struct FakeRegistration(u32);

/// Platform side of a [`FakeUsb`]
pub struct FakePlatform {
    usb: FakeUsb,
}

impl UsbPlatform for FakePlatform {
    type Device = FakeDevice;
    type Registration = FakeRegistration;

    fn subscribe_arrivals(
        &self,
        filter: ArrivalFilter,
        enumerate: bool,
        mut sink: Box<dyn HotplugSink<FakeDevice>>,
    ) -> Result<FakeRegistration, PlatformError> {
        let state = &self.usb.state;
        if let Some(e) = lock(&state.subscribe_error).take() {
            return Err(e);
        }
        self.usb.record(PlatformCall::Subscribe { enumerate });

        // Held across enumeration so a concurrent plug is either enumerated
        // here or queued afterwards, never both
        let mut subscription = lock(&state.subscription);

        // Initial enumeration is delivered synchronously, like libusb does
        if enumerate {
            let present = lock(&state.present).clone();
            for device in present {
                if filter.matches(&device.summary()) {
                    self.usb.deliver(sink.as_mut(), device);
                }
            }
        }

        *subscription = Some((filter, sink));
        Ok(FakeRegistration(
            state.next_registration.fetch_add(1, Ordering::SeqCst),
        ))
    }

    fn unsubscribe(&self, _registration: FakeRegistration) {
        self.usb.record(PlatformCall::Unsubscribe);
        lock(&self.usb.state.subscription).take();
        lock(&self.usb.state.pending).clear();
    }

    fn pump_once(&self, timeout: Duration) -> Result<(), PlatformError> {
        let state = &self.usb.state;
        state.pumps.fetch_add(1, Ordering::SeqCst);

        if let Some(e) = lock(&state.pump_error).clone() {
            std::thread::sleep(timeout);
            return Err(e);
        }

        let events: Vec<FakeEvent> = lock(&state.pending).drain(..).collect();
        if events.is_empty() {
            std::thread::sleep(timeout);
            return Ok(());
        }

        let mut subscription = lock(&state.subscription);
        if let Some((filter, sink)) = subscription.as_mut() {
            for event in events {
                match event {
                    FakeEvent::Arrived(device) => {
                        if filter.matches(&device.summary()) {
                            self.usb.deliver(sink.as_mut(), device);
                        }
                    }
                    FakeEvent::Left(device) => sink.device_left(device),
                }
            }
        }
        Ok(())
    }

    fn shutdown(self) {
        self.usb.record(PlatformCall::Shutdown);
    }
}
