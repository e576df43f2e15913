//! aoa-probe
//!
//! Watches the USB bus and asks every device that appears whether it speaks
//! the Android Open Accessory protocol.
//!
//! The pieces, bottom-up:
//! - [`usb`]: the platform traits, the libusb implementation, and a fake
//! - [`worker`]: probes one device and writes its report lines
//! - [`dispatcher`]: owns the subscription and event pump and spawns workers
//!
//! Every device produces at most one identification line and at most one
//! AOA status line on stdout. Failures are confined to the device they
//! happened on and reported on stderr.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod sink;
pub mod tracker;
pub mod usb;
pub mod worker;

pub use config::ProbeConfig;
pub use dispatcher::{DispatchSummary, Dispatcher, DispatcherSettings, DispatcherState};
pub use error::{PlatformError, ProbeError};
pub use sink::{RecordingSink, ReportSink, StdioSink};
pub use tracker::WorkerTracker;
pub use usb::{RusbPlatform, UsbPlatform};
pub use worker::{ProbeSettings, probe_device, run_probe, spawn_probe_worker};
