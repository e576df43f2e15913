//! Probe worker
//!
//! Identifies one arrived device and asks it for its AOA protocol version.
//! Each worker runs on its own detached thread and owns its device reference
//! and handle for its whole lifetime; the handle is closed when it goes out
//! of scope, on every exit path.

use crate::error::{PlatformError, ProbeError};
use crate::sink::ReportSink;
use crate::tracker::WorkerTracker;
use crate::usb::{DeviceSummary, UsbDevice, UsbDeviceHandle};
use protocol::{
    AOA_GET_PROTOCOL, AOA_PROTOCOL_REPLY_LEN, AoaSupport, DeviceIdentity, PortPath, ProbeReport,
    get_protocol_request_type,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Default timeout for the AOA_GET_PROTOCOL transfer (5 seconds)
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);

/// Manufacturer strings are read into a buffer of this many bytes
pub const MANUFACTURER_BUFFER_LEN: usize = 200;

/// Per-device probe parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    /// Timeout for the AOA_GET_PROTOCOL control transfer
    pub transfer_timeout: Duration,
    /// Longest manufacturer string kept, in bytes
    pub manufacturer_max_len: usize,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            manufacturer_max_len: MANUFACTURER_BUFFER_LEN,
        }
    }
}

/// Probe a device, writing its report lines to `sink` as they become known
///
/// The identification line is written before the AOA query, so a failed
/// query still leaves the device identified.
pub fn probe_device<D: UsbDevice>(
    device: &D,
    settings: &ProbeSettings,
    sink: &dyn ReportSink,
) -> Result<ProbeReport, ProbeError> {
    let handle = device.open().map_err(ProbeError::OpenFailed)?;

    let summary = device.descriptor().map_err(ProbeError::DeviceQueryFailed)?;

    let manufacturer = match read_manufacturer(&handle, &summary, settings.manufacturer_max_len) {
        Ok(manufacturer) => manufacturer,
        Err(e) => {
            debug!("{}", e);
            String::new()
        }
    };

    let ports = device
        .port_numbers()
        .map_err(ProbeError::DeviceQueryFailed)?;
    let port_path = PortPath::new(device.bus_number(), ports)?;

    let identity = DeviceIdentity {
        vendor_id: summary.vendor_id,
        product_id: summary.product_id,
        port_path,
        manufacturer,
    };
    sink.report(&identity.to_string());

    let aoa = match query_aoa_protocol(&handle, settings.transfer_timeout) {
        Ok(aoa) => aoa,
        Err(ProbeError::TransferPipeStall) => {
            debug!("AOA_GET_PROTOCOL stalled on {}", identity.port_path);
            AoaSupport::Unsupported
        }
        Err(e) => return Err(e),
    };
    sink.report(&aoa.to_string());

    Ok(ProbeReport { identity, aoa })
}

/// Probe a device and report any failure as a diagnostic line
///
/// Failures stay local to this device.
pub fn run_probe<D: UsbDevice>(device: &D, settings: &ProbeSettings, sink: &dyn ReportSink) {
    let bus = device.bus_number();
    let address = device.address();
    debug!("Probing device bus={}, addr={}", bus, address);

    match probe_device(device, settings, sink) {
        Ok(report) => debug!(
            "Probe finished for {}: {:?}",
            report.identity.port_path, report.aoa
        ),
        Err(e) => {
            debug!("Probe failed for bus={}, addr={}: {:?}", bus, address, e);
            sink.diagnostic(&e.to_string());
        }
    }
}

/// Start a detached worker thread that probes `device`
///
/// The worker is registered with `workers` before the thread starts and
/// deregistered when it ends, whatever the outcome.
pub fn spawn_probe_worker<D: UsbDevice>(
    device: D,
    settings: ProbeSettings,
    sink: Arc<dyn ReportSink>,
    workers: &WorkerTracker,
) -> std::io::Result<()> {
    let guard = workers.enter();
    let name = format!("probe-{}-{}", device.bus_number(), device.address());

    std::thread::Builder::new().name(name).spawn(move || {
        let _guard = guard;
        run_probe(&device, &settings, sink.as_ref());
    })?;

    Ok(())
}

/// Spawn a worker, logging rather than propagating a spawn failure
pub(crate) fn dispatch_probe<D: UsbDevice>(
    device: D,
    settings: &ProbeSettings,
    sink: &Arc<dyn ReportSink>,
    workers: &WorkerTracker,
) {
    let bus = device.bus_number();
    let address = device.address();
    if let Err(e) = spawn_probe_worker(device, settings.clone(), sink.clone(), workers) {
        error!(
            "Failed to spawn probe worker for bus={}, addr={}: {}",
            bus, address, e
        );
    }
}

fn read_manufacturer<H: UsbDeviceHandle>(
    handle: &H,
    summary: &DeviceSummary,
    max_len: usize,
) -> Result<String, ProbeError> {
    match summary.manufacturer_index {
        Some(index) => handle
            .read_string_ascii(index, max_len)
            .map_err(ProbeError::DescriptorReadFailed),
        None => Ok(String::new()),
    }
}

fn query_aoa_protocol<H: UsbDeviceHandle>(
    handle: &H,
    timeout: Duration,
) -> Result<AoaSupport, ProbeError> {
    let mut reply = [0u8; AOA_PROTOCOL_REPLY_LEN];
    let len = handle
        .control_in(
            get_protocol_request_type(),
            AOA_GET_PROTOCOL,
            0,
            0,
            &mut reply,
            timeout,
        )
        .map_err(ProbeError::from_transfer)?;

    if len > reply.len() {
        return Err(ProbeError::TransferOther(PlatformError::Overflow));
    }

    Ok(AoaSupport::from_reply(&reply[..len]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use crate::usb::fake::{ControlReply, FakeDevice};

    #[test]
    fn test_default_settings() {
        let settings = ProbeSettings::default();
        assert_eq!(settings.transfer_timeout, Duration::from_secs(5));
        assert_eq!(settings.manufacturer_max_len, 200);
    }

    #[test]
    fn test_query_uses_aoa_get_protocol() {
        let device = FakeDevice::builder(0x18d1, 0x4ee7)
            .aoa_reply(ControlReply::Data(vec![0x01, 0x00]))
            .build();
        let sink = RecordingSink::new();

        let report = probe_device(&device, &ProbeSettings::default(), &sink).unwrap();
        assert_eq!(report.aoa, AoaSupport::Supported(1));

        let request = device.last_control_request().unwrap();
        assert_eq!(request.request_type, 0xC0);
        assert_eq!(request.request, 51);
        assert_eq!(request.value, 0);
        assert_eq!(request.index, 0);
        assert_eq!(request.length, 2);
        assert_eq!(request.timeout, DEFAULT_TRANSFER_TIMEOUT);
    }

    #[test]
    fn test_missing_manufacturer_index_is_empty() {
        let device = FakeDevice::builder(0x0001, 0x0002)
            .aoa_reply(ControlReply::Data(vec![0, 0]))
            .build();
        let sink = RecordingSink::new();

        let report = probe_device(&device, &ProbeSettings::default(), &sink).unwrap();
        assert_eq!(report.identity.manufacturer, "");
    }

    #[test]
    fn test_manufacturer_truncated() {
        let device = FakeDevice::builder(0x0001, 0x0002)
            .manufacturer("Very Long Manufacturer Name")
            .build();
        let sink = RecordingSink::new();
        let settings = ProbeSettings {
            manufacturer_max_len: 4,
            ..ProbeSettings::default()
        };

        let report = probe_device(&device, &settings, &sink).unwrap();
        assert_eq!(report.identity.manufacturer, "Very");
    }
}
