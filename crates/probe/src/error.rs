//! Probe error types
//!
//! `PlatformError` is what the USB stack reports; `ProbeError` is what the
//! dispatcher and the probe workers do with it. The `Display` output of
//! `ProbeError` is printed verbatim as the stderr diagnostic for a device.

use protocol::ProtocolError;
use thiserror::Error;

/// Failure kinds reported by the USB platform
///
/// Display strings match libusb's `libusb_strerror` texts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Input/Output Error")]
    Io,
    #[error("Invalid parameter")]
    InvalidParam,
    #[error("Access denied (insufficient permissions)")]
    Access,
    #[error("No such device (it may have been disconnected)")]
    NoDevice,
    #[error("Entity not found")]
    NotFound,
    #[error("Resource busy")]
    Busy,
    #[error("Operation timed out")]
    Timeout,
    #[error("Overflow")]
    Overflow,
    /// Endpoint stall; devices use it to reject unsupported requests
    #[error("Pipe error")]
    Pipe,
    #[error("System call interrupted (perhaps due to signal)")]
    Interrupted,
    #[error("Insufficient memory")]
    NoMem,
    #[error("Operation not supported or unimplemented on this platform")]
    NotSupported,
    #[error("Malformed descriptor")]
    BadDescriptor,
    #[error("Other error")]
    Other,
}

impl From<rusb::Error> for PlatformError {
    #[allow(unreachable_patterns)]
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Io => PlatformError::Io,
            rusb::Error::InvalidParam => PlatformError::InvalidParam,
            rusb::Error::Access => PlatformError::Access,
            rusb::Error::NoDevice => PlatformError::NoDevice,
            rusb::Error::NotFound => PlatformError::NotFound,
            rusb::Error::Busy => PlatformError::Busy,
            rusb::Error::Timeout => PlatformError::Timeout,
            rusb::Error::Overflow => PlatformError::Overflow,
            rusb::Error::Pipe => PlatformError::Pipe,
            rusb::Error::Interrupted => PlatformError::Interrupted,
            rusb::Error::NoMem => PlatformError::NoMem,
            rusb::Error::NotSupported => PlatformError::NotSupported,
            rusb::Error::BadDescriptor => PlatformError::BadDescriptor,
            rusb::Error::Other => PlatformError::Other,
            _ => PlatformError::Other,
        }
    }
}

/// Errors raised while setting up the dispatcher or probing a device
#[derive(Debug, Error)]
pub enum ProbeError {
    /// USB context creation failed
    #[error("Error initializing libusb: {0}")]
    PlatformInit(PlatformError),

    /// Hotplug subscription could not be registered
    #[error("Error creating a hotplug callback: {0}")]
    SubscribeFailed(PlatformError),

    #[error("Error opening usb device: {0}")]
    OpenFailed(PlatformError),

    /// Descriptor, bus or port queries failed after the device was opened
    #[error("Error reading usb device information: {0}")]
    DeviceQueryFailed(PlatformError),

    #[error("Error reading manufacturer string: {0}")]
    DescriptorReadFailed(PlatformError),

    /// The device stalled AOA_GET_PROTOCOL
    #[error("libusb_control_transfer failed: Pipe error.")]
    TransferPipeStall,

    #[error("libusb_control_transfer failed: {0}.")]
    TransferOther(PlatformError),

    #[error("Invalid device topology: {0}")]
    Topology(#[from] ProtocolError),
}

impl ProbeError {
    /// Classify a control transfer failure
    pub fn from_transfer(error: PlatformError) -> Self {
        match error {
            PlatformError::Pipe => ProbeError::TransferPipeStall,
            other => ProbeError::TransferOther(other),
        }
    }

    /// Whether this error ends the whole process rather than one probe
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProbeError::PlatformInit(_) | ProbeError::SubscribeFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rusb_error_mapping() {
        assert_eq!(PlatformError::from(rusb::Error::Pipe), PlatformError::Pipe);
        assert_eq!(
            PlatformError::from(rusb::Error::Timeout),
            PlatformError::Timeout
        );
        assert_eq!(
            PlatformError::from(rusb::Error::NoDevice),
            PlatformError::NoDevice
        );
        assert_eq!(PlatformError::from(rusb::Error::Other), PlatformError::Other);
    }

    #[test]
    fn test_transfer_classification() {
        assert!(matches!(
            ProbeError::from_transfer(PlatformError::Pipe),
            ProbeError::TransferPipeStall
        ));
        assert!(matches!(
            ProbeError::from_transfer(PlatformError::Timeout),
            ProbeError::TransferOther(PlatformError::Timeout)
        ));
    }

    #[test]
    fn test_diagnostic_text() {
        assert_eq!(
            ProbeError::OpenFailed(PlatformError::Access).to_string(),
            "Error opening usb device: Access denied (insufficient permissions)"
        );
        assert_eq!(
            ProbeError::TransferOther(PlatformError::Timeout).to_string(),
            "libusb_control_transfer failed: Operation timed out."
        );
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(ProbeError::PlatformInit(PlatformError::Other).is_fatal());
        assert!(ProbeError::SubscribeFailed(PlatformError::NotSupported).is_fatal());
        assert!(!ProbeError::OpenFailed(PlatformError::Access).is_fatal());
        assert!(!ProbeError::TransferPipeStall.is_fatal());
    }
}
