//! Report types
//!
//! `DeviceIdentity` renders the exact identification line the probe prints,
//! so its `Display` implementation is part of the tool's output format.
//! `ProbeReport` pairs it with the AOA outcome.

use crate::aoa::AoaSupport;
use crate::error::{ProtocolError, Result};
use std::fmt;

/// Maximum number of tiers in a USB port path
pub const MAX_PORT_DEPTH: usize = 7;

/// Topological address of a device: bus number plus the chain of hub ports
///
/// Rendered as `B-P1[.P2[.P3...]]` with decimal numbers. Root hubs have no
/// upstream port and render as `B-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortPath {
    bus: u8,
    ports: Vec<u8>,
}

impl PortPath {
    pub fn new(bus: u8, ports: Vec<u8>) -> Result<Self> {
        if ports.len() > MAX_PORT_DEPTH {
            return Err(ProtocolError::PortPathTooDeep {
                depth: ports.len(),
                max: MAX_PORT_DEPTH,
            });
        }

        Ok(Self { bus, ports })
    }

    pub fn bus(&self) -> u8 {
        self.bus
    }

    pub fn ports(&self) -> &[u8] {
        &self.ports
    }
}

impl fmt::Display for PortPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-", self.bus)?;
        for (i, port) in self.ports.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", port)?;
        }
        Ok(())
    }
}

/// Identification gathered from an opened device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub port_path: PortPath,
    /// Manufacturer string, empty when absent or unreadable
    pub manufacturer: String,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Found device {:04x}:{:04x}, port path is: {}, manufacturer is {}",
            self.vendor_id, self.product_id, self.port_path, self.manufacturer
        )
    }
}

/// Complete outcome of probing one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub identity: DeviceIdentity,
    pub aoa: AoaSupport,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(vid: u16, pid: u16, bus: u8, ports: Vec<u8>, mfr: &str) -> DeviceIdentity {
        DeviceIdentity {
            vendor_id: vid,
            product_id: pid,
            port_path: PortPath::new(bus, ports).unwrap(),
            manufacturer: mfr.to_string(),
        }
    }

    #[test]
    fn test_port_path_single_port() {
        let path = PortPath::new(1, vec![2]).unwrap();
        assert_eq!(path.to_string(), "1-2");
    }

    #[test]
    fn test_port_path_nested() {
        let path = PortPath::new(3, vec![4, 1, 2]).unwrap();
        assert_eq!(path.to_string(), "3-4.1.2");
        assert_eq!(path.bus(), 3);
        assert_eq!(path.ports(), &[4, 1, 2]);
    }

    #[test]
    fn test_port_path_root_hub() {
        let path = PortPath::new(2, vec![]).unwrap();
        assert_eq!(path.to_string(), "2-");
    }

    #[test]
    fn test_port_path_max_depth() {
        let path = PortPath::new(255, vec![255; MAX_PORT_DEPTH]).unwrap();
        assert_eq!(path.to_string(), "255-255.255.255.255.255.255.255");

        let err = PortPath::new(1, vec![1; MAX_PORT_DEPTH + 1]).unwrap_err();
        assert_eq!(err, ProtocolError::PortPathTooDeep { depth: 8, max: 7 });
    }

    #[test]
    fn test_identity_line() {
        let id = identity(0x18d1, 0x4ee7, 1, vec![2], "Google");
        assert_eq!(
            id.to_string(),
            "Found device 18d1:4ee7, port path is: 1-2, manufacturer is Google"
        );
    }

    #[test]
    fn test_identity_line_preserves_leading_zeros() {
        let id = identity(0x0000, 0x0001, 2, vec![1], "");
        assert_eq!(
            id.to_string(),
            "Found device 0000:0001, port path is: 2-1, manufacturer is "
        );

        let id = identity(0x05ac, 0x12a8, 3, vec![4, 1, 2], "Apple Inc.");
        assert_eq!(
            id.to_string(),
            "Found device 05ac:12a8, port path is: 3-4.1.2, manufacturer is Apple Inc."
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ports_strategy() -> impl Strategy<Value = Vec<u8>> {
        proptest::collection::vec(any::<u8>(), 1..=MAX_PORT_DEPTH)
    }

    proptest! {
        /// Property: the port path parses back into the bus and ports it was built from
        #[test]
        fn prop_port_path_round_trip(bus in any::<u8>(), ports in ports_strategy()) {
            let rendered = PortPath::new(bus, ports.clone()).unwrap().to_string();

            let (bus_part, ports_part) = rendered.split_once('-').unwrap();
            prop_assert_eq!(bus_part.parse::<u8>().unwrap(), bus);
            prop_assert!(!ports_part.ends_with('.'));

            let parsed: Vec<u8> = ports_part
                .split('.')
                .map(|p| p.parse::<u8>().unwrap())
                .collect();
            prop_assert_eq!(parsed, ports);
        }

        /// Property: vendor and product IDs always render as four lowercase hex digits
        #[test]
        fn prop_ids_are_four_lowercase_hex_digits(vid in any::<u16>(), pid in any::<u16>()) {
            let line = DeviceIdentity {
                vendor_id: vid,
                product_id: pid,
                port_path: PortPath::new(1, vec![1]).unwrap(),
                manufacturer: String::new(),
            }
            .to_string();

            let ids = line
                .strip_prefix("Found device ")
                .and_then(|rest| rest.split(',').next())
                .unwrap();
            let (v, p) = ids.split_once(':').unwrap();

            for part in [v, p] {
                prop_assert_eq!(part.len(), 4);
                prop_assert!(part.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            }
            prop_assert_eq!(u16::from_str_radix(v, 16).unwrap(), vid);
            prop_assert_eq!(u16::from_str_radix(p, 16).unwrap(), pid);
        }
    }
}
