//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// USB topologies are at most seven tiers deep
    #[error("Port path too deep: {depth} ports (max: {max})")]
    PortPathTooDeep { depth: usize, max: usize },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
