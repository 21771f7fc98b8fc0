//! Bidirectional flow identifiers.
//!
//! Provides direction-specific (distinguishes forward and backward endpoints) and generic
//! identifiers for bidirectional flows.

use std::cmp;
use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;

/// Flow 5-tuple.
///
/// The sender of the first observed packet in the flow becomes the forward endpoint `src`, and the
/// recipient becomes `dst`. All features labeled "Fwd"/"Bwd" are relative to this orientation.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct FiveTuple {
    /// The forward (originating) endpoint.
    pub src: SocketAddr,
    /// The backward (responding) endpoint.
    pub dst: SocketAddr,
    /// The layer-4 protocol.
    pub proto: u8,
}

impl FiveTuple {
    /// Converts a 5-tuple to a direction-free flow identifier.
    pub fn flow_id(&self) -> FlowId {
        FlowId::new(self.src, self.dst, self.proto)
    }

    /// Returns the 5-tuple with its endpoints swapped.
    pub fn reverse(&self) -> FiveTuple {
        FiveTuple {
            src: self.dst,
            dst: self.src,
            proto: self.proto,
        }
    }

    /// The flow id string in forward orientation, `"src-dst-sport-dport-proto"`.
    ///
    /// IPv6 addresses render in their standard textual form without a scope id.
    pub fn fwd_flow_id(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}",
            self.src.ip(),
            self.dst.ip(),
            self.src.port(),
            self.dst.port(),
            self.proto
        )
    }

    /// The flow id string in backward orientation, `"dst-src-dport-sport-proto"`.
    pub fn bwd_flow_id(&self) -> String {
        self.reverse().fwd_flow_id()
    }
}

impl fmt::Display for FiveTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> ", self.src)?;
        write!(f, "{}", self.dst)?;
        write!(f, " protocol {}", self.proto)?;
        Ok(())
    }
}

/// A generic flow identifier.
///
/// Identifies a flow independent of the source and destination socket address order. Does not
/// distinguish between the forward and backward directions of the flow, so a packet and its reply
/// map to the same `FlowId`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct FlowId(SocketAddr, SocketAddr, u8);

impl FlowId {
    /// Returns the flow ID of a packet with `src` and `dst` IP/port pairs.
    pub(crate) fn new(src: SocketAddr, dst: SocketAddr, protocol: u8) -> Self {
        FlowId(cmp::max(src, dst), cmp::min(src, dst), protocol)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <> ", self.0)?;
        write!(f, "{}", self.1)?;
        write!(f, " protocol {}", self.2)?;
        Ok(())
    }
}
