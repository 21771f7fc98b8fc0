//! Typed views over the packet headers that flow metering reads.
//!
//! Each view pairs a copy of one fixed header with its offset into the owning
//! [`Mbuf`]. Parsing walks outside-in: `mbuf.parse_to::<Ethernet>()`, then
//! `eth.parse_to::<Ipv4>()`, and so on, with every layer checking the
//! encapsulated-protocol field of the layer before it. A failed parse never
//! panics; malformed or unsupported frames surface as errors and the caller
//! drops them.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;
pub mod udp;
use crate::memory::mbuf::Mbuf;

use anyhow::Result;
use thiserror::Error;

/// Represents a single packet.
pub trait Packet<'a> {
    /// Reference to the underlying packet buffer.
    fn mbuf(&self) -> &Mbuf;

    /// Length of this layer's header in bytes, including any variable-sized
    /// options and tags.
    fn header_len(&self) -> usize;

    /// Offset from the beginning of the packet buffer to the start of this
    /// layer's payload.
    fn next_header_offset(&self) -> usize;

    /// Protocol identifier of the encapsulated layer, if there is one.
    fn next_header(&self) -> Option<usize>;

    /// Parses the `Packet`'s payload as a new `Packet` of type `T`.
    fn parse_to<T: Packet<'a>>(&'a self) -> Result<T>
    where
        Self: Sized,
    {
        T::parse_from(self)
    }

    /// Parses a `Packet` from the outer encapsulating `Packet`'s payload.
    fn parse_from(outer: &'a impl Packet<'a>) -> Result<Self>
    where
        Self: Sized;
}

/// Represents a packet header.
pub trait PacketHeader {
    /// Offset from the beginning of the header to the start of the payload.
    fn length(&self) -> usize;

    /// Size of the fixed portion of the header in bytes.
    fn size_of() -> usize
    where
        Self: Sized,
    {
        std::mem::size_of::<Self>()
    }
}

#[derive(Error, Debug)]
pub(crate) enum PacketParseError {
    #[error("Unsupported encapsulated protocol")]
    UnsupportedProtocol,

    #[error("Header read past end of frame")]
    TruncatedFrame,
}
