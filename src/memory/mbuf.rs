//! Packet buffer manipulation.
//!
//! ## Remarks
//! An `Mbuf` owns the bytes of a single Ethernet frame copied out of the
//! capture reader. Frames larger than the configured MTU are rejected by the
//! runtime before an `Mbuf` is ever built, so buffers stay small and
//! short-lived: one is alive per packet while it is parsed into a
//! [PacketMeta](crate::flowtrack::pdu::PacketMeta) and dropped immediately
//! after.

use crate::protocols::packet::{Packet, PacketHeader, PacketParseError};

use std::fmt;

use anyhow::{bail, Result};
use thiserror::Error;

/// A packet buffer.
///
/// Represents a single Ethernet frame.
#[derive(Clone)]
pub struct Mbuf {
    data: Vec<u8>,
}

impl Mbuf {
    /// Creates a new Mbuf holding a copy of `data`.
    pub fn from_bytes(data: &[u8]) -> Mbuf {
        Mbuf {
            data: data.to_vec(),
        }
    }

    /// Returns the length of the data in the Mbuf.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Returns the contents of the Mbuf as a byte slice.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a byte slice of data with length count at offset.
    ///
    /// Errors if `offset` is greater than or equal to the buffer length or `count` exceeds the size
    /// of the data stored at `offset`.
    pub fn get_data_slice(&self, offset: usize, count: usize) -> Result<&[u8]> {
        if offset < self.data_len() {
            if offset + count <= self.data_len() {
                Ok(&self.data[offset..offset + count])
            } else {
                bail!(MbufError::ReadPastBuffer)
            }
        } else {
            bail!(MbufError::BadOffset)
        }
    }

    /// Reads the data at `offset` as `T` and returns it as a raw pointer. Errors if `offset` is
    /// greater than or equal to the buffer length or the size of `T` exceeds the size of the data
    /// stored at `offset`.
    pub(crate) fn get_data<T: PacketHeader>(&self, offset: usize) -> Result<*const T> {
        if offset < self.data_len() {
            if offset + T::size_of() <= self.data_len() {
                Ok(self.data[offset..].as_ptr() as *const T)
            } else {
                bail!(MbufError::ReadPastBuffer)
            }
        } else {
            bail!(MbufError::BadOffset)
        }
    }
}

impl<'a> Packet<'a> for Mbuf {
    fn mbuf(&self) -> &Mbuf {
        self
    }

    fn header_len(&self) -> usize {
        0
    }

    fn next_header_offset(&self) -> usize {
        0
    }

    fn next_header(&self) -> Option<usize> {
        None
    }

    fn parse_from(_outer: &'a impl Packet<'a>) -> Result<Self>
    where
        Self: Sized,
    {
        // parse_from should never be called for Mbuf.
        bail!(PacketParseError::UnsupportedProtocol)
    }
}

impl fmt::Debug for Mbuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mbuf")
            .field("data_len", &self.data_len())
            .finish()
    }
}

#[derive(Error, Debug)]
pub(crate) enum MbufError {
    #[error("Read past buffer")]
    ReadPastBuffer,

    #[error("Bad offset")]
    BadOffset,
}
