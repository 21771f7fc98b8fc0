//! Normalized packet records.
//!
//! Raw frames are parsed once, at ingress, into a [`PacketMeta`] carrying everything the metering
//! core reads: the 5-tuple, the capture timestamp in microseconds, payload and header lengths, and
//! the TCP window and flag bits. The frame buffer itself is dropped immediately afterwards.

use crate::flowtrack::flow_id::FiveTuple;
use crate::memory::mbuf::Mbuf;
use crate::protocols::packet::ethernet::Ethernet;
use crate::protocols::packet::ipv4::Ipv4;
use crate::protocols::packet::ipv6::Ipv6;
use crate::protocols::packet::tcp::{Tcp, FIN, RST, TCP_PROTOCOL};
use crate::protocols::packet::udp::{Udp, UDP_PROTOCOL};
use crate::protocols::packet::Packet;

use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Result};

/// Normalized immutable packet record.
///
/// For UDP packets all TCP-specific fields are zero.
#[derive(Debug, Clone, Copy)]
pub struct PacketMeta {
    /// Source socket address.
    pub src: SocketAddr,
    /// Destination socket address.
    pub dst: SocketAddr,
    /// L4 protocol number.
    pub proto: u8,
    /// Capture timestamp in microseconds.
    pub ts: u64,
    /// L4 payload length in bytes (IP total length minus L3 and L4 headers).
    pub payload_len: u64,
    /// Total header length (L2 + L3 + L4) in bytes.
    pub header_len: u64,
    /// TCP header length in bytes, from the data offset field.
    pub tcp_header_len: u64,
    /// TCP advertised receive window.
    pub tcp_window: u16,
    /// TCP flag bits.
    pub flags: u8,
}

impl PacketMeta {
    /// Parses the frame in `mbuf` into a packet record, with `ts` the capture timestamp in
    /// microseconds. Errors on anything the metering core does not handle: non-Ethernet/IP frames,
    /// L4 protocols other than TCP and UDP, IPv6 when `parse_ipv6` is unset, non-first fragments,
    /// and headers whose length fields disagree with the buffer.
    pub fn new(mbuf: &Mbuf, ts: u64, parse_ipv6: bool) -> Result<Self> {
        let eth = match mbuf.parse_to::<Ethernet>() {
            Ok(eth) => eth,
            Err(_) => bail!("Not Ethernet"),
        };
        if let Ok(ipv4) = eth.parse_to::<Ipv4>() {
            if ipv4.fragment_offset() > 0 {
                bail!("Non-first fragment");
            }
            let l2_l3_len = (eth.header_len() + ipv4.header_len()) as u64;
            if let Ok(tcp) = ipv4.parse_to::<Tcp>() {
                if let Some(payload_len) = (ipv4.total_length() as usize)
                    .checked_sub(ipv4.header_len() + tcp.header_len())
                {
                    Ok(PacketMeta {
                        src: SocketAddr::new(IpAddr::V4(ipv4.src_addr()), tcp.src_port()),
                        dst: SocketAddr::new(IpAddr::V4(ipv4.dst_addr()), tcp.dst_port()),
                        proto: TCP_PROTOCOL as u8,
                        ts,
                        payload_len: payload_len as u64,
                        header_len: l2_l3_len + tcp.header_len() as u64,
                        tcp_header_len: tcp.header_len() as u64,
                        tcp_window: tcp.window(),
                        flags: tcp.flags(),
                    })
                } else {
                    bail!("Malformed Packet");
                }
            } else if let Ok(udp) = ipv4.parse_to::<Udp>() {
                if let Some(payload_len) = (ipv4.total_length() as usize)
                    .checked_sub(ipv4.header_len() + udp.header_len())
                {
                    Ok(PacketMeta {
                        src: SocketAddr::new(IpAddr::V4(ipv4.src_addr()), udp.src_port()),
                        dst: SocketAddr::new(IpAddr::V4(ipv4.dst_addr()), udp.dst_port()),
                        proto: UDP_PROTOCOL as u8,
                        ts,
                        payload_len: payload_len as u64,
                        header_len: l2_l3_len + udp.header_len() as u64,
                        tcp_header_len: 0,
                        tcp_window: 0,
                        flags: 0,
                    })
                } else {
                    bail!("Malformed Packet");
                }
            } else {
                bail!("Not TCP or UDP");
            }
        } else if let Ok(ipv6) = eth.parse_to::<Ipv6>() {
            if !parse_ipv6 {
                bail!("IPv6 parsing disabled");
            }
            let l2_l3_len = (eth.header_len() + ipv6.header_len()) as u64;
            if let Ok(tcp) = ipv6.parse_to::<Tcp>() {
                if let Some(payload_len) =
                    (ipv6.payload_length() as usize).checked_sub(tcp.header_len())
                {
                    Ok(PacketMeta {
                        src: SocketAddr::new(IpAddr::V6(ipv6.src_addr()), tcp.src_port()),
                        dst: SocketAddr::new(IpAddr::V6(ipv6.dst_addr()), tcp.dst_port()),
                        proto: TCP_PROTOCOL as u8,
                        ts,
                        payload_len: payload_len as u64,
                        header_len: l2_l3_len + tcp.header_len() as u64,
                        tcp_header_len: tcp.header_len() as u64,
                        tcp_window: tcp.window(),
                        flags: tcp.flags(),
                    })
                } else {
                    bail!("Malformed Packet");
                }
            } else if let Ok(udp) = ipv6.parse_to::<Udp>() {
                if let Some(payload_len) =
                    (ipv6.payload_length() as usize).checked_sub(udp.header_len())
                {
                    Ok(PacketMeta {
                        src: SocketAddr::new(IpAddr::V6(ipv6.src_addr()), udp.src_port()),
                        dst: SocketAddr::new(IpAddr::V6(ipv6.dst_addr()), udp.dst_port()),
                        proto: UDP_PROTOCOL as u8,
                        ts,
                        payload_len: payload_len as u64,
                        header_len: l2_l3_len + udp.header_len() as u64,
                        tcp_header_len: 0,
                        tcp_window: 0,
                        flags: 0,
                    })
                } else {
                    bail!("Malformed Packet");
                }
            } else {
                bail!("Not TCP or UDP");
            }
        } else {
            bail!("Not IP");
        }
    }

    /// Returns the 5-tuple in this packet's orientation.
    #[inline]
    pub fn five_tuple(&self) -> FiveTuple {
        FiveTuple {
            src: self.src,
            dst: self.dst,
            proto: self.proto,
        }
    }

    /// Returns `true` if the FIN flag is set.
    #[inline]
    pub fn fin(&self) -> bool {
        self.flags & FIN != 0
    }

    /// Returns `true` if the RST flag is set.
    #[inline]
    pub fn rst(&self) -> bool {
        self.flags & RST != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::packet::tcp::{ACK, SYN};

    /// Builds an Ethernet/IPv4/TCP frame with the given payload length.
    fn tcp_frame(
        src: [u8; 4],
        dst: [u8; 4],
        src_port: u16,
        dst_port: u16,
        flags: u8,
        window: u16,
        payload_len: u16,
    ) -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08; // IPv4 EtherType
        frame[13] = 0x00;

        let total_len = 20 + 20 + payload_len;
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&total_len.to_be_bytes());
        ip[8] = 64;
        ip[9] = 6;
        ip[12..16].copy_from_slice(&src);
        ip[16..20].copy_from_slice(&dst);
        frame.extend_from_slice(&ip);

        let mut tcp = vec![0u8; 20];
        tcp[0..2].copy_from_slice(&src_port.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        tcp[12] = 0x50; // data offset 5 words
        tcp[13] = flags;
        tcp[14..16].copy_from_slice(&window.to_be_bytes());
        frame.extend_from_slice(&tcp);

        frame.extend(std::iter::repeat(0u8).take(payload_len as usize));
        frame
    }

    /// Builds an Ethernet/IPv4/UDP frame with the given payload length.
    fn udp_frame(
        src: [u8; 4],
        dst: [u8; 4],
        src_port: u16,
        dst_port: u16,
        payload_len: u16,
    ) -> Vec<u8> {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x00;

        let total_len = 20 + 8 + payload_len;
        let mut ip = vec![0u8; 20];
        ip[0] = 0x45;
        ip[2..4].copy_from_slice(&total_len.to_be_bytes());
        ip[8] = 64;
        ip[9] = 17;
        ip[12..16].copy_from_slice(&src);
        ip[16..20].copy_from_slice(&dst);
        frame.extend_from_slice(&ip);

        let mut udp = vec![0u8; 8];
        udp[0..2].copy_from_slice(&src_port.to_be_bytes());
        udp[2..4].copy_from_slice(&dst_port.to_be_bytes());
        udp[4..6].copy_from_slice(&(8 + payload_len).to_be_bytes());
        frame.extend_from_slice(&udp);

        frame.extend(std::iter::repeat(0u8).take(payload_len as usize));
        frame
    }

    #[test]
    fn core_pdu_tcp_fields() {
        let frame = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 43125, 80, SYN | ACK, 512, 100);
        let mbuf = Mbuf::from_bytes(&frame);
        let meta = PacketMeta::new(&mbuf, 5_000_000, false).unwrap();
        assert_eq!(meta.src, "10.0.0.1:43125".parse().unwrap());
        assert_eq!(meta.dst, "10.0.0.2:80".parse().unwrap());
        assert_eq!(meta.proto, 6);
        assert_eq!(meta.ts, 5_000_000);
        assert_eq!(meta.payload_len, 100);
        assert_eq!(meta.header_len, 14 + 20 + 20);
        assert_eq!(meta.tcp_header_len, 20);
        assert_eq!(meta.tcp_window, 512);
        assert!(!meta.fin());
        assert!(!meta.rst());
    }

    #[test]
    fn core_pdu_udp_zeroes_tcp_fields() {
        let frame = udp_frame([10, 0, 0, 1], [10, 0, 0, 2], 5353, 53, 64);
        let mbuf = Mbuf::from_bytes(&frame);
        let meta = PacketMeta::new(&mbuf, 0, false).unwrap();
        assert_eq!(meta.proto, 17);
        assert_eq!(meta.payload_len, 64);
        assert_eq!(meta.header_len, 14 + 20 + 8);
        assert_eq!(meta.tcp_header_len, 0);
        assert_eq!(meta.tcp_window, 0);
        assert_eq!(meta.flags, 0);
    }

    #[test]
    fn core_pdu_rejects_non_ip() {
        let mut frame = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, 0, 0, 0);
        frame[12] = 0x08;
        frame[13] = 0x06; // ARP
        let mbuf = Mbuf::from_bytes(&frame);
        assert!(PacketMeta::new(&mbuf, 0, false).is_err());
    }

    #[test]
    fn core_pdu_rejects_other_l4() {
        let mut frame = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, 0, 0, 0);
        frame[14 + 9] = 1; // ICMP
        let mbuf = Mbuf::from_bytes(&frame);
        assert!(PacketMeta::new(&mbuf, 0, false).is_err());
    }

    #[test]
    fn core_pdu_rejects_truncated_header() {
        let frame = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, 0, 0, 0);
        let mbuf = Mbuf::from_bytes(&frame[..30]);
        assert!(PacketMeta::new(&mbuf, 0, false).is_err());
    }

    #[test]
    fn core_pdu_rejects_bad_length_arithmetic() {
        let mut frame = tcp_frame([10, 0, 0, 1], [10, 0, 0, 2], 1, 2, 0, 0, 0);
        // IP total length smaller than its own headers
        frame[14 + 2] = 0;
        frame[14 + 3] = 10;
        let mbuf = Mbuf::from_bytes(&frame);
        assert!(PacketMeta::new(&mbuf, 0, false).is_err());
    }
}
