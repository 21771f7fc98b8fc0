//! Per-flow feature state.
//!
//! A [`Flow`] aggregates everything the feature table reports for one bidirectional flow:
//! directional packet/byte counters and length statistics, inter-arrival timing, TCP flag tallies,
//! bulk-transfer episodes, sub-flow segmentation, and active/idle periods. State is updated one
//! packet at a time through [`Flow::ingest`] and never touches the packet buffer, only the
//! normalized [`PacketMeta`] record.

pub mod bulk;

use self::bulk::BulkState;
use crate::flowtrack::flow_id::FiveTuple;
use crate::flowtrack::pdu::PacketMeta;
use crate::protocols::packet::tcp::{ACK, CWR, ECE, FIN, PSH, RST, SYN, URG};
use crate::stats::SummaryStats;

use std::cmp;

/// Gap between packets that opens a new sub-flow (µs).
const SUBFLOW_GAP_US: u64 = 1_000_000;
/// Activity threshold applied on sub-flow transitions (µs).
const SUBFLOW_ACTIVITY_US: u64 = 5_000_000;

/// Label reported when no label file was supplied.
pub const LABEL_UNKNOWN: &str = "UNKNOWN";

/// Accumulators for one direction of a flow.
#[derive(Debug, Default, Clone)]
pub struct DirStats {
    /// Payload length distribution.
    pub pkt_len: SummaryStats,
    /// Inter-arrival times between successive packets in this direction (µs).
    pub iat: SummaryStats,
    /// Packets observed.
    pub pkt_count: u64,
    /// Payload bytes observed.
    pub bytes: u64,
    /// Header bytes (L2 + L3 + L4) observed.
    pub header_bytes: u64,
    /// Timestamp of the most recent packet (µs).
    pub last_seen: u64,
    /// Packets with PSH set.
    pub psh_count: u64,
    /// Packets with URG set.
    pub urg_count: u64,
    /// Packets with FIN set.
    pub fin_count: u64,
    /// Bulk-transfer sub-state.
    pub bulk: BulkState,
}

impl DirStats {
    #[inline]
    fn add_packet(&mut self, ts: u64, payload_len: u64, header_len: u64) {
        self.pkt_len.append(payload_len as f64);
        self.bytes += payload_len;
        self.header_bytes += header_len;
        if self.pkt_count > 0 {
            self.iat.append(ts.saturating_sub(self.last_seen) as f64);
        }
        self.pkt_count += 1;
        self.last_seen = ts;
    }

    #[inline]
    fn tally_flags(&mut self, flags: u8) {
        if flags & PSH != 0 {
            self.psh_count += 1;
        }
        if flags & URG != 0 {
            self.urg_count += 1;
        }
        if flags & FIN != 0 {
            self.fin_count += 1;
        }
    }
}

/// Whole-flow TCP flag tallies.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlagCounts {
    pub fin: u64,
    pub syn: u64,
    pub rst: u64,
    pub psh: u64,
    pub ack: u64,
    pub urg: u64,
    pub cwr: u64,
    pub ece: u64,
}

impl FlagCounts {
    #[inline]
    fn tally(&mut self, flags: u8) {
        if flags & FIN != 0 {
            self.fin += 1;
        }
        if flags & SYN != 0 {
            self.syn += 1;
        }
        if flags & RST != 0 {
            self.rst += 1;
        }
        if flags & PSH != 0 {
            self.psh += 1;
        }
        if flags & ACK != 0 {
            self.ack += 1;
        }
        if flags & URG != 0 {
            self.urg += 1;
        }
        if flags & CWR != 0 {
            self.cwr += 1;
        }
        if flags & ECE != 0 {
            self.ece += 1;
        }
    }
}

/// State for a single bidirectional flow.
///
/// Created from the first observed packet, whose orientation fixes the forward direction. Owned
/// exclusively by the flow table while open; handed to the serializer once finished.
#[derive(Debug, Clone)]
pub struct Flow {
    /// Forward 5-tuple, in first-packet orientation.
    pub five_tuple: FiveTuple,
    /// Flow start time (µs).
    pub start_time: u64,
    /// Timestamp of the most recent packet in either direction (µs).
    pub last_seen: u64,
    /// Payload length distribution across both directions.
    pub pkt_len: SummaryStats,
    /// Inter-arrival times across both directions (µs).
    pub iat: SummaryStats,
    /// Forward-direction accumulators.
    pub fwd: DirStats,
    /// Backward-direction accumulators.
    pub bwd: DirStats,
    /// Whole-flow TCP flag tallies.
    pub flags: FlagCounts,
    /// FINs the tracker has routed from the forward side; drives handshake closure.
    pub fwd_fin_sent: u64,
    /// FINs the tracker has routed from the backward side.
    pub bwd_fin_sent: u64,
    /// Timestamp of the previous packet for sub-flow segmentation.
    pub subflow_last_ts: Option<u64>,
    /// Sub-flow transitions observed.
    pub subflow_count: u64,
    /// Timestamp of the most recent sub-flow transition (µs).
    pub subflow_ac_helper: u64,
    /// Start of the current active period (µs).
    pub start_active_time: u64,
    /// End of the current active period (µs).
    pub end_active_time: u64,
    /// Lengths of closed active periods (µs).
    pub active: SummaryStats,
    /// Lengths of idle periods (µs).
    pub idle: SummaryStats,
    /// TCP window advertised by the first forward packet.
    pub init_win_fwd: u64,
    /// TCP window advertised by the first backward packet.
    pub init_win_bwd: u64,
    /// Forward packets carrying payload.
    pub act_data_pkt_fwd: u64,
    /// Minimum TCP header length over forward packets.
    pub min_seg_size_fwd: u64,
    /// Classification label.
    pub label: String,
}

impl Flow {
    /// Creates a new flow from its first packet. The packet's orientation becomes the forward
    /// direction and its accounting (minus inter-arrival samples, which need a predecessor) is
    /// applied immediately.
    pub fn new(pkt: &PacketMeta) -> Self {
        let mut flow = Flow {
            five_tuple: pkt.five_tuple(),
            start_time: pkt.ts,
            last_seen: pkt.ts,
            pkt_len: SummaryStats::new(),
            iat: SummaryStats::new(),
            fwd: DirStats::default(),
            bwd: DirStats::default(),
            flags: FlagCounts::default(),
            fwd_fin_sent: 0,
            bwd_fin_sent: 0,
            subflow_last_ts: None,
            subflow_count: 0,
            subflow_ac_helper: pkt.ts,
            start_active_time: pkt.ts,
            end_active_time: pkt.ts,
            active: SummaryStats::new(),
            idle: SummaryStats::new(),
            init_win_fwd: pkt.tcp_window as u64,
            init_win_bwd: 0,
            act_data_pkt_fwd: 0,
            min_seg_size_fwd: pkt.tcp_header_len,
            label: LABEL_UNKNOWN.to_string(),
        };
        flow.ingest(pkt);
        flow
    }

    /// Returns `true` if `pkt` travels in the flow's forward direction.
    #[inline]
    pub fn is_forward(&self, pkt: &PacketMeta) -> bool {
        pkt.src.ip() == self.five_tuple.src.ip()
    }

    /// Total packets observed in both directions.
    #[inline]
    pub fn packet_count(&self) -> u64 {
        self.fwd.pkt_count + self.bwd.pkt_count
    }

    /// Flow duration in microseconds.
    #[inline]
    pub fn duration(&self) -> u64 {
        self.last_seen - self.start_time
    }

    /// Returns `true` once both sides have contributed a FIN.
    #[inline]
    pub fn fin_handshake_complete(&self) -> bool {
        self.fwd_fin_sent.min(1) + self.bwd_fin_sent.min(1) == 2
    }

    /// Folds one packet into the flow state. Updates, in order: bulk detection, sub-flow
    /// segmentation, flag tallies, size statistics, inter-arrival times, and the TCP extras.
    pub fn ingest(&mut self, pkt: &PacketMeta) {
        let forward = self.is_forward(pkt);
        let first = self.packet_count() == 0;

        if forward {
            let other_last_ts = self.bwd.bulk.last_ts;
            self.fwd.bulk.update(pkt.ts, pkt.payload_len, other_last_ts);
        } else {
            let other_last_ts = self.fwd.bulk.last_ts;
            self.bwd.bulk.update(pkt.ts, pkt.payload_len, other_last_ts);
        }

        self.detect_update_subflows(pkt.ts);

        self.flags.tally(pkt.flags);

        self.pkt_len.append(pkt.payload_len as f64);
        if forward {
            if pkt.payload_len > 0 {
                self.act_data_pkt_fwd += 1;
            }
            self.min_seg_size_fwd = cmp::min(self.min_seg_size_fwd, pkt.tcp_header_len);
            self.fwd.tally_flags(pkt.flags);
            self.fwd.add_packet(pkt.ts, pkt.payload_len, pkt.header_len);
        } else {
            if self.bwd.pkt_count == 0 {
                self.init_win_bwd = pkt.tcp_window as u64;
            }
            self.bwd.tally_flags(pkt.flags);
            self.bwd.add_packet(pkt.ts, pkt.payload_len, pkt.header_len);
        }

        if !first {
            self.iat.append(pkt.ts.saturating_sub(self.last_seen) as f64);
        }
        self.last_seen = pkt.ts;
    }

    /// Active/idle accounting for the current packet time `ts`. A gap larger than `threshold`
    /// closes the running active period (if it has positive length) and records the gap as idle.
    pub fn update_active_idle(&mut self, ts: u64, threshold: u64) {
        if ts.saturating_sub(self.end_active_time) > threshold {
            if self.end_active_time > self.start_active_time {
                self.active
                    .append((self.end_active_time - self.start_active_time) as f64);
            }
            self.idle.append((ts - self.end_active_time) as f64);
            self.start_active_time = ts;
            self.end_active_time = ts;
        } else {
            self.end_active_time = ts;
        }
    }

    /// Final active/idle accounting at flow finish. The running active period is closed, and
    /// unless the flow ended with a FIN handshake the remainder of the timeout window is recorded
    /// as a trailing idle span. Flows that never got past their first instant record neither.
    pub(crate) fn end_active_idle(&mut self, flow_timeout: u64, is_fin_closure: bool) {
        if self.end_active_time > self.start_active_time {
            self.active
                .append((self.end_active_time - self.start_active_time) as f64);
        }
        if !is_fin_closure && self.end_active_time > self.start_time {
            let elapsed = self.end_active_time - self.start_time;
            if flow_timeout > elapsed {
                self.idle.append((flow_timeout - elapsed) as f64);
            }
        }
    }

    /// Opens a new sub-flow when the gap from the previous packet (either direction) exceeds one
    /// second; such a transition also feeds active/idle accounting at the 5s threshold.
    fn detect_update_subflows(&mut self, ts: u64) {
        match self.subflow_last_ts {
            None => {
                self.subflow_last_ts = Some(ts);
                self.subflow_ac_helper = ts;
            }
            Some(last) => {
                if ts.saturating_sub(last) > SUBFLOW_GAP_US {
                    self.subflow_count += 1;
                    self.subflow_ac_helper = ts;
                    self.update_active_idle(ts, SUBFLOW_ACTIVITY_US);
                }
                self.subflow_last_ts = Some(ts);
            }
        }
    }

    // ------------------------------------------------
    // Derived metrics used by the feature serializer. All division-by-zero cases yield 0.

    /// Forward packets per second over the flow duration.
    pub fn fwd_pkts_per_sec(&self) -> f64 {
        let duration = self.duration();
        if duration > 0 {
            self.fwd.pkt_count as f64 / (duration as f64 / 1e6)
        } else {
            0.0
        }
    }

    /// Backward packets per second over the flow duration.
    pub fn bwd_pkts_per_sec(&self) -> f64 {
        let duration = self.duration();
        if duration > 0 {
            self.bwd.pkt_count as f64 / (duration as f64 / 1e6)
        } else {
            0.0
        }
    }

    /// Payload bytes per second across both directions.
    pub fn flow_bytes_per_sec(&self) -> f64 {
        let duration = self.duration();
        if duration > 0 {
            (self.fwd.bytes + self.bwd.bytes) as f64 / (duration as f64 / 1e6)
        } else {
            0.0
        }
    }

    /// Packets per second across both directions.
    pub fn flow_pkts_per_sec(&self) -> f64 {
        let duration = self.duration();
        if duration > 0 {
            self.packet_count() as f64 / (duration as f64 / 1e6)
        } else {
            0.0
        }
    }

    /// Ratio of backward to forward packet counts (integer division).
    pub fn down_up_ratio(&self) -> u64 {
        if self.fwd.pkt_count > 0 {
            self.bwd.pkt_count / self.fwd.pkt_count
        } else {
            0
        }
    }

    /// Mean payload size over all packets.
    pub fn avg_pkt_size(&self) -> f64 {
        if self.packet_count() > 0 {
            self.pkt_len.sum() / self.packet_count() as f64
        } else {
            0.0
        }
    }

    /// Mean forward payload size.
    pub fn fwd_avg_segment_size(&self) -> f64 {
        if self.fwd.pkt_count > 0 {
            self.fwd.pkt_len.sum() / self.fwd.pkt_count as f64
        } else {
            0.0
        }
    }

    /// Mean backward payload size.
    pub fn bwd_avg_segment_size(&self) -> f64 {
        if self.bwd.pkt_count > 0 {
            self.bwd.pkt_len.sum() / self.bwd.pkt_count as f64
        } else {
            0.0
        }
    }

    /// Forward packets per sub-flow (integer division, 0 with no sub-flows).
    pub fn subflow_fwd_packets(&self) -> u64 {
        if self.subflow_count > 0 {
            self.fwd.pkt_count / self.subflow_count
        } else {
            0
        }
    }

    /// Forward payload bytes per sub-flow.
    pub fn subflow_fwd_bytes(&self) -> u64 {
        if self.subflow_count > 0 {
            self.fwd.bytes / self.subflow_count
        } else {
            0
        }
    }

    /// Backward packets per sub-flow.
    pub fn subflow_bwd_packets(&self) -> u64 {
        if self.subflow_count > 0 {
            self.bwd.pkt_count / self.subflow_count
        } else {
            0
        }
    }

    /// Backward payload bytes per sub-flow.
    pub fn subflow_bwd_bytes(&self) -> u64 {
        if self.subflow_count > 0 {
            self.bwd.bytes / self.subflow_count
        } else {
            0
        }
    }
}
