//! Flow state management.
//!
//! The [`FlowTracker`] owns all open flows, keyed by their direction-free [`FlowId`], and decides
//! when each flow is finished: total timeout, FIN handshake from both sides, RST, or end-of-input
//! drain. Finished flows are handed to the caller-provided sink in finish order. All timeout
//! arithmetic is in packet-timestamp microseconds, so a capture always reproduces the same output.

pub mod flow;
pub mod flow_id;
pub mod pdu;

use self::flow::Flow;
use self::flow_id::FlowId;
use self::pdu::PacketMeta;
use crate::config::FlowTrackConfig;
use crate::protocols::packet::tcp::TCP_PROTOCOL;

use hashlink::linked_hash_map::{LinkedHashMap, RawEntryMut};

/// Configurable options for a `FlowTracker`. All values are in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Time after which an open TCP flow is finished at the next packet arrival.
    pub tcp_flow_timeout: u64,
    /// Time after which an open UDP flow is finished at the next packet arrival.
    pub udp_flow_timeout: u64,
    /// Gap separating active periods from idle periods.
    pub activity_timeout: u64,
}

impl TrackerConfig {
    /// The flow timeout that applies to `proto`.
    #[inline]
    fn flow_timeout(&self, proto: u8) -> u64 {
        if proto as usize == TCP_PROTOCOL {
            self.tcp_flow_timeout
        } else {
            self.udp_flow_timeout
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig::from(&FlowTrackConfig::default())
    }
}

impl From<&FlowTrackConfig> for TrackerConfig {
    fn from(config: &FlowTrackConfig) -> Self {
        TrackerConfig {
            tcp_flow_timeout: config.tcp_flow_timeout * 1_000_000,
            udp_flow_timeout: config.udp_flow_timeout * 1_000_000,
            activity_timeout: config.activity_timeout * 1_000_000,
        }
    }
}

/// Manages state for all open TCP and UDP flows.
///
/// Packets are processed strictly in arrival order; each either joins an open flow (in whichever
/// orientation matches) or creates a new one. Finished flows are passed to the `emit` sink and
/// removed from the table.
pub struct FlowTracker {
    /// Configuration.
    config: TrackerConfig,
    /// Maps `FlowId` to open flow state, in insertion order.
    table: LinkedHashMap<FlowId, Flow>,
    /// Flows handed to the sink.
    finished_count: u64,
    /// Singleton flows dropped at timeout.
    suppressed_count: u64,
}

impl FlowTracker {
    /// Creates a new `FlowTracker`.
    pub fn new(config: TrackerConfig) -> Self {
        FlowTracker {
            config,
            table: LinkedHashMap::new(),
            finished_count: 0,
            suppressed_count: 0,
        }
    }

    /// Returns the number of open flows.
    #[inline]
    pub fn size(&self) -> usize {
        self.table.len()
    }

    /// Returns the number of flows handed to the sink so far.
    #[inline]
    pub fn finished_count(&self) -> u64 {
        self.finished_count
    }

    /// Returns the number of singleton flows suppressed on the timeout path.
    #[inline]
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed_count
    }

    /// Processes a single packet record, routing it into the table and emitting any flow it
    /// finishes.
    pub fn process<F>(&mut self, pkt: &PacketMeta, emit: &mut F)
    where
        F: FnMut(Flow),
    {
        let flow_id = FlowId::new(pkt.src, pkt.dst, pkt.proto);
        let timeout = self.config.flow_timeout(pkt.proto);
        let activity_timeout = self.config.activity_timeout;

        match self.table.raw_entry_mut().from_key(&flow_id) {
            RawEntryMut::Occupied(mut occupied) => {
                let flow = occupied.get_mut();
                if pkt.ts.saturating_sub(flow.start_time) > timeout {
                    // Total timeout: finish the old flow and restart the tuple with this packet.
                    // Singleton flows are dropped here, not emitted.
                    let mut old = std::mem::replace(flow, Flow::new(pkt));
                    if old.packet_count() > 1 {
                        old.end_active_idle(timeout, false);
                        self.finished_count += 1;
                        emit(old);
                    } else {
                        self.suppressed_count += 1;
                    }
                    log::debug!("flow timeout, tuple restarted at {}", pkt.ts);
                } else if pkt.rst() {
                    flow.ingest(pkt);
                    let mut flow = occupied.remove();
                    flow.end_active_idle(timeout, false);
                    self.finished_count += 1;
                    emit(flow);
                } else if pkt.fin() {
                    if flow.is_forward(pkt) {
                        flow.fwd_fin_sent += 1;
                        if flow.fwd_fin_sent == 1 && flow.fin_handshake_complete() {
                            flow.ingest(pkt);
                            let mut flow = occupied.remove();
                            flow.end_active_idle(timeout, true);
                            self.finished_count += 1;
                            emit(flow);
                        } else {
                            flow.update_active_idle(pkt.ts, activity_timeout);
                            flow.ingest(pkt);
                        }
                    } else {
                        flow.bwd_fin_sent += 1;
                        if flow.bwd_fin_sent == 1 && flow.fin_handshake_complete() {
                            flow.ingest(pkt);
                            let mut flow = occupied.remove();
                            flow.end_active_idle(timeout, true);
                            self.finished_count += 1;
                            emit(flow);
                        } else {
                            flow.update_active_idle(pkt.ts, activity_timeout);
                            flow.ingest(pkt);
                        }
                    }
                } else {
                    flow.update_active_idle(pkt.ts, activity_timeout);
                    flow.ingest(pkt);
                }
            }
            RawEntryMut::Vacant(vacant) => {
                vacant.insert(flow_id, Flow::new(pkt));
            }
        }
    }

    /// Drains all remaining open flows at end-of-input, in table insertion order. Residual flows
    /// are emitted unconditionally, including singletons.
    pub fn drain<F>(&mut self, emit: &mut F)
    where
        F: FnMut(Flow),
    {
        log::info!("Draining flow table, {} open flows", self.table.len());
        let config = self.config;
        for (_, mut flow) in self.table.drain() {
            flow.end_active_idle(config.flow_timeout(flow.five_tuple.proto), false);
            self.finished_count += 1;
            emit(flow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::packet::tcp::{ACK, FIN, RST, SYN};
    use std::net::SocketAddr;

    const A: &str = "192.168.1.1:1111";
    const B: &str = "192.168.1.2:80";

    fn meta(src: &str, dst: &str, ts: u64, payload: u64, flags: u8) -> PacketMeta {
        let src: SocketAddr = src.parse().unwrap();
        let dst: SocketAddr = dst.parse().unwrap();
        PacketMeta {
            src,
            dst,
            proto: 6,
            ts,
            payload_len: payload,
            header_len: 54,
            tcp_header_len: 20,
            tcp_window: 1024,
            flags,
        }
    }

    fn new_tracker() -> FlowTracker {
        FlowTracker::new(TrackerConfig {
            tcp_flow_timeout: 60_000_000,
            udp_flow_timeout: 60_000_000,
            activity_timeout: 10_000_000,
        })
    }

    fn collect(tracker: &mut FlowTracker, pkts: &[PacketMeta]) -> Vec<Flow> {
        let mut flows = vec![];
        let mut emit = |flow: Flow| flows.push(flow);
        for pkt in pkts {
            tracker.process(pkt, &mut emit);
        }
        flows
    }

    #[test]
    fn core_tracker_bidirectional_match() {
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[meta(A, B, 0, 0, ACK), meta(B, A, 1_000, 0, ACK)],
        );
        assert!(finished.is_empty());
        assert_eq!(tracker.size(), 1);
    }

    #[test]
    fn core_tracker_distinct_tuples_distinct_flows() {
        let mut tracker = new_tracker();
        collect(
            &mut tracker,
            &[
                meta(A, B, 0, 0, ACK),
                meta("192.168.1.1:2222", B, 1_000, 0, ACK),
            ],
        );
        assert_eq!(tracker.size(), 2);
    }

    #[test]
    fn core_tracker_timeout_boundary() {
        // exactly the timeout does not split the flow
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[meta(A, B, 0, 0, ACK), meta(A, B, 60_000_000, 0, ACK)],
        );
        assert!(finished.is_empty());
        assert_eq!(tracker.size(), 1);

        // one microsecond past it does
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[
                meta(A, B, 0, 0, ACK),
                meta(B, A, 1_000, 0, ACK),
                meta(A, B, 60_000_001, 0, ACK),
            ],
        );
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].packet_count(), 2);
        // the tuple restarted with the late packet
        assert_eq!(tracker.size(), 1);
    }

    #[test]
    fn core_tracker_timeout_suppresses_singletons() {
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[meta(A, B, 0, 0, ACK), meta(A, B, 60_000_001, 0, ACK)],
        );
        assert!(finished.is_empty());
        assert_eq!(tracker.suppressed_count(), 1);

        // the restarted flow is still emitted at drain, singleton or not
        let mut drained = vec![];
        tracker.drain(&mut |flow| drained.push(flow));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].packet_count(), 1);
        assert_eq!(drained[0].start_time, 60_000_001);
    }

    #[test]
    fn core_tracker_fin_handshake_closes() {
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[
                meta(A, B, 0, 0, SYN),
                meta(B, A, 1_000, 0, SYN | ACK),
                meta(A, B, 2_000, 100, ACK),
                meta(B, A, 3_000, 50, ACK),
                meta(A, B, 4_000, 0, FIN | ACK),
                meta(B, A, 5_000, 0, FIN | ACK),
            ],
        );
        assert_eq!(finished.len(), 1);
        let flow = &finished[0];
        assert_eq!(flow.fwd.pkt_count, 3);
        assert_eq!(flow.bwd.pkt_count, 3);
        assert_eq!(flow.flags.fin, 2);
        assert_eq!(flow.flags.syn, 2);
        assert_eq!(tracker.size(), 0);
    }

    #[test]
    fn core_tracker_same_side_fins_do_not_close() {
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[
                meta(A, B, 0, 0, SYN),
                meta(A, B, 1_000, 0, FIN | ACK),
                meta(A, B, 2_000, 0, FIN | ACK),
            ],
        );
        assert!(finished.is_empty());
        assert_eq!(tracker.size(), 1);
    }

    #[test]
    fn core_tracker_rst_closes_immediately() {
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[
                meta(A, B, 0, 0, SYN),
                meta(A, B, 1_000, 0, FIN | ACK),
                meta(B, A, 2_000, 0, RST),
            ],
        );
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].packet_count(), 3);
        assert_eq!(tracker.size(), 0);
    }

    #[test]
    fn core_tracker_fin_then_rst_state() {
        // a lone RST closes a freshly opened flow as well
        let mut tracker = new_tracker();
        let finished = collect(
            &mut tracker,
            &[meta(A, B, 0, 0, ACK), meta(A, B, 1_000, 0, RST)],
        );
        assert_eq!(finished.len(), 1);
        assert_eq!(tracker.finished_count(), 1);
    }

    #[test]
    fn core_tracker_drain_order_is_insertion_order() {
        let mut tracker = new_tracker();
        collect(
            &mut tracker,
            &[
                meta("10.0.0.9:999", "10.0.0.10:80", 0, 0, ACK),
                meta(A, B, 1_000, 0, ACK),
                meta("10.0.0.1:53", "10.0.0.2:53", 2_000, 0, ACK),
            ],
        );
        let mut drained = vec![];
        tracker.drain(&mut |flow| drained.push(flow));
        let starts: Vec<u64> = drained.iter().map(|f| f.start_time).collect();
        assert_eq!(starts, vec![0, 1_000, 2_000]);
        assert_eq!(tracker.finished_count(), 3);
    }

    #[test]
    fn core_tracker_forward_id_kept_for_reversed_lookup() {
        let mut tracker = new_tracker();
        collect(
            &mut tracker,
            &[meta(B, A, 0, 0, ACK), meta(A, B, 1_000, 0, ACK)],
        );
        let mut drained = vec![];
        tracker.drain(&mut |flow| drained.push(flow));
        // the first packet's orientation is the forward id, even for replies
        assert_eq!(
            drained[0].five_tuple.fwd_flow_id(),
            "192.168.1.2-192.168.1.1-80-1111-6"
        );
        assert_eq!(drained[0].fwd.pkt_count, 1);
        assert_eq!(drained[0].bwd.pkt_count, 1);
    }
}
