//! Bulk-transfer detection.
//!
//! A bulk episode is a run of at least four consecutive payload-bearing packets in one direction
//! with no gap exceeding one second between successive packets. Each direction owns a `BulkState`;
//! a tentative episode in one direction is abandoned when the other direction has produced a more
//! recent bulk packet.

/// Maximum gap between successive packets of one bulk episode (µs).
const BULK_GAP_US: u64 = 1_000_000;
/// Packets needed before a tentative episode is committed.
const BULK_MIN_PKTS: u64 = 4;

/// Per-direction bulk-transfer accounting.
///
/// The `*_helper` fields describe the tentative episode being built; the remaining fields are
/// committed totals. `state_count` advances exactly once per episode, at the packet where the
/// tentative run reaches four.
#[derive(Debug, Default, Clone, Copy)]
pub struct BulkState {
    /// Timestamp of the first packet of the tentative episode; `None` when no episode is building.
    pub start_helper: Option<u64>,
    /// Timestamp of the last payload-bearing packet accepted in this direction.
    pub last_ts: u64,
    /// Packets in the tentative episode so far.
    pub pkt_helper: u64,
    /// Payload bytes in the tentative episode so far.
    pub size_helper: u64,
    /// Committed episode count.
    pub state_count: u64,
    /// Committed packet count.
    pub packet_count: u64,
    /// Committed payload byte total.
    pub size_total: u64,
    /// Committed episode duration total (µs).
    pub duration: u64,
}

impl BulkState {
    /// Feeds one same-direction packet into the detector. `other_last_ts` is the opposite
    /// direction's `last_ts`; a newer bulk packet over there abandons our tentative episode.
    pub(crate) fn update(&mut self, ts: u64, payload_len: u64, other_last_ts: u64) {
        if let Some(start) = self.start_helper {
            if other_last_ts > start {
                self.start_helper = None;
            }
        }
        if payload_len == 0 {
            return;
        }

        match self.start_helper {
            None => {
                self.start_helper = Some(ts);
                self.pkt_helper = 1;
                self.size_helper = payload_len;
                self.last_ts = ts;
            }
            Some(start) => {
                if ts.saturating_sub(self.last_ts) > BULK_GAP_US {
                    // too much idle time, restart with this packet as the first
                    self.start_helper = Some(ts);
                    self.last_ts = ts;
                    self.pkt_helper = 1;
                    self.size_helper = payload_len;
                } else {
                    self.pkt_helper += 1;
                    self.size_helper += payload_len;
                    if self.pkt_helper == BULK_MIN_PKTS {
                        self.state_count += 1;
                        self.packet_count += self.pkt_helper;
                        self.size_total += self.size_helper;
                        self.duration += ts - start;
                    } else if self.pkt_helper > BULK_MIN_PKTS {
                        self.packet_count += 1;
                        self.size_total += payload_len;
                        self.duration += ts - self.last_ts;
                    }
                    self.last_ts = ts;
                }
            }
        }
    }

    /// Average payload bytes per committed episode, `0` if none.
    #[inline]
    pub fn avg_bytes_per_bulk(&self) -> u64 {
        if self.state_count != 0 {
            self.size_total / self.state_count
        } else {
            0
        }
    }

    /// Average packets per committed episode, `0` if none.
    #[inline]
    pub fn avg_packets_per_bulk(&self) -> u64 {
        if self.state_count != 0 {
            self.packet_count / self.state_count
        } else {
            0
        }
    }

    /// Average committed transfer rate in bytes per second, `0` if no committed duration.
    #[inline]
    pub fn avg_bulk_rate(&self) -> u64 {
        if self.duration != 0 {
            (self.size_total as f64 / (self.duration as f64 / 1e6)) as u64
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_bulk_commits_at_four_packets() {
        let mut bulk = BulkState::default();
        for ts in [0, 100_000, 200_000, 300_000] {
            bulk.update(ts, 1000, 0);
        }
        assert_eq!(bulk.state_count, 1);
        assert_eq!(bulk.packet_count, 4);
        assert_eq!(bulk.size_total, 4000);
        assert_eq!(bulk.duration, 300_000);
        assert_eq!(bulk.avg_bytes_per_bulk(), 4000);
        assert_eq!(bulk.avg_packets_per_bulk(), 4);
    }

    #[test]
    fn core_bulk_extends_past_four() {
        let mut bulk = BulkState::default();
        for ts in [0, 100_000, 200_000, 300_000, 400_000] {
            bulk.update(ts, 1000, 0);
        }
        assert_eq!(bulk.state_count, 1);
        assert_eq!(bulk.packet_count, 5);
        assert_eq!(bulk.size_total, 5000);
        assert_eq!(bulk.duration, 400_000);
        assert_eq!(bulk.avg_bytes_per_bulk(), 5000);
        assert_eq!(bulk.avg_packets_per_bulk(), 5);
    }

    #[test]
    fn core_bulk_gap_restarts_tentative_run() {
        let mut bulk = BulkState::default();
        // 1.5s gap before the 4th packet prevents the commit
        for ts in [0, 100_000, 200_000, 1_700_001] {
            bulk.update(ts, 1000, 0);
        }
        assert_eq!(bulk.state_count, 0);
        assert_eq!(bulk.avg_bytes_per_bulk(), 0);
        assert_eq!(bulk.avg_packets_per_bulk(), 0);
        assert_eq!(bulk.avg_bulk_rate(), 0);
        // gap of exactly 1s still counts toward the same run
        let mut bulk = BulkState::default();
        for ts in [0, 1_000_000, 2_000_000, 3_000_000] {
            bulk.update(ts, 500, 0);
        }
        assert_eq!(bulk.state_count, 1);
    }

    #[test]
    fn core_bulk_ignores_empty_packets() {
        let mut bulk = BulkState::default();
        for ts in [0, 100_000, 200_000] {
            bulk.update(ts, 1000, 0);
        }
        bulk.update(250_000, 0, 0);
        assert_eq!(bulk.pkt_helper, 3);
        bulk.update(300_000, 1000, 0);
        assert_eq!(bulk.state_count, 1);
    }

    #[test]
    fn core_bulk_other_direction_takeover_resets() {
        let mut bulk = BulkState::default();
        for ts in [0, 100_000, 200_000] {
            bulk.update(ts, 1000, 0);
        }
        // the other direction produced a bulk packet after our tentative start
        bulk.update(300_000, 1000, 150_000);
        assert_eq!(bulk.state_count, 0);
        assert_eq!(bulk.pkt_helper, 1);
    }

    #[test]
    fn core_bulk_rate() {
        let mut bulk = BulkState::default();
        for ts in [0, 250_000, 500_000, 1_000_000] {
            bulk.update(ts, 1000, 0);
        }
        assert_eq!(bulk.state_count, 1);
        assert_eq!(bulk.duration, 1_000_000);
        assert_eq!(bulk.avg_bulk_rate(), 4000);
    }
}
