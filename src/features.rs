//! The feature table schema.
//!
//! Owns the fixed column order of the output CSV and the projection of a finished
//! [`Flow`](crate::flowtrack::flow::Flow) into one record. Numeric formatting is the language
//! default: integers in decimal, floats via their `Display` form, and empty statistics render
//! as `0`.

use crate::flowtrack::flow::Flow;

/// Output columns, in order. One row per flow follows the header line.
pub const FEATURE_COLUMNS: [&str; 84] = [
    "Flow ID",
    "Src IP",
    "Src Port",
    "Dst IP",
    "Dst Port",
    "Protocol",
    "Timestamp",
    "Flow Duration",
    "Tot Fwd Pkts",
    "Tot Bwd Pkts",
    "TotLen Fwd Pkts",
    "TotLen Bwd Pkts",
    "Fwd Pkt Len Max",
    "Fwd Pkt Len Min",
    "Fwd Pkt Len Mean",
    "Fwd Pkt Len Std",
    "Bwd Pkt Len Max",
    "Bwd Pkt Len Min",
    "Bwd Pkt Len Mean",
    "Bwd Pkt Len Std",
    "Flow Byts/s",
    "Flow Pkts/s",
    "Flow IAT Mean",
    "Flow IAT Std",
    "Flow IAT Max",
    "Flow IAT Min",
    "Fwd IAT Tot",
    "Fwd IAT Mean",
    "Fwd IAT Std",
    "Fwd IAT Max",
    "Fwd IAT Min",
    "Bwd IAT Tot",
    "Bwd IAT Mean",
    "Bwd IAT Std",
    "Bwd IAT Max",
    "Bwd IAT Min",
    "Fwd PSH Flags",
    "Bwd PSH Flags",
    "Fwd URG Flags",
    "Bwd URG Flags",
    "Fwd Header Len",
    "Bwd Header Len",
    "Fwd Pkts/s",
    "Bwd Pkts/s",
    "Pkt Len Min",
    "Pkt Len Max",
    "Pkt Len Mean",
    "Pkt Len Std",
    "Pkt Len Var",
    "FIN Flag Cnt",
    "SYN Flag Cnt",
    "RST Flag Cnt",
    "PSH Flag Cnt",
    "ACK Flag Cnt",
    "URG Flag Cnt",
    "CWE Flag Count",
    "ECE Flag Cnt",
    "Down/Up Ratio",
    "Pkt Size Avg",
    "Fwd Seg Size Avg",
    "Bwd Seg Size Avg",
    "Fwd Byts/b Avg",
    "Fwd Pkts/b Avg",
    "Fwd Blk Rate Avg",
    "Bwd Byts/b Avg",
    "Bwd Pkts/b Avg",
    "Bwd Blk Rate Avg",
    "Subflow Fwd Pkts",
    "Subflow Fwd Byts",
    "Subflow Bwd Pkts",
    "Subflow Bwd Byts",
    "Init Fwd Win Byts",
    "Init Bwd Win Byts",
    "Fwd Act Data Pkts",
    "Fwd Seg Size Min",
    "Active Mean",
    "Active Std",
    "Active Max",
    "Active Min",
    "Idle Mean",
    "Idle Std",
    "Idle Max",
    "Idle Min",
    "Label",
];

lazy_static! {
    static ref HEADER_LINE: String = FEATURE_COLUMNS.join(",");
}

/// The header line as a single comma-joined string.
pub fn header_line() -> &'static str {
    &HEADER_LINE
}

/// Projects a finished flow into one record, in [`FEATURE_COLUMNS`] order.
pub fn flow_record(flow: &Flow) -> Vec<String> {
    let mut record = Vec::with_capacity(FEATURE_COLUMNS.len());

    // tuple
    record.push(flow.five_tuple.fwd_flow_id());
    record.push(flow.five_tuple.src.ip().to_string());
    record.push(flow.five_tuple.src.port().to_string());
    record.push(flow.five_tuple.dst.ip().to_string());
    record.push(flow.five_tuple.dst.port().to_string());
    record.push(flow.five_tuple.proto.to_string());

    // time
    record.push(flow.start_time.to_string());
    record.push(flow.duration().to_string());

    // directional payload totals
    record.push(flow.fwd.pkt_count.to_string());
    record.push(flow.bwd.pkt_count.to_string());
    record.push(flow.fwd.pkt_len.sum().to_string());
    record.push(flow.bwd.pkt_len.sum().to_string());
    record.push(flow.fwd.pkt_len.max().to_string());
    record.push(flow.fwd.pkt_len.min().to_string());
    record.push(flow.fwd.pkt_len.mean().to_string());
    record.push(flow.fwd.pkt_len.std().to_string());
    record.push(flow.bwd.pkt_len.max().to_string());
    record.push(flow.bwd.pkt_len.min().to_string());
    record.push(flow.bwd.pkt_len.mean().to_string());
    record.push(flow.bwd.pkt_len.std().to_string());

    // rates and inter-arrival timing
    record.push(flow.flow_bytes_per_sec().to_string());
    record.push(flow.flow_pkts_per_sec().to_string());
    record.push(flow.iat.mean().to_string());
    record.push(flow.iat.std().to_string());
    record.push(flow.iat.max().to_string());
    record.push(flow.iat.min().to_string());
    record.push(flow.fwd.iat.sum().to_string());
    record.push(flow.fwd.iat.mean().to_string());
    record.push(flow.fwd.iat.std().to_string());
    record.push(flow.fwd.iat.max().to_string());
    record.push(flow.fwd.iat.min().to_string());
    record.push(flow.bwd.iat.sum().to_string());
    record.push(flow.bwd.iat.mean().to_string());
    record.push(flow.bwd.iat.std().to_string());
    record.push(flow.bwd.iat.max().to_string());
    record.push(flow.bwd.iat.min().to_string());

    // directional flags and header totals
    record.push(flow.fwd.psh_count.to_string());
    record.push(flow.bwd.psh_count.to_string());
    record.push(flow.fwd.urg_count.to_string());
    record.push(flow.bwd.urg_count.to_string());
    record.push(flow.fwd.header_bytes.to_string());
    record.push(flow.bwd.header_bytes.to_string());
    record.push(flow.fwd_pkts_per_sec().to_string());
    record.push(flow.bwd_pkts_per_sec().to_string());

    // whole-flow payload lengths
    record.push(flow.pkt_len.min().to_string());
    record.push(flow.pkt_len.max().to_string());
    record.push(flow.pkt_len.mean().to_string());
    record.push(flow.pkt_len.std().to_string());
    record.push(flow.pkt_len.variance().to_string());

    // flag tallies
    record.push(flow.flags.fin.to_string());
    record.push(flow.flags.syn.to_string());
    record.push(flow.flags.rst.to_string());
    record.push(flow.flags.psh.to_string());
    record.push(flow.flags.ack.to_string());
    record.push(flow.flags.urg.to_string());
    record.push(flow.flags.cwr.to_string());
    record.push(flow.flags.ece.to_string());

    // size ratios
    record.push(flow.down_up_ratio().to_string());
    record.push(flow.avg_pkt_size().to_string());
    record.push(flow.fwd_avg_segment_size().to_string());
    record.push(flow.bwd_avg_segment_size().to_string());

    // bulk transfers
    record.push(flow.fwd.bulk.avg_bytes_per_bulk().to_string());
    record.push(flow.fwd.bulk.avg_packets_per_bulk().to_string());
    record.push(flow.fwd.bulk.avg_bulk_rate().to_string());
    record.push(flow.bwd.bulk.avg_bytes_per_bulk().to_string());
    record.push(flow.bwd.bulk.avg_packets_per_bulk().to_string());
    record.push(flow.bwd.bulk.avg_bulk_rate().to_string());

    // sub-flows
    record.push(flow.subflow_fwd_packets().to_string());
    record.push(flow.subflow_fwd_bytes().to_string());
    record.push(flow.subflow_bwd_packets().to_string());
    record.push(flow.subflow_bwd_bytes().to_string());

    // TCP extras
    record.push(flow.init_win_fwd.to_string());
    record.push(flow.init_win_bwd.to_string());
    record.push(flow.act_data_pkt_fwd.to_string());
    record.push(flow.min_seg_size_fwd.to_string());

    // active and idle periods
    record.push(flow.active.mean().to_string());
    record.push(flow.active.std().to_string());
    record.push(flow.active.max().to_string());
    record.push(flow.active.min().to_string());
    record.push(flow.idle.mean().to_string());
    record.push(flow.idle.std().to_string());
    record.push(flow.idle.max().to_string());
    record.push(flow.idle.min().to_string());

    record.push(flow.label.clone());

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowtrack::pdu::PacketMeta;
    use crate::protocols::packet::tcp::ACK;
    use std::net::SocketAddr;

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

    fn field<'a>(record: &'a [String], name: &str) -> &'a str {
        let idx = FEATURE_COLUMNS.iter().position(|c| *c == name).unwrap();
        &record[idx]
    }

    #[test]
    fn core_features_schema_shape() {
        assert_eq!(FEATURE_COLUMNS.len(), 84);
        assert_eq!(FEATURE_COLUMNS[0], "Flow ID");
        assert_eq!(FEATURE_COLUMNS[83], "Label");
        assert!(header_line().starts_with("Flow ID,Src IP,Src Port"));
        assert!(header_line().ends_with("Idle Max,Idle Min,Label"));
    }

    #[test]
    fn core_features_record_matches_schema_len() {
        let flow = Flow::new(&meta("10.0.0.1:1111", "10.0.0.2:80", 0, 0, ACK));
        assert_eq!(flow_record(&flow).len(), FEATURE_COLUMNS.len());
    }

    #[test]
    fn core_features_minimal_bidirectional_flow() {
        let mut flow = Flow::new(&meta("10.0.0.1:1111", "10.0.0.2:80", 1_000_000, 0, ACK));
        flow.ingest(&meta("10.0.0.2:80", "10.0.0.1:1111", 2_000_000, 0, ACK));
        let record = flow_record(&flow);

        assert_eq!(field(&record, "Flow ID"), "10.0.0.1-10.0.0.2-1111-80-6");
        assert_eq!(field(&record, "Src IP"), "10.0.0.1");
        assert_eq!(field(&record, "Dst Port"), "80");
        assert_eq!(field(&record, "Protocol"), "6");
        assert_eq!(field(&record, "Timestamp"), "1000000");
        assert_eq!(field(&record, "Flow Duration"), "1000000");
        assert_eq!(field(&record, "Tot Fwd Pkts"), "1");
        assert_eq!(field(&record, "Tot Bwd Pkts"), "1");
        assert_eq!(field(&record, "Flow IAT Mean"), "1000000");
        assert_eq!(field(&record, "ACK Flag Cnt"), "2");
        assert_eq!(field(&record, "Down/Up Ratio"), "1");
        assert_eq!(field(&record, "Label"), "UNKNOWN");
    }

    #[test]
    fn core_features_singleton_zeroes() {
        let flow = Flow::new(&meta("10.0.0.1:1111", "10.0.0.2:80", 5_000_000, 0, ACK));
        let record = flow_record(&flow);
        for name in [
            "Flow Duration",
            "Flow IAT Mean",
            "Fwd IAT Tot",
            "Bwd IAT Mean",
            "Flow Byts/s",
            "Flow Pkts/s",
            "Fwd Byts/b Avg",
            "Bwd Blk Rate Avg",
            "Active Mean",
            "Active Max",
            "Idle Mean",
            "Idle Max",
            "Subflow Fwd Pkts",
        ] {
            assert_eq!(field(&record, name), "0", "column {}", name);
        }
        assert_eq!(field(&record, "Tot Fwd Pkts"), "1");
    }

    #[test]
    fn core_features_payload_stats() {
        let mut flow = Flow::new(&meta("10.0.0.1:1111", "10.0.0.2:80", 0, 100, ACK));
        flow.ingest(&meta("10.0.0.1:1111", "10.0.0.2:80", 1_000, 300, ACK));
        let record = flow_record(&flow);
        assert_eq!(field(&record, "TotLen Fwd Pkts"), "400");
        assert_eq!(field(&record, "Fwd Pkt Len Max"), "300");
        assert_eq!(field(&record, "Fwd Pkt Len Min"), "100");
        assert_eq!(field(&record, "Fwd Pkt Len Mean"), "200");
        assert_eq!(field(&record, "Pkt Len Var"), "10000");
        assert_eq!(field(&record, "Pkt Size Avg"), "200");
        assert_eq!(field(&record, "Fwd Seg Size Avg"), "200");
        assert_eq!(field(&record, "Fwd Act Data Pkts"), "2");
        assert_eq!(field(&record, "Fwd Seg Size Min"), "20");
        assert_eq!(field(&record, "Init Fwd Win Byts"), "1024");
    }
}
