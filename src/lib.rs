//! Per-flow statistical feature extraction from packet captures.
//!
//! Flowmeter reads an offline packet capture, reassembles TCP and UDP packets
//! into bidirectional flows keyed by their 5-tuple, and emits one CSV row per
//! flow containing ~80 numeric descriptors of packet sizes, inter-arrival
//! timing, TCP flag counts, bulk-transfer behavior, and sub-flow
//! activity/idle periods, plus a label. The output schema matches the
//! 84-column format commonly used for traffic classification datasets.
//!
//! A flow ends on an idle/total timeout, a completed FIN handshake from both
//! sides, an RST, or end of input. All timeouts are measured in packet
//! timestamp space (microseconds), so a given capture always produces the
//! same output.
//!
//! The following example meters a capture and writes the feature table to a
//! CSV file:
//!
//! ```no_run
//! use flowmeter::config::RuntimeConfig;
//! use flowmeter::runtime::OfflineRuntime;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut config = RuntimeConfig::default();
//!     config.pcap = "traces/smallFlows.pcap".to_string();
//!     config.csv = "flows.csv".to_string();
//!     let runtime = OfflineRuntime::new(config)?;
//!     runtime.run()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod features;
pub mod flowtrack;
pub mod labels;
pub mod memory;
pub mod protocols;
pub mod runtime;
pub mod stats;
pub mod utils;

pub use self::flowtrack::flow::Flow;
pub use self::flowtrack::flow_id::{FiveTuple, FlowId};
pub use self::flowtrack::pdu::PacketMeta;
pub use self::flowtrack::{FlowTracker, TrackerConfig};
pub use self::memory::mbuf::Mbuf;
pub use self::runtime::OfflineRuntime;

#[macro_use]
extern crate lazy_static;
