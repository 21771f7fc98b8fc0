//! Offline analysis runtime.
//!
//! Drives the whole pipeline: reads frames from the capture file, normalizes them into packet
//! records, routes them through the [`FlowTracker`], and streams every finished flow into the CSV
//! sink. Remaining flows are drained unconditionally at end-of-input. The core never blocks on
//! I/O; all file handles live here.

use crate::config::RuntimeConfig;
use crate::features;
use crate::flowtrack::flow::Flow;
use crate::flowtrack::pdu::PacketMeta;
use crate::flowtrack::{FlowTracker, TrackerConfig};
use crate::labels::LabelSet;
use crate::memory::mbuf::Mbuf;

use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use anyhow::{Context, Result};
use pcap::Capture;

/// Offline capture-to-CSV runtime.
pub struct OfflineRuntime {
    config: RuntimeConfig,
    labels: Option<LabelSet>,
}

impl OfflineRuntime {
    /// Creates a runtime from `config`, loading the label file if one is configured.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let labels = match &config.labels {
            Some(path) => {
                let labels = LabelSet::from_file(path)?;
                log::info!("Loaded {} benign flow ids from {}", labels.len(), path);
                Some(labels)
            }
            None => None,
        };
        Ok(OfflineRuntime { config, labels })
    }

    /// Processes the configured capture and writes the feature table.
    pub fn run(&self) -> Result<()> {
        log::info!(
            "Launched offline analysis. Processing pcap: {}",
            self.config.pcap
        );
        let start = Instant::now();

        let mut cap = Capture::from_file(&self.config.pcap)
            .with_context(|| format!("Error opening pcap {}", self.config.pcap))?;
        let csv_file = File::create(&self.config.csv)
            .with_context(|| format!("Error opening CSV file {}", self.config.csv))?;
        let mut wtr = csv::Writer::from_writer(BufWriter::new(csv_file));
        wtr.write_record(features::FEATURE_COLUMNS)
            .context("Error writing CSV header")?;

        let mut tracker = FlowTracker::new(TrackerConfig::from(&self.config.flowtrack));

        let mut nb_pkts: u64 = 0;
        let mut nb_bytes: u64 = 0;
        let mut nb_dropped: u64 = 0;

        let labels = self.labels.as_ref();
        let mut write_err: Option<csv::Error> = None;
        let mut emit = |mut flow: Flow| {
            if let Some(labels) = labels {
                flow.label = labels.label_for(&flow.five_tuple).to_string();
            }
            if write_err.is_none() {
                if let Err(err) = wtr.write_record(features::flow_record(&flow)) {
                    write_err = Some(err);
                }
            }
        };

        while let Ok(frame) = cap.next() {
            if frame.header.len as usize > self.config.mtu {
                continue;
            }
            let ts = frame.header.ts.tv_sec as u64 * 1_000_000 + frame.header.ts.tv_usec as u64;
            let mbuf = Mbuf::from_bytes(frame.data);
            nb_pkts += 1;
            nb_bytes += mbuf.data_len() as u64;

            // malformed and unsupported packets are dropped silently
            match PacketMeta::new(&mbuf, ts, self.config.parse_ipv6) {
                Ok(meta) => tracker.process(&meta, &mut emit),
                Err(_) => nb_dropped += 1,
            }
        }

        // deliver whatever is still open
        tracker.drain(&mut emit);
        drop(emit);
        wtr.flush().context("Error flushing CSV output")?;
        if let Some(err) = write_err {
            return Err(err).context("Error writing CSV record");
        }

        log::info!(
            "Processed: {} pkts, {} bytes, {} dropped",
            nb_pkts,
            nb_bytes,
            nb_dropped
        );
        log::info!(
            "Emitted {} flows ({} singleton flows suppressed at timeout) in {:?}",
            tracker.finished_count(),
            tracker.suppressed_count(),
            start.elapsed()
        );
        Ok(())
    }
}
