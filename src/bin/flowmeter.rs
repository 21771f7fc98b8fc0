use flowmeter::config::RuntimeConfig;
use flowmeter::runtime::OfflineRuntime;

use std::process;

use anyhow::{bail, Result};
use clap::{ErrorKind, Parser};

/// Default per-protocol flow timeout for the command line, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

const USAGE_HINT: &str = "\
Timeout overrides can be chained after the positional arguments, e.g.
    flowmeter capture.pcap flows.csv tcp -t 30 udp -t 60
    flowmeter capture.pcap flows.csv benign.txt tcp --timeout 120";

// Define command-line arguments.
#[derive(Parser, Debug)]
#[clap(
    name = "flowmeter",
    about = "Extracts per-flow statistical features from a packet capture into a CSV table",
    after_help = USAGE_HINT
)]
struct Args {
    /// Input capture file.
    #[clap(value_name = "PCAP")]
    pcap: String,
    /// Output CSV file.
    #[clap(value_name = "CSV")]
    csv: String,
    /// Optional benign-label file, then `tcp -t <seconds>` and/or `udp -t <seconds>`
    /// segments overriding the per-protocol flow timeout (default 600 s each).
    #[clap(value_name = "LABELS|TIMEOUTS", multiple_values = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

/// Parsed trailing arguments: label file path and per-protocol timeouts in seconds.
#[derive(Debug, PartialEq, Eq)]
struct TrailingArgs {
    labels: Option<String>,
    tcp_timeout: u64,
    udp_timeout: u64,
}

/// Parses `[label] [tcp -t N] [udp -t N]...` trailing segments. Later segments override earlier
/// ones for the same protocol.
fn parse_trailing(tokens: &[String]) -> Result<TrailingArgs> {
    let mut parsed = TrailingArgs {
        labels: None,
        tcp_timeout: DEFAULT_TIMEOUT_SECS,
        udp_timeout: DEFAULT_TIMEOUT_SECS,
    };

    let mut i = 0;
    if let Some(first) = tokens.first() {
        if first != "tcp" && first != "udp" {
            parsed.labels = Some(first.clone());
            i = 1;
        }
    }

    while i < tokens.len() {
        let command = tokens[i].as_str();
        if command != "tcp" && command != "udp" {
            bail!("unknown command or argument '{}'\n{}", command, USAGE_HINT);
        }
        let flag = tokens
            .get(i + 1)
            .ok_or_else(|| anyhow::anyhow!("missing -t after '{}'\n{}", command, USAGE_HINT))?;
        if flag != "-t" && flag != "--timeout" {
            bail!("unknown flag '{}' after '{}'\n{}", flag, command, USAGE_HINT);
        }
        let value = tokens
            .get(i + 2)
            .ok_or_else(|| anyhow::anyhow!("missing value after '{}'\n{}", flag, USAGE_HINT))?;
        let seconds: u64 = value
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timeout value '{}'\n{}", value, USAGE_HINT))?;
        match command {
            "tcp" => parsed.tcp_timeout = seconds,
            _ => parsed.udp_timeout = seconds,
        }
        i += 3;
    }
    Ok(parsed)
}

fn run(args: Args) -> Result<()> {
    let trailing = parse_trailing(&args.rest)?;
    let mut config = RuntimeConfig::default();
    config.pcap = args.pcap;
    config.csv = args.csv;
    config.labels = trailing.labels;
    config.flowtrack.tcp_flow_timeout = trailing.tcp_timeout;
    config.flowtrack.udp_flow_timeout = trailing.udp_timeout;

    let runtime = OfflineRuntime::new(config)?;
    runtime.run()
}

fn main() {
    env_logger::init();
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            err.print().ok();
            process::exit(code);
        }
    };
    if let Err(err) = run(args) {
        eprintln!("Error: {:#}", err);
        process::exit(1);
    }
}
