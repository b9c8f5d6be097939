use std::path::PathBuf;

use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use pcap::Capture;

use pcaphar::config::Config;
use pcaphar::error::{ErrorRecord, ParseError};
use pcaphar::frame::LinkType;
use pcaphar::model::HarLog;
use pcaphar::page::NullPageTracker;
use pcaphar::{reconstruct, RawFrame};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Pcap file to read (offline only; no live capture).
    path: PathBuf,
    /// Drop response bodies, keeping only their byte counts.
    #[clap(long)]
    drop_bodies: bool,
    /// Retain requests that never received a response.
    #[clap(long)]
    keep_unfulfilled: bool,
    /// Per-direction buffered-bytes cap before a flow is abandoned.
    #[clap(long, value_parser, default_value_t = 16 * 1024 * 1024)]
    max_buffer_bytes: usize,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    info!("Opening capture file {:?}", args.path);

    let mut cap = match Capture::from_file(&args.path) {
        Ok(cap) => cap,
        Err(e) => {
            eprintln!("failed to open {:?}: {}", args.path, e);
            std::process::exit(1);
        }
    };

    let link_type = match LinkType::from_dlt(cap.get_datalink().0) {
        Some(lt) => lt,
        None => {
            eprintln!("unsupported link-layer type {:?} (only Ethernet and Linux SLL are supported)", cap.get_datalink());
            std::process::exit(1);
        }
    };

    let mut frames = Vec::new();
    let mut capture_errors = Vec::new();
    loop {
        match cap.next() {
            Ok(packet) => frames.push(RawFrame {
                ts: packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1_000_000.0,
                wirelen: packet.header.len as usize,
                data: packet.data.to_vec(),
            }),
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                warn!("capture ended unexpectedly: {e}");
                capture_errors.push(ErrorRecord::new(None, "capture", ParseError::EndOfInputTruncation));
                break;
            }
        }
    }
    info!("Read {} frames from capture", frames.len());

    let config = Config {
        drop_response_bodies: args.drop_bodies,
        process_pages: false,
        keep_unfulfilled_requests: args.keep_unfulfilled,
        max_buffer_bytes: args.max_buffer_bytes,
    };
    let mut page_tracker = NullPageTracker;

    let (session, mut errors) = reconstruct(frames, link_type, &config, &mut page_tracker);
    errors.extend(capture_errors);

    info!("Reconstructed {} HTTP entries across the trace", session.entries.len());
    if let Some(ua) = session.user_agents.dominant() {
        info!("Dominant user agent: {}", ua);
    }
    for error in &errors {
        warn!("{:?}: {}", error.context, error.error);
    }
    info!("{} errors recorded", errors.len());

    let har = HarLog::from(&session);
    match serde_json::to_string_pretty(&har) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to render HAR document: {e}"),
    }
}
