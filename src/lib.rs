//! Reconstructs HTTP transactions from an offline pcap trace.
//!
//! The pipeline (spec.md §2): frame decode → packet dispatch → TCP
//! reassembly / DNS tracking → HTTP framing → flow analysis → session
//! assembly → entry timing. [`reconstruct`] drives the whole thing over an
//! iterator of raw frames and returns a [`session::HttpSession`] plus every
//! accumulated [`error::ErrorRecord`]; turning that session into a HAR
//! document is left to an external serializer (spec.md §1).

pub mod config;
pub mod dispatcher;
pub mod dns;
pub mod error;
pub mod frame;
pub mod http;
pub mod model;
pub mod page;
pub mod session;
pub mod tcp;
pub mod udp;
pub mod utils;

use config::Config;
use dispatcher::PacketDispatcher;
use error::ErrorRecord;
use frame::LinkType;
use page::PageTracker;
use session::HttpSession;

/// One frame as read off the wire: its capture timestamp and raw bytes.
/// `caplen`/`wirelen` let the frame decoder flag a truncated capture before
/// attempting to parse it (spec.md §4.1).
pub struct RawFrame {
    pub ts: f64,
    pub wirelen: usize,
    pub data: Vec<u8>,
}

/// Runs the full pipeline over `frames` and returns the assembled session
/// alongside every error recorded along the way.
pub fn reconstruct(
    frames: impl IntoIterator<Item = RawFrame>,
    link_type: LinkType,
    config: &Config,
    page_tracker: &mut dyn PageTracker,
) -> (HttpSession, Vec<ErrorRecord>) {
    let mut dispatcher = PacketDispatcher::new(config.max_buffer_bytes);
    let mut errors = Vec::new();

    for (i, frame) in frames.into_iter().enumerate() {
        let frame_index = i as u64 + 1; // 1-based, matching Wireshark's frame numbers
        if frame.wirelen != frame.data.len() {
            errors.push(ErrorRecord::new(Some(frame_index), "capture", error::ParseError::IncompletePacket));
            continue;
        }
        match frame::decode_frame(frame.ts, &frame.data, link_type) {
            Ok(Some(datagram)) => dispatcher.add(frame_index, &datagram),
            Ok(None) => {}
            Err(e) => errors.push(ErrorRecord::new(Some(frame_index), "frame", e)),
        }
    }

    let dispatcher_result = dispatcher.finish();
    errors.extend(dispatcher_result.errors);

    let (session, session_errors) = HttpSession::build(dispatcher_result.flows, dispatcher_result.queries, config, page_tracker);
    errors.extend(session_errors);

    (session, errors)
}
