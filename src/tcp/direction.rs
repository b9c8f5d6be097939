//! One half of a [`crate::tcp::flow::TcpFlow`]: an ordered byte stream
//! reconstructed from segments, per spec.md §4.3.

use std::collections::BTreeMap;
use std::num::Wrapping;

use log::{trace, warn};

/// A contiguous run appended to `data` in one shot, with the timestamp of
/// the segment that contributed it. Runs are pushed in append order, which
/// is also ascending-offset order, so `arrival_time` can binary search.
#[derive(Debug, Clone, Copy)]
struct Run {
    start: u64,
    end: u64,
    ts: f64,
}

#[derive(Debug, Clone)]
pub struct TcpDirection {
    pub data: Vec<u8>,
    runs: Vec<Run>,
    /// Sequence number (relative to `isn`) expected next.
    expected_rel: u64,
    /// Absolute sequence number of the first data byte (SYN's ISN + 1, or
    /// the first data segment's own sequence number if SYN was missed).
    isn: Option<u32>,
    /// Timestamp of the first segment ever seen on this direction: the
    /// client's SYN / the server's SYN-ACK, or the first byte if missed.
    pub first_ts: Option<f64>,
    /// Segments that arrived ahead of a gap, keyed by relative start offset.
    pending: BTreeMap<u64, (f64, Vec<u8>)>,
    pending_bytes: usize,
    pub closed: bool,
    pub window_scale: u16,
}

pub enum SegmentOutcome {
    Ok,
    /// Buffering this segment would exceed the per-direction cap; the
    /// caller should abandon the whole flow.
    BufferOverflow,
}

impl TcpDirection {
    pub fn new() -> Self {
        TcpDirection {
            data: Vec::new(),
            runs: Vec::new(),
            expected_rel: 0,
            isn: None,
            first_ts: None,
            pending: BTreeMap::new(),
            pending_bytes: 0,
            closed: false,
            window_scale: 1,
        }
    }

    /// The timestamp of the segment that contributed the byte at `offset`.
    /// Offsets past the end of `data` return the last known timestamp.
    pub fn arrival_time(&self, offset: usize) -> Option<f64> {
        if self.runs.is_empty() {
            return None;
        }
        let offset = offset as u64;
        let idx = self.runs.partition_point(|r| r.end <= offset);
        self.runs.get(idx).map(|r| r.ts).or_else(|| self.runs.last().map(|r| r.ts))
    }

    /// Processes one segment. `seq` is the TCP header's own sequence
    /// number; `is_syn` tells us whether it consumes one sequence number
    /// ahead of the payload.
    pub fn on_segment(&mut self, ts: f64, seq: u32, payload: &[u8], is_syn: bool, max_buffer_bytes: usize) -> SegmentOutcome {
        let payload_seq = if is_syn { seq.wrapping_add(1) } else { seq };
        if self.isn.is_none() {
            self.isn = Some(payload_seq);
            self.first_ts = Some(ts);
        }
        if payload.is_empty() {
            return SegmentOutcome::Ok;
        }
        let isn = self.isn.unwrap();
        let rel_start = (Wrapping(payload_seq) - Wrapping(isn)).0 as u64;
        let rel_end = rel_start + payload.len() as u64;

        if rel_end <= self.expected_rel {
            trace!("tcp: discarding fully-retransmitted segment at rel {}..{}", rel_start, rel_end);
            return SegmentOutcome::Ok;
        }

        let (start, bytes): (u64, &[u8]) = if rel_start < self.expected_rel {
            let trim = (self.expected_rel - rel_start) as usize;
            (self.expected_rel, &payload[trim..])
        } else {
            (rel_start, payload)
        };

        if start == self.expected_rel {
            self.append(start, bytes, ts);
            self.expected_rel += bytes.len() as u64;
            self.drain_pending();
        } else {
            if self.pending_bytes + bytes.len() > max_buffer_bytes {
                warn!("tcp: per-direction buffer cap exceeded ({} + {} > {})", self.pending_bytes, bytes.len(), max_buffer_bytes);
                return SegmentOutcome::BufferOverflow;
            }
            self.pending_bytes += bytes.len();
            self.pending.insert(start, (ts, bytes.to_vec()));
        }
        SegmentOutcome::Ok
    }

    fn append(&mut self, start: u64, bytes: &[u8], ts: f64) {
        let run_start = start;
        self.data.extend_from_slice(bytes);
        let run_end = run_start + bytes.len() as u64;
        self.runs.push(Run { start: run_start, end: run_end, ts });
    }

    fn drain_pending(&mut self) {
        loop {
            let Some((&key, _)) = self.pending.iter().next() else { break };
            if key > self.expected_rel {
                break;
            }
            let (ts, bytes) = self.pending.remove(&key).unwrap();
            self.pending_bytes -= bytes.len();
            if key + (bytes.len() as u64) <= self.expected_rel {
                // fully superseded by data appended in the meantime
                continue;
            }
            let trim = (self.expected_rel - key) as usize;
            let bytes = &bytes[trim..];
            self.append(self.expected_rel, bytes, ts);
            self.expected_rel += bytes.len() as u64;
        }
    }
}

impl Default for TcpDirection {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_arrival_time_over_in_order_segments() {
        let mut dir = TcpDirection::new();
        dir.on_segment(0.0, 100, b"hello", true, 1 << 20);
        dir.on_segment(0.1, 106, b"world", false, 1 << 20);
        assert_eq!(dir.data, b"helloworld");
        assert!(dir.arrival_time(0).unwrap() <= dir.arrival_time(9).unwrap());
    }

    #[test]
    fn out_of_order_delivery_reassembles_in_sequence_order() {
        let mut dir = TcpDirection::new();
        // SYN first, ISN = 99 so first data byte is at seq 100.
        dir.on_segment(0.0, 99, b"", true, 1 << 20);
        // "world" (seq 105) arrives before "hello" (seq 100): out of order.
        dir.on_segment(0.2, 105, b"world", false, 1 << 20);
        dir.on_segment(0.1, 100, b"hello", false, 1 << 20);
        assert_eq!(dir.data, b"helloworld");
        assert_eq!(dir.arrival_time(0), Some(0.1));
        assert_eq!(dir.arrival_time(5), Some(0.2));
    }

    #[test]
    fn exact_retransmission_contributes_once() {
        let mut dir = TcpDirection::new();
        dir.on_segment(0.0, 100, b"hello", true, 1 << 20);
        dir.on_segment(0.1, 101, b"hello", false, 1 << 20); // identical range retransmitted
        assert_eq!(dir.data, b"hello");
    }

    #[test]
    fn overlapping_segment_is_trimmed_to_unseen_suffix() {
        let mut dir = TcpDirection::new();
        dir.on_segment(0.0, 100, b"hello", true, 1 << 20);
        dir.on_segment(0.1, 104, b"loworld", false, 1 << 20); // overlaps last byte of "hello"
        assert_eq!(dir.data, b"helloworld");
    }

    #[test]
    fn missing_syn_uses_first_data_segment_as_isn() {
        let mut dir = TcpDirection::new();
        dir.on_segment(5.0, 500, b"abc", false, 1 << 20);
        assert_eq!(dir.first_ts, Some(5.0));
        assert_eq!(dir.data, b"abc");
    }

    #[test]
    fn buffer_cap_overflow_is_reported() {
        let mut dir = TcpDirection::new();
        dir.on_segment(0.0, 100, b"", true, 4);
        let outcome = dir.on_segment(0.1, 200, b"12345", false, 4);
        assert!(matches!(outcome, SegmentOutcome::BufferOverflow));
    }
}
