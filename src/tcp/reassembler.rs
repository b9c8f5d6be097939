//! Component C: TCP reassembler. Groups segments into flows keyed by the
//! 4-tuple and drives per-direction reassembly (spec.md §4.3).

use std::collections::HashMap;

use etherparse::TcpHeaderSlice;
use log::{trace, warn};

use crate::error::{ErrorRecord, ParseError};
use crate::frame::IpDatagram;
use crate::tcp::direction::SegmentOutcome;
use crate::tcp::endpoint::{Endpoint, FlowKey};
use crate::tcp::flow::TcpFlow;
use crate::utils::tcp_flags_to_string;

pub struct TcpReassembler {
    flows: HashMap<FlowKey, TcpFlow>,
    dropped: Vec<FlowKey>,
    max_buffer_bytes: usize,
    errors: Vec<ErrorRecord>,
}

impl TcpReassembler {
    pub fn new(max_buffer_bytes: usize) -> Self {
        TcpReassembler {
            flows: HashMap::new(),
            dropped: Vec::new(),
            max_buffer_bytes,
            errors: Vec::new(),
        }
    }

    /// Parses the TCP header out of an IP datagram's payload and feeds it
    /// into the relevant flow's reassembly state.
    pub fn process(&mut self, frame_index: u64, datagram: &IpDatagram) {
        let tcp = match TcpHeaderSlice::from_slice(&datagram.payload) {
            Ok(tcp) => tcp,
            Err(e) => {
                self.errors.push(ErrorRecord::new(
                    Some(frame_index),
                    "tcp header",
                    ParseError::FrameDecode(format!("tcp header: {e}")),
                ));
                return;
            }
        };
        let data_offset = tcp.data_offset() as usize * 4;
        if data_offset > datagram.payload.len() {
            self.errors.push(ErrorRecord::new(
                Some(frame_index),
                "tcp header",
                ParseError::FrameDecode("tcp data offset exceeds payload".into()),
            ));
            return;
        }
        let payload = &datagram.payload[data_offset..];
        let src = Endpoint::new(datagram.src, tcp.source_port());
        let dst = Endpoint::new(datagram.dst, tcp.destination_port());
        let key = FlowKey::new(src, dst);

        if self.dropped.contains(&key) {
            return;
        }

        let flow = self
            .flows
            .entry(key)
            .or_insert_with(|| TcpFlow::new(key, src, dst));

        if flow.direction(src).closed {
            self.errors.push(ErrorRecord::new(
                Some(frame_index),
                format!("flow {:?}", key),
                ParseError::TcpAnomaly("segment received on closed direction".into()),
            ));
            return;
        }

        if tcp.rst() {
            flow.reset = true;
            flow.force_close();
            return;
        }

        trace!("tcp: {} {:?} -> {:?} seq={} len={}", tcp_flags_to_string(&tcp), src, dst, tcp.sequence_number(), payload.len());

        let dir = flow.direction_mut(src);
        let outcome = dir.on_segment(datagram.ts, tcp.sequence_number(), payload, tcp.syn(), self.max_buffer_bytes);
        if tcp.fin() {
            dir.closed = true;
        }

        if let SegmentOutcome::BufferOverflow = outcome {
            warn!("tcp: abandoning flow {:?}, buffer cap exceeded", key);
            self.errors.push(ErrorRecord::new(
                Some(frame_index),
                format!("flow {:?}", key),
                ParseError::TcpAnomaly("per-direction buffer cap exceeded, flow abandoned".into()),
            ));
            self.flows.remove(&key);
            self.dropped.push(key);
        }
    }

    /// Flushes pending flows unconditionally (end-of-input).
    pub fn finish(mut self) -> (Vec<TcpFlow>, Vec<ErrorRecord>) {
        for flow in self.flows.values_mut() {
            flow.force_close();
        }
        (self.flows.into_values().collect(), self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::IpProtocol;
    use std::net::Ipv4Addr;

    fn tcp_segment(
        ts: f64,
        src: (Ipv4Addr, u16),
        dst: (Ipv4Addr, u16),
        seq: u32,
        flags: (bool, bool, bool), // syn, fin, rst
        payload: &[u8],
    ) -> IpDatagram {
        let mut h = vec![0u8; 20];
        h[0..2].copy_from_slice(&src.1.to_be_bytes());
        h[2..4].copy_from_slice(&dst.1.to_be_bytes());
        h[4..8].copy_from_slice(&seq.to_be_bytes());
        h[12] = 5 << 4; // data offset, no options
        let (syn, fin, rst) = flags;
        let mut flag_byte = 0u8;
        if fin {
            flag_byte |= 0x01;
        }
        if syn {
            flag_byte |= 0x02;
        }
        if rst {
            flag_byte |= 0x04;
        }
        h[13] = flag_byte;
        h[14..16].copy_from_slice(&4096u16.to_be_bytes()); // window
        h.extend_from_slice(payload);
        IpDatagram {
            ts,
            src: src.0,
            dst: dst.0,
            protocol: IpProtocol::Tcp,
            payload: h,
        }
    }

    #[test]
    fn single_flow_reassembles_both_directions() {
        let client = (Ipv4Addr::new(10, 0, 0, 1), 4000);
        let server = (Ipv4Addr::new(10, 0, 0, 2), 80);
        let mut r = TcpReassembler::new(1 << 20);
        r.process(1, &tcp_segment(0.0, client, server, 100, (true, false, false), b""));
        r.process(2, &tcp_segment(0.1, server, client, 900, (true, false, false), b""));
        r.process(3, &tcp_segment(0.2, client, server, 101, (false, false, false), b"GET / HTTP/1.1\r\n\r\n"));
        r.process(4, &tcp_segment(0.3, server, client, 901, (false, false, false), b"HTTP/1.1 200 OK\r\n\r\n"));
        r.process(5, &tcp_segment(0.4, client, server, 120, (false, true, false), b""));
        r.process(6, &tcp_segment(0.5, server, client, 921, (false, true, false), b""));

        let (flows, errors) = r.finish();
        assert!(errors.is_empty());
        assert_eq!(flows.len(), 1);
        let flow = &flows[0];
        assert_eq!(flow.fwd.data, b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(flow.rev.data, b"HTTP/1.1 200 OK\r\n\r\n");
        assert!(flow.is_closed());
    }

    #[test]
    fn rst_closes_both_directions_and_marks_reset() {
        let client = (Ipv4Addr::new(10, 0, 0, 1), 4000);
        let server = (Ipv4Addr::new(10, 0, 0, 2), 80);
        let mut r = TcpReassembler::new(1 << 20);
        r.process(1, &tcp_segment(0.0, client, server, 100, (true, false, false), b""));
        r.process(2, &tcp_segment(0.1, client, server, 101, (false, false, true), b""));
        let (flows, _) = r.finish();
        assert!(flows[0].reset);
        assert!(flows[0].is_closed());
    }

    #[test]
    fn overflowing_direction_drops_the_whole_flow() {
        let client = (Ipv4Addr::new(10, 0, 0, 1), 4000);
        let server = (Ipv4Addr::new(10, 0, 0, 2), 80);
        let mut r = TcpReassembler::new(4);
        r.process(1, &tcp_segment(0.0, client, server, 100, (true, false, false), b""));
        // Out-of-order segment with a gap before it, bigger than the cap.
        r.process(2, &tcp_segment(0.1, client, server, 200, (false, false, false), b"12345"));
        let (flows, errors) = r.finish();
        assert!(flows.is_empty());
        assert_eq!(errors.len(), 1);
    }
}
