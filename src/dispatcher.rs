//! Component B: packet dispatcher. Routes each decoded [`IpDatagram`] to the
//! TCP reassembler or the DNS tracker by protocol and port (spec.md §4.2).

use crate::dns::DnsTracker;
use crate::error::ErrorRecord;
use crate::frame::{IpDatagram, IpProtocol};
use crate::tcp::{Endpoint, FlowKey, TcpReassembler};
use crate::udp;

const DNS_PORT: u16 = 53;

pub struct PacketDispatcher {
    tcp: TcpReassembler,
    dns: DnsTracker,
    errors: Vec<ErrorRecord>,
}

impl PacketDispatcher {
    pub fn new(max_buffer_bytes: usize) -> Self {
        PacketDispatcher {
            tcp: TcpReassembler::new(max_buffer_bytes),
            dns: DnsTracker::new(),
            errors: Vec::new(),
        }
    }

    pub fn add(&mut self, frame_index: u64, datagram: &IpDatagram) {
        match datagram.protocol {
            IpProtocol::Tcp => self.tcp.process(frame_index, datagram),
            IpProtocol::Udp => {
                let segment = match udp::parse_udp(&datagram.payload) {
                    Ok(segment) => segment,
                    Err(e) => {
                        self.errors.push(ErrorRecord::new(Some(frame_index), "udp header", e));
                        return;
                    }
                };
                if segment.src_port == DNS_PORT || segment.dst_port == DNS_PORT {
                    let key = FlowKey::new(
                        Endpoint::new(datagram.src, segment.src_port),
                        Endpoint::new(datagram.dst, segment.dst_port),
                    );
                    self.dns.add(frame_index, datagram.ts, key, segment.payload, &mut self.errors);
                }
            }
        }
    }

    pub fn finish(self) -> DispatchResult {
        let (flows, mut tcp_errors) = self.tcp.finish();
        let (queries, mut dns_errors) = self.dns.finish();
        let mut errors = self.errors;
        errors.append(&mut tcp_errors);
        errors.append(&mut dns_errors);
        DispatchResult { flows, queries, errors }
    }
}

pub struct DispatchResult {
    pub flows: Vec<crate::tcp::TcpFlow>,
    pub queries: Vec<crate::dns::DnsQuery>,
    pub errors: Vec<ErrorRecord>,
}
