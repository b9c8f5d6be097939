//! Component A: frame decoder.
//!
//! Takes a raw captured frame plus its link-layer type and yields an
//! [`IpDatagram`] or nothing (non-IP frame, truncated frame). Treated by
//! the rest of the crate as the one place that knows about Ethernet/SLL and
//! IPv4 header shapes; everything downstream works in terms of `IpDatagram`.

use std::net::Ipv4Addr;

use etherparse::{Ethernet2HeaderSlice, Ipv4HeaderSlice, LinuxSllHeaderSlice};

use crate::error::ParseError;

/// Link-layer type of the capture, exposed separately from the per-frame
/// data as spec.md §6 requires (Ethernet is the default; 113 is Linux SLL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    LinuxSll,
}

impl LinkType {
    /// Maps a libpcap DLT_* value the way `pcap::Linktype` reports it.
    pub fn from_dlt(dlt: i32) -> Option<LinkType> {
        match dlt {
            1 => Some(LinkType::Ethernet),
            113 => Some(LinkType::LinuxSll),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    Tcp,
    Udp,
}

#[derive(Debug, Clone)]
pub struct IpDatagram {
    pub ts: f64,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub protocol: IpProtocol,
    /// The IP payload: the TCP segment or UDP datagram, header included.
    pub payload: Vec<u8>,
}

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const LINUX_SLL_HEADER_LEN: usize = 16;

/// Decodes one captured frame. Returns `Ok(None)` for frames that are not
/// IPv4 (not an error, just nothing for the dispatcher to route), and
/// `Err` for anything that looks truncated or malformed.
pub fn decode_frame(ts: f64, raw: &[u8], link_type: LinkType) -> Result<Option<IpDatagram>, ParseError> {
    let ip_slice = match link_type {
        LinkType::Ethernet => {
            let eth = Ethernet2HeaderSlice::from_slice(raw)
                .map_err(|e| ParseError::FrameDecode(format!("ethernet header: {e}")))?;
            if eth.ether_type() != ETHERTYPE_IPV4 {
                return Ok(None);
            }
            &raw[ETHERNET_HEADER_LEN..]
        }
        LinkType::LinuxSll => {
            let sll = LinuxSllHeaderSlice::from_slice(raw)
                .map_err(|e| ParseError::FrameDecode(format!("linux sll header: {e}")))?;
            if sll.protocol_type() != ETHERTYPE_IPV4 {
                return Ok(None);
            }
            &raw[LINUX_SLL_HEADER_LEN..]
        }
    };

    let ip = Ipv4HeaderSlice::from_slice(ip_slice)
        .map_err(|e| ParseError::FrameDecode(format!("ipv4 header: {e}")))?;
    let header_len = ip.ihl() as usize * 4;
    let total_len = ip.total_len() as usize;
    if total_len < header_len || ip_slice.len() < total_len {
        return Err(ParseError::FrameDecode("ipv4 total length exceeds captured data".into()));
    }
    let protocol = match ip.protocol() {
        6 => IpProtocol::Tcp,
        17 => IpProtocol::Udp,
        other => {
            return Err(ParseError::FrameDecode(format!("unsupported IP protocol {other}")));
        }
    };

    Ok(Some(IpDatagram {
        ts,
        src: ip.source_addr(),
        dst: ip.destination_addr(),
        protocol,
        payload: ip_slice[header_len..total_len].to_vec(),
    }))
}
