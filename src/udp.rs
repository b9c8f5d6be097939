//! Thin UDP header reader, used only to find the DNS (port 53) traffic
//! the packet dispatcher hands to the [`crate::dns`] tracker.

use etherparse::UdpHeaderSlice;

use crate::error::ParseError;

pub struct UdpSegment<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: &'a [u8],
}

pub fn parse_udp(payload: &[u8]) -> Result<UdpSegment<'_>, ParseError> {
    let udp = UdpHeaderSlice::from_slice(payload)
        .map_err(|e| ParseError::FrameDecode(format!("udp header: {e}")))?;
    Ok(UdpSegment {
        src_port: udp.source_port(),
        dst_port: udp.destination_port(),
        payload: &payload[8..],
    })
}
