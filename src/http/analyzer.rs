//! Component E: flow analyzer (spec.md §4.5). Decides which TCP direction
//! carries requests, frames both directions, and pairs requests with
//! responses.

use crate::error::ParseError;
use crate::http::framer::{frame_requests, frame_responses};
use crate::http::message::{MessagePair, Request, Response};
use crate::tcp::flow::TcpFlow;

/// The two framed directions of an HTTP flow, request side first.
struct FramedFlow {
    requests: Vec<Request>,
    responses: Vec<Response>,
}

/// Tries `fwd` as requests / `rev` as responses, then the swap (spec.md
/// §4.5: "if either fails, try swapping"). Returns `None` (spec.md's "not
/// HTTP") if both orientations fail to frame at least one well-formed
/// message on either side.
fn analyze_orientation(flow: &TcpFlow, drop_bodies: bool) -> Option<FramedFlow> {
    let try_orientation = |req_data: &[u8], req_arrival: &dyn Fn(usize) -> Option<f64>, resp_data: &[u8], resp_arrival: &dyn Fn(usize) -> Option<f64>| {
        let (requests, req_err) = frame_requests(req_data, req_arrival, drop_bodies);
        if requests.is_empty() && req_err.is_some() {
            return None;
        }
        let (responses, resp_err) = frame_responses(resp_data, resp_arrival, drop_bodies);
        if responses.is_empty() && resp_err.is_some() {
            return None;
        }
        Some(FramedFlow { requests, responses })
    };

    let fwd_arrival = |off: usize| flow.fwd.arrival_time(off);
    let rev_arrival = |off: usize| flow.rev.arrival_time(off);

    if let Some(framed) = try_orientation(&flow.fwd.data, &fwd_arrival, &flow.rev.data, &rev_arrival) {
        return Some(framed);
    }
    try_orientation(&flow.rev.data, &rev_arrival, &flow.fwd.data, &fwd_arrival)
}

/// Attaches connect timings (spec.md §3, `Request`) that live on the TCP
/// direction rather than the framed message.
fn attach_connect_timings(requests: &mut [Request], flow: &TcpFlow) {
    for r in requests {
        r.ts_connect = flow.ts_connect();
        r.ts_connect_end = flow.ts_connect_end();
    }
}

/// Pairs ordered requests and responses per spec.md §4.5: find the first
/// response whose `ts_start` is after the first request's `ts_start`,
/// discard earlier (orphan) responses, then pair positionally.
pub fn pair_messages(requests: Vec<Request>, responses: Vec<Response>) -> Vec<MessagePair> {
    if requests.is_empty() {
        return Vec::new();
    }
    // An empty response list has no orphans to trim (vacuously, j=0): the
    // request(s) fall straight through to the "paired with null" case below.
    // Only a *non-empty* list with nothing after the first request's
    // ts_start is the "no response occurs after the first request" silent
    // outcome spec.md describes.
    let first_req_start = requests[0].meta.ts_start;
    let j = if responses.is_empty() {
        Some(0)
    } else {
        match first_req_start {
            Some(t0) => responses.iter().position(|r| r.meta.ts_start.map(|t| t > t0).unwrap_or(false)),
            None => Some(0),
        }
    };
    let Some(j) = j else {
        return Vec::new(); // no response occurs after the first request
    };

    let pairable_responses = &responses[j..];
    let pair_count = requests.len().min(pairable_responses.len());

    let mut pairs = Vec::with_capacity(requests.len());
    let mut requests = requests.into_iter();
    let mut responses_iter = pairable_responses.iter().cloned();
    for _ in 0..pair_count {
        let request = requests.next().unwrap();
        let response = responses_iter.next();
        pairs.push(MessagePair { request, response });
    }
    for request in requests {
        pairs.push(MessagePair { request, response: None });
    }
    pairs
}

/// Runs the full per-flow analysis: orientation, connect-timing
/// attachment, and pairing. Returns `Err(NotHttpFlow)` if neither
/// orientation parses.
pub fn analyze_flow(flow: &TcpFlow, drop_bodies: bool) -> Result<Vec<MessagePair>, ParseError> {
    let mut framed = analyze_orientation(flow, drop_bodies).ok_or(ParseError::NotHttpFlow)?;
    attach_connect_timings(&mut framed.requests, flow);
    Ok(pair_messages(framed.requests, framed.responses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::message::{Body, HeaderList, MessageMeta};
    use crate::tcp::direction::TcpDirection;
    use crate::tcp::endpoint::{Endpoint, FlowKey};
    use std::net::Ipv4Addr;

    fn request_at(ts: f64) -> Request {
        Request {
            meta: MessageMeta { ts_start: Some(ts), ts_end: Some(ts), data_consumed: 0, headers: HeaderList::new(), body: Body::empty() },
            method: "GET".into(),
            uri: "/".into(),
            version: 1,
            host: None,
            ts_connect: None,
            ts_connect_end: None,
        }
    }

    fn response_at(ts: f64) -> Response {
        Response {
            meta: MessageMeta { ts_start: Some(ts), ts_end: Some(ts), data_consumed: 0, headers: HeaderList::new(), body: Body::empty() },
            status: 200,
            reason: "OK".into(),
            version: 1,
        }
    }

    #[test]
    fn pipelined_requests_pair_positionally() {
        let requests = vec![request_at(0.10), request_at(0.20)];
        let responses = vec![response_at(0.15), response_at(0.25)];
        let pairs = pair_messages(requests, responses);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].response.as_ref().unwrap().meta.ts_start, Some(0.15));
        assert_eq!(pairs[1].response.as_ref().unwrap().meta.ts_start, Some(0.25));
    }

    #[test]
    fn orphan_response_before_first_request_is_discarded() {
        let requests = vec![request_at(0.10)];
        let responses = vec![response_at(0.05), response_at(0.15)];
        let pairs = pair_messages(requests, responses);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].response.as_ref().unwrap().meta.ts_start, Some(0.15));
    }

    #[test]
    fn unfulfilled_request_pairs_with_null() {
        let requests = vec![request_at(0.10)];
        let pairs = pair_messages(requests, Vec::new());
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].response.is_none());
    }

    #[test]
    fn no_response_after_first_request_yields_no_pairs() {
        let requests = vec![request_at(0.10)];
        let responses = vec![response_at(0.05)];
        let pairs = pair_messages(requests, responses);
        assert!(pairs.is_empty());
    }

    #[test]
    fn swapped_direction_is_detected_and_paired() {
        let client = Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 4000);
        let server = Endpoint::new(Ipv4Addr::new(10, 0, 0, 2), 80);
        let mut flow = TcpFlow::new(FlowKey::new(client, server), server, client); // fwd = server, rev = client

        let mut fwd = TcpDirection::new();
        fwd.on_segment(0.0, 900, b"", true, 1 << 20);
        fwd.on_segment(0.05, 901, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok", false, 1 << 20);
        flow.fwd = fwd;

        let mut rev = TcpDirection::new();
        rev.on_segment(0.0, 100, b"", true, 1 << 20);
        rev.on_segment(0.01, 101, b"GET / HTTP/1.1\r\n\r\n", false, 1 << 20);
        flow.rev = rev;

        let pairs = analyze_flow(&flow, false).expect("flow should be recognized as HTTP");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].request.method, "GET");
        assert_eq!(pairs[0].response.as_ref().unwrap().status, 200);
    }
}
