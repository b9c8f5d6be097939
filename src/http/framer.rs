//! Component D: HTTP framer (spec.md §4.4). Walks one TCP direction's byte
//! stream and slices it into `Request`s or `Response`s, one message at a
//! time, using `httparse` for the start-line and header grammar and a
//! hand-rolled decoder for chunked transfer-encoding (httparse stops at the
//! blank line after headers and never looks at the body).

use log::trace;

use crate::error::ParseError;
use crate::http::message::{Body, HeaderList, MessageMeta, Request, Response};

const MAX_HEADERS: usize = 64;

enum BodyLength {
    Zero,
    Chunked,
    ContentLength(usize),
    ToEof,
}

fn is_close_semantics(headers: &HeaderList, version: u8) -> bool {
    match headers.get_joined("Connection") {
        Some(v) => v.eq_ignore_ascii_case("close"),
        None => version == 0, // HTTP/1.0 defaults to close unless keep-alive says otherwise
    }
}

fn is_chunked(headers: &HeaderList) -> bool {
    headers
        .get_joined("Transfer-Encoding")
        .map(|v| {
            v.split(',')
                .map(|c| c.trim())
                .last()
                .map(|c| c.eq_ignore_ascii_case("chunked"))
                .unwrap_or(false)
        })
        .unwrap_or(false)
}

fn content_length(headers: &HeaderList) -> Option<usize> {
    headers.get_joined("Content-Length")?.trim().parse().ok()
}

fn determine_body_length(is_response: bool, status: Option<u16>, method: Option<&str>, headers: &HeaderList, version: u8) -> BodyLength {
    let no_body_status = matches!(status, Some(s) if (100..200).contains(&s) || s == 204 || s == 304);
    let is_head = method.map(|m| m.eq_ignore_ascii_case("HEAD")).unwrap_or(false);
    if no_body_status || is_head {
        return BodyLength::Zero;
    }
    if is_chunked(headers) {
        return BodyLength::Chunked;
    }
    if let Some(n) = content_length(headers) {
        return BodyLength::ContentLength(n);
    }
    if is_response && is_close_semantics(headers, version) {
        return BodyLength::ToEof;
    }
    BodyLength::Zero
}

/// Decodes a chunked body starting at `data[0..]`. Returns the decoded
/// bytes and the number of input bytes consumed (chunks plus trailers plus
/// the terminating CRLF), or `None` if the stream ends before the
/// zero-size chunk is seen.
fn decode_chunked(data: &[u8]) -> Option<(Vec<u8>, usize)> {
    let mut pos = 0;
    let mut out = Vec::new();
    loop {
        let line_end = find_crlf(&data[pos..])? + pos;
        let size_line = std::str::from_utf8(&data[pos..line_end]).ok()?;
        let size_str = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_str, 16).ok()?;
        pos = line_end + 2;
        if size == 0 {
            // trailers, then final CRLF
            loop {
                let trailer_end = find_crlf(&data[pos..])? + pos;
                if trailer_end == pos {
                    pos += 2;
                    break;
                }
                pos = trailer_end + 2;
            }
            return Some((out, pos));
        }
        if pos + size + 2 > data.len() {
            return None;
        }
        out.extend_from_slice(&data[pos..pos + size]);
        pos += size + 2; // chunk data + trailing CRLF
    }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn headers_from_httparse(raw: &[httparse::Header]) -> HeaderList {
    let mut headers = HeaderList::new();
    for h in raw {
        headers.push(h.name, &String::from_utf8_lossy(h.value));
    }
    headers
}

fn skip_leading_crlf(data: &[u8]) -> usize {
    let mut i = 0;
    while data[i..].starts_with(b"\r\n") {
        i += 2;
    }
    i
}

/// Frames every Request in `data`, stopping at the first parse failure
/// (which is reported as `(offset, error)`, matching spec.md §4.4's "the
/// framer reports which direction and offset failed").
pub fn frame_requests(data: &[u8], arrival_time: impl Fn(usize) -> Option<f64>, drop_bodies: bool) -> (Vec<Request>, Option<(usize, ParseError)>) {
    let mut out = Vec::new();
    let mut offset = 0;
    loop {
        if offset >= data.len() {
            break;
        }
        let start_offset = offset + skip_leading_crlf(&data[offset..]);
        if start_offset >= data.len() {
            break;
        }
        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut header_storage);
        let parse_result = match req.parse(&data[start_offset..]) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => {
                return (out, Some((start_offset, ParseError::HttpParse { offset: start_offset, reason: "incomplete request headers".into() })));
            }
            Err(e) => {
                return (out, Some((start_offset, ParseError::HttpParse { offset: start_offset, reason: e.to_string() })));
            }
        };
        let headers = headers_from_httparse(req.headers);
        let method = req.method.unwrap_or("").to_string();
        let uri = req.path.unwrap_or("").to_string();
        let version = req.version.unwrap_or(1);
        let host = headers.get_joined("Host");

        let body_start = start_offset + parse_result;
        let (body, body_len) = match determine_body_length(false, None, Some(&method), &headers, version) {
            BodyLength::Zero | BodyLength::ToEof => (Body::empty(), 0),
            BodyLength::Chunked => match decode_chunked(&data[body_start..]) {
                Some((bytes, consumed)) => (Body { bytes, dropped: false }, consumed),
                None => {
                    return (out, Some((body_start, ParseError::HttpParse { offset: body_start, reason: "truncated chunked body".into() })));
                }
            },
            BodyLength::ContentLength(n) => {
                if body_start + n > data.len() {
                    return (out, Some((body_start, ParseError::HttpParse { offset: body_start, reason: "truncated content-length body".into() })));
                }
                (Body { bytes: data[body_start..body_start + n].to_vec(), dropped: false }, n)
            }
        };
        let end_offset = body_start + body_len;
        let data_consumed = end_offset - start_offset;

        out.push(Request {
            meta: MessageMeta {
                ts_start: arrival_time(start_offset),
                ts_end: if end_offset > start_offset { arrival_time(end_offset - 1) } else { arrival_time(start_offset) },
                data_consumed,
                headers,
                body: if drop_bodies { Body { bytes: Vec::new(), dropped: true } } else { body },
            },
            method,
            uri,
            version,
            host,
            ts_connect: None,
            ts_connect_end: None,
        });
        offset = end_offset;
    }
    (out, None)
}

/// Frames every Response in `data`. Symmetric to [`frame_requests`].
pub fn frame_responses(data: &[u8], arrival_time: impl Fn(usize) -> Option<f64>, drop_bodies: bool) -> (Vec<Response>, Option<(usize, ParseError)>) {
    let mut out = Vec::new();
    let mut offset = 0;
    loop {
        if offset >= data.len() {
            break;
        }
        let start_offset = offset + skip_leading_crlf(&data[offset..]);
        if start_offset >= data.len() {
            break;
        }
        let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut resp = httparse::Response::new(&mut header_storage);
        let parse_result = match resp.parse(&data[start_offset..]) {
            Ok(httparse::Status::Complete(n)) => n,
            Ok(httparse::Status::Partial) => {
                return (out, Some((start_offset, ParseError::HttpParse { offset: start_offset, reason: "incomplete response headers".into() })));
            }
            Err(e) => {
                return (out, Some((start_offset, ParseError::HttpParse { offset: start_offset, reason: e.to_string() })));
            }
        };
        let headers = headers_from_httparse(resp.headers);
        let status = resp.code.unwrap_or(0);
        let reason = resp.reason.unwrap_or("").to_string();
        let version = resp.version.unwrap_or(1);

        let body_start = start_offset + parse_result;
        let length_policy = determine_body_length(true, Some(status), None, &headers, version);
        let reads_to_eof = matches!(length_policy, BodyLength::ToEof);
        let (body, body_len) = match length_policy {
            BodyLength::Zero => (Body::empty(), 0),
            BodyLength::Chunked => match decode_chunked(&data[body_start..]) {
                Some((bytes, consumed)) => (Body { bytes, dropped: false }, consumed),
                None => {
                    return (out, Some((body_start, ParseError::HttpParse { offset: body_start, reason: "truncated chunked body".into() })));
                }
            },
            BodyLength::ContentLength(n) => {
                if body_start + n > data.len() {
                    return (out, Some((body_start, ParseError::HttpParse { offset: body_start, reason: "truncated content-length body".into() })));
                }
                (Body { bytes: data[body_start..body_start + n].to_vec(), dropped: false }, n)
            }
            BodyLength::ToEof => {
                trace!("http: response at offset {} reads to end of direction ({} bytes)", start_offset, data.len() - body_start);
                (Body { bytes: data[body_start..].to_vec(), dropped: false }, data.len() - body_start)
            }
        };
        let end_offset = body_start + body_len;
        let data_consumed = end_offset - start_offset;

        out.push(Response {
            meta: MessageMeta {
                ts_start: arrival_time(start_offset),
                ts_end: if end_offset > start_offset { arrival_time(end_offset - 1) } else { arrival_time(start_offset) },
                data_consumed,
                headers,
                body: if drop_bodies { Body { bytes: Vec::new(), dropped: true } } else { body },
            },
            status,
            reason,
            version,
        });
        offset = end_offset;
        if reads_to_eof {
            break; // consumed to EOF, nothing more to frame on this direction
        }
    }
    (out, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival_time_const(ts: f64) -> impl Fn(usize) -> Option<f64> {
        move |_| Some(ts)
    }

    #[test]
    fn frames_single_get_request() {
        let data = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (reqs, err) = frame_requests(data, arrival_time_const(1.0), false);
        assert!(err.is_none());
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "GET");
        assert_eq!(reqs[0].uri, "/index.html");
        assert_eq!(reqs[0].host.as_deref(), Some("example.com"));
        assert_eq!(reqs[0].meta.data_consumed, data.len());
    }

    #[test]
    fn frames_response_with_content_length_body() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let (resps, err) = frame_responses(data, arrival_time_const(1.0), false);
        assert!(err.is_none());
        assert_eq!(resps.len(), 1);
        assert_eq!(resps[0].status, 200);
        assert_eq!(resps[0].meta.body.bytes, b"hello");
    }

    #[test]
    fn frames_chunked_response_body() {
        let data = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let (resps, err) = frame_responses(data, arrival_time_const(1.0), false);
        assert!(err.is_none());
        assert_eq!(resps[0].meta.body.bytes, b"hello");
    }

    #[test]
    fn head_response_has_no_body_even_with_content_length() {
        let data = b"HEAD / HTTP/1.1\r\n\r\n";
        let (reqs, err) = frame_requests(data, arrival_time_const(1.0), false);
        assert!(err.is_none());
        assert_eq!(reqs[0].meta.body.bytes.len(), 0);
    }

    #[test]
    fn dropped_bodies_are_empty_but_still_consumed() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let (resps, _) = frame_responses(data, arrival_time_const(1.0), true);
        assert!(resps[0].meta.body.dropped);
        assert!(resps[0].meta.body.bytes.is_empty());
        assert_eq!(resps[0].meta.data_consumed, data.len());
    }

    #[test]
    fn two_pipelined_requests_are_both_framed() {
        let data = b"GET /a HTTP/1.1\r\nHost: h\r\n\r\nGET /b HTTP/1.1\r\nHost: h\r\n\r\n";
        let (reqs, err) = frame_requests(data, arrival_time_const(1.0), false);
        assert!(err.is_none());
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].uri, "/a");
        assert_eq!(reqs[1].uri, "/b");
    }

    #[test]
    fn malformed_start_line_is_reported_at_its_offset() {
        let data = b"not a request\r\n\r\n";
        let (reqs, err) = frame_requests(data, arrival_time_const(1.0), false);
        assert!(reqs.is_empty());
        assert!(err.is_some());
    }
}
