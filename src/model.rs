//! HAR-shaped output model. Converts the internal [`crate::session::entry::Entry`]
//! into `Serialize`-deriving records an external HAR writer can consume
//! directly; actually producing the `.har` file is out of scope (spec.md §1).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::entry::Entry;
use crate::session::HttpSession;

/// Tool identity recorded in `log.creator` (spec.md §6).
const CREATOR_NAME: &str = "pcaphar";
const CREATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize)]
pub struct HarHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub headers: Vec<HarHeader>,
    pub body_size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarResponse {
    pub status: u16,
    pub status_text: String,
    pub http_version: String,
    pub headers: Vec<HarHeader>,
    pub body_size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarTimings {
    pub blocked: i64,
    pub dns: i64,
    pub connect: i64,
    #[serde(rename = "_gap")]
    pub gap: i64,
    pub send: i64,
    pub wait: i64,
    pub receive: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarEntry {
    pub started_date_time: Option<DateTime<Utc>>,
    pub time: i64,
    pub request: HarRequest,
    pub response: Option<HarResponse>,
    pub timings: HarTimings,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pageref: Option<String>,
}

fn to_ms_int(v: f64) -> i64 {
    if v < 0.0 {
        -1
    } else {
        v.round() as i64
    }
}

fn version_str(v: u8) -> String {
    match v {
        0 => "HTTP/1.0".to_string(),
        _ => "HTTP/1.1".to_string(),
    }
}

fn started_date_time(ts_start: Option<f64>) -> Option<DateTime<Utc>> {
    // ts_start is already in milliseconds (see Entry::new); convert back to
    // seconds + nanos for the DateTime constructor.
    let ts_start = ts_start?;
    let secs = (ts_start / 1000.0).floor() as i64;
    let nanos = ((ts_start / 1000.0 - secs as f64) * 1_000_000_000.0) as u32;
    DateTime::from_timestamp(secs, nanos)
}

impl From<&Entry> for HarEntry {
    fn from(entry: &Entry) -> Self {
        let request = &entry.request;
        let url = request.uri.clone();
        let req_headers: Vec<HarHeader> = request
            .meta
            .headers
            .iter()
            .map(|(n, v)| HarHeader { name: n.clone(), value: v.clone() })
            .collect();

        let response = entry.response.as_ref().map(|resp| HarResponse {
            status: resp.status,
            status_text: resp.reason.clone(),
            http_version: version_str(resp.version),
            headers: resp.meta.headers.iter().map(|(n, v)| HarHeader { name: n.clone(), value: v.clone() }).collect(),
            body_size: resp.meta.body.len() as i64,
        });

        HarEntry {
            started_date_time: started_date_time(entry.ts_start),
            time: to_ms_int(entry.total_time),
            request: HarRequest {
                method: request.method.clone(),
                url,
                http_version: version_str(request.version),
                headers: req_headers,
                body_size: request.meta.body.len() as i64,
            },
            response,
            timings: HarTimings {
                blocked: to_ms_int(entry.time_blocked),
                dns: to_ms_int(entry.time_dnsing),
                connect: to_ms_int(entry.time_connecting),
                gap: to_ms_int(entry.time_gap),
                send: to_ms_int(entry.time_sending),
                wait: to_ms_int(entry.time_waiting),
                receive: to_ms_int(entry.time_receiving),
            },
            pageref: entry.pageref.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HarCreator {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarBrowser {
    pub name: Option<String>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarPageTimings {
    pub on_content_load: i64,
    pub on_load: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarPage {
    pub id: String,
    pub started_date_time: Option<DateTime<Utc>>,
    pub title: String,
    pub page_timings: HarPageTimings,
}

/// The document tree an external writer serializes to `.har` JSON
/// (spec.md §6): `log.version`/`creator`/`browser`/`entries`/`pages`.
/// Assembling this tree is core's job; only writing the JSON text itself
/// is the declared external-serializer non-goal (spec.md §1).
#[derive(Debug, Clone, Serialize)]
pub struct HarLog {
    pub version: String,
    pub creator: HarCreator,
    pub browser: HarBrowser,
    pub entries: Vec<HarEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<HarPage>,
}

impl From<&HttpSession> for HarLog {
    fn from(session: &HttpSession) -> Self {
        let browser = HarBrowser {
            name: session.user_agents.dominant().map(|s| s.to_string()),
            version: "mumble".to_string(),
        };

        let mut page_ids: Vec<&String> = session.pages.keys().collect();
        page_ids.sort();
        let pages = page_ids
            .into_iter()
            .map(|id| {
                let page = &session.pages[id];
                HarPage {
                    id: id.clone(),
                    started_date_time: started_date_time(Some(page.min_start)),
                    title: id.clone(),
                    page_timings: HarPageTimings { on_content_load: -1, on_load: to_ms_int(page.network_load_time()) },
                }
            })
            .collect();

        HarLog {
            version: "1.1".to_string(),
            creator: HarCreator { name: CREATOR_NAME.to_string(), version: CREATOR_VERSION.to_string() },
            browser,
            entries: session.entries.iter().map(HarEntry::from).collect(),
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_timings_round_to_sentinel() {
        assert_eq!(to_ms_int(-1.0), -1);
        assert_eq!(to_ms_int(12.6), 13);
    }

    #[test]
    fn http_1_0_is_labeled_correctly() {
        assert_eq!(version_str(0), "HTTP/1.0");
        assert_eq!(version_str(1), "HTTP/1.1");
    }

    #[test]
    fn har_log_from_empty_session_has_no_browser_and_no_pages() {
        use crate::session::entry::UserAgentTracker;
        use std::collections::HashMap;

        let session = HttpSession { entries: Vec::new(), pages: HashMap::new(), user_agents: UserAgentTracker::new() };
        let log = HarLog::from(&session);
        assert_eq!(log.version, "1.1");
        assert!(log.browser.name.is_none());
        assert!(log.entries.is_empty());
        assert!(log.pages.is_empty());
    }

    #[test]
    fn har_log_serializes_to_json() {
        use crate::session::entry::UserAgentTracker;
        use std::collections::HashMap;

        let session = HttpSession { entries: Vec::new(), pages: HashMap::new(), user_agents: UserAgentTracker::new() };
        let log = HarLog::from(&session);
        let json = serde_json::to_string(&log).expect("HarLog should serialize");
        assert!(json.contains("\"version\":\"1.1\""));
        assert!(json.contains("\"creator\""));
    }
}
