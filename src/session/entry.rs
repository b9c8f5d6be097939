//! Component H: entry timing (spec.md §4.8), plus the user-agent tracker
//! from §3.

use std::collections::HashMap;

use crate::http::{MessagePair, Request, Response};

/// Sentinel for "not known" per spec.md §4.8.
pub const UNKNOWN: f64 = -1.0;

fn diff_ms(end: Option<f64>, start: Option<f64>) -> f64 {
    match (end, start) {
        (Some(e), Some(s)) => (e - s) * 1000.0,
        _ => UNKNOWN,
    }
}

/// One HTTP transaction plus its derived timings, ready for HAR-style
/// reporting (spec.md §3, `Entry`).
#[derive(Debug, Clone)]
pub struct Entry {
    pub request: Request,
    pub response: Option<Response>,
    pub pageref: Option<String>,
    /// `request.ts_connect` in milliseconds, mirroring `startedDateTime`'s source.
    pub ts_start: Option<f64>,
    pub time_blocked: f64,
    pub time_dnsing: f64,
    pub time_connecting: f64,
    pub time_gap: f64,
    pub time_sending: f64,
    pub time_waiting: f64,
    pub time_receiving: f64,
    pub time: f64,
    pub total_time: f64,
}

impl Entry {
    pub fn new(pair: MessagePair) -> Self {
        let MessagePair { request, response } = pair;

        let time_connecting = diff_ms(request.ts_connect_end, request.ts_connect);
        let time_gap = diff_ms(request.meta.ts_start, request.ts_connect_end);
        let time_sending = diff_ms(request.meta.ts_end, request.meta.ts_start);

        let mut time_waiting = UNKNOWN;
        let mut time_receiving = UNKNOWN;
        let mut time = UNKNOWN;
        if let Some(resp) = &response {
            time_waiting = diff_ms(resp.meta.ts_start, request.meta.ts_end);
            time_receiving = diff_ms(resp.meta.ts_end, resp.meta.ts_start);
            time = if request.ts_connect.is_some() {
                diff_ms(resp.meta.ts_end, request.ts_connect)
            } else {
                diff_ms(resp.meta.ts_end, request.meta.ts_start)
            };
        }

        let ts_start = request.ts_connect.map(|t| t * 1000.0);

        Entry {
            request,
            response,
            pageref: None,
            ts_start,
            time_blocked: UNKNOWN,
            time_dnsing: UNKNOWN,
            time_connecting,
            time_gap,
            time_sending,
            time_waiting,
            time_receiving,
            time,
            total_time: UNKNOWN,
        }
    }

    /// Adds one DNS query's duration (spec.md §4.7: DNS attachment
    /// accumulates across every query indexed under the hostname).
    pub fn add_dns(&mut self, duration_secs: f64) {
        let ms = duration_secs * 1000.0;
        if self.time_dnsing < 0.0 {
            self.time_dnsing = ms;
        } else {
            self.time_dnsing += ms;
        }
    }

    /// `total_time = time + (dnsing if known) + (blocked if known)`,
    /// preserving `-1` if `time` itself is unknown.
    pub fn finalize_total_time(&mut self) {
        if self.time < 0.0 {
            self.total_time = UNKNOWN;
            return;
        }
        let mut total = self.time;
        if self.time_dnsing >= 0.0 {
            total += self.time_dnsing;
        }
        if self.time_blocked >= 0.0 {
            total += self.time_blocked;
        }
        self.total_time = total;
    }
}

/// Tracks `User-Agent` header occurrences across all requests in a session.
#[derive(Debug, Default)]
pub struct UserAgentTracker {
    counts: HashMap<String, u64>,
    order: Vec<String>,
}

impl UserAgentTracker {
    pub fn new() -> Self {
        UserAgentTracker::default()
    }

    pub fn record(&mut self, user_agent: &str) {
        if !self.counts.contains_key(user_agent) {
            self.order.push(user_agent.to_string());
        }
        *self.counts.entry(user_agent.to_string()).or_insert(0) += 1;
    }

    /// The most-used string, ties broken by first insertion.
    pub fn dominant(&self) -> Option<&str> {
        let max = self.counts.values().max()?;
        self.order.iter().find(|ua| self.counts[*ua] == *max).map(|s| s.as_str())
    }
}
