//! Component G: HTTP session (spec.md §4.7). Merges every flow's paired
//! requests/responses into timestamp-ordered entries, attaches DNS timing,
//! and drives page grouping through the pluggable [`PageTracker`].

pub mod entry;

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::dns::{index_by_hostname, DnsQuery};
use crate::error::ErrorRecord;
use crate::http::analyze_flow;
use crate::page::{PageMetadata, PageTracker};
use crate::tcp::flow::TcpFlow;
use entry::{Entry, UserAgentTracker};

#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    pub min_start: f64,
    pub max_end: f64,
}

impl Page {
    pub fn network_load_time(&self) -> f64 {
        self.max_end - self.min_start
    }
}

pub struct HttpSession {
    pub entries: Vec<Entry>,
    pub pages: HashMap<String, Page>,
    pub user_agents: UserAgentTracker,
}

impl HttpSession {
    /// Builds a session from every reassembled flow plus the DNS queries
    /// observed over the same trace.
    pub fn build(
        flows: Vec<TcpFlow>,
        dns_queries: Vec<DnsQuery>,
        config: &Config,
        page_tracker: &mut dyn PageTracker,
    ) -> (HttpSession, Vec<ErrorRecord>) {
        let mut errors = Vec::new();
        let mut pairs = Vec::new();
        for flow in &flows {
            match analyze_flow(flow, config.drop_response_bodies) {
                Ok(flow_pairs) => pairs.extend(flow_pairs),
                Err(e) => errors.push(ErrorRecord::new(None, format!("flow {:?}", flow.key), e)),
            }
        }

        // Sort by request.ts_connect, null sorts last; stable so ties keep
        // the order flows were visited in.
        pairs.sort_by(|a, b| match (a.request.ts_connect, b.request.ts_connect) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let mut user_agents = UserAgentTracker::new();
        for pair in &pairs {
            if let Some(ua) = pair.request.meta.headers.get_joined("User-Agent") {
                user_agents.record(&ua);
            }
        }

        let mut entries: Vec<Entry> = Vec::new();
        for pair in pairs {
            let has_response = pair.response.is_some();
            if has_response || config.keep_unfulfilled_requests {
                entries.push(Entry::new(pair));
            }
        }

        attach_dns_timing(&mut entries, &dns_queries);

        for entry in &mut entries {
            entry.finalize_total_time();
        }

        if config.process_pages {
            for entry in &mut entries {
                entry.pageref = page_tracker.getref(&entry.request);
            }
        }

        let pages = compute_page_intervals(&entries);
        for (page_id, page) in &pages {
            page_tracker.set_page_metadata(page_id, PageMetadata { network_load_time: page.network_load_time() });
        }

        (HttpSession { entries, pages, user_agents }, errors)
    }
}

/// DNS attachment per spec.md §4.7: the first entry for each hostname
/// receives every query indexed under that name; later entries for the
/// same hostname get nothing (the name is assumed cached after first use).
fn attach_dns_timing(entries: &mut [Entry], dns_queries: &[DnsQuery]) {
    let by_hostname = index_by_hostname(dns_queries);
    let mut seen = HashSet::new();
    for entry in entries.iter_mut() {
        let Some(host) = entry.request.host.clone() else { continue };
        if !seen.insert(host.clone()) {
            continue;
        }
        if let Some(indices) = by_hostname.get(&host) {
            for &i in indices {
                entry.add_dns(dns_queries[i].duration());
            }
        }
    }
}

fn compute_page_intervals(entries: &[Entry]) -> HashMap<String, Page> {
    let mut pages: HashMap<String, Page> = HashMap::new();
    for entry in entries {
        let Some(page_id) = &entry.pageref else { continue };
        let Some(start) = entry.ts_start else { continue };
        if entry.total_time < 0.0 {
            continue;
        }
        let end = start + entry.total_time;
        pages
            .entry(page_id.clone())
            .and_modify(|p| {
                p.min_start = p.min_start.min(start);
                p.max_end = p.max_end.max(end);
            })
            .or_insert(Page { min_start: start, max_end: end });
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::DnsQuery;

    #[test]
    fn dns_timing_attaches_only_to_first_entry_per_hostname() {
        use crate::http::message::{Body, HeaderList, MessageMeta};
        use crate::http::{MessagePair, Request};

        let request = |ts: f64| Request {
            meta: MessageMeta { ts_start: Some(ts), ts_end: Some(ts + 0.001), data_consumed: 0, headers: HeaderList::new(), body: Body::empty() },
            method: "GET".into(),
            uri: "/".into(),
            version: 1,
            host: Some("example.com".into()),
            ts_connect: Some(ts - 0.01),
            ts_connect_end: Some(ts - 0.005),
        };
        let e1 = Entry::new(MessagePair { request: request(1.0), response: None });
        let e2 = Entry::new(MessagePair { request: request(2.0), response: None });
        let mut entries = vec![e1, e2];

        let queries = vec![DnsQuery { hostname: "example.com".into(), ts_query: 0.0, ts_response: Some(0.05), resolved: vec![] }];
        attach_dns_timing(&mut entries, &queries);

        assert!(entries[0].time_dnsing > 0.0);
        assert_eq!(entries[1].time_dnsing, entry::UNKNOWN);
    }
}
