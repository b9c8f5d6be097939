//! Component F: DNS tracker (spec.md §4.6). Queries and responses are
//! correlated by transaction id and endpoint pair; the result feeds the
//! session's DNS-timing attachment (§4.7).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use dns_parser::{Packet, QueryType};
use log::{trace, warn};

use crate::error::{ErrorRecord, ParseError};
use crate::tcp::endpoint::FlowKey;

#[derive(Debug, Clone)]
pub struct DnsQuery {
    pub hostname: String,
    pub ts_query: f64,
    pub ts_response: Option<f64>,
    pub resolved: Vec<Ipv4Addr>,
}

impl DnsQuery {
    /// Duration of this query in seconds; unresolved queries contribute 0.
    pub fn duration(&self) -> f64 {
        match self.ts_response {
            Some(end) => (end - self.ts_query).max(0.0),
            None => 0.0,
        }
    }
}

pub struct DnsTracker {
    pending: HashMap<(u16, FlowKey), DnsQuery>,
    resolved: Vec<DnsQuery>,
}

impl DnsTracker {
    pub fn new() -> Self {
        DnsTracker {
            pending: HashMap::new(),
            resolved: Vec::new(),
        }
    }

    /// `flow` is the (unordered) endpoint pair the datagram traveled over,
    /// so that concurrent queries for the same transaction id between
    /// different resolver/client pairs don't collide.
    pub fn add(&mut self, frame_index: u64, ts: f64, flow: FlowKey, payload: &[u8], errors: &mut Vec<ErrorRecord>) {
        let packet = match Packet::parse(payload) {
            Ok(p) => p,
            Err(e) => {
                errors.push(ErrorRecord::new(
                    Some(frame_index),
                    "dns message",
                    ParseError::DnsDecode(e.to_string()),
                ));
                return;
            }
        };
        let txid = packet.header.id;
        let key = (txid, flow);

        if !packet.header.query {
            self.handle_response(key, ts, &packet);
            return;
        }
        let Some(question) = packet.questions.first() else {
            return;
        };
        if !matches!(question.qtype, QueryType::A | QueryType::AAAA) {
            trace!("dns: ignoring question of type {:?}", question.qtype);
            return;
        }
        let hostname = question.qname.to_string();
        self.pending.insert(
            key,
            DnsQuery {
                hostname,
                ts_query: ts,
                ts_response: None,
                resolved: Vec::new(),
            },
        );
    }

    fn handle_response(&mut self, key: (u16, FlowKey), ts: f64, packet: &Packet) {
        let Some(mut query) = self.pending.remove(&key) else {
            warn!("dns: response for unknown transaction id {}", key.0);
            return;
        };
        query.ts_response = Some(ts);
        for answer in &packet.answers {
            if let dns_parser::RData::A(addr) = &answer.data {
                query.resolved.push(addr.0);
            }
        }
        self.resolved.push(query);
    }

    /// Materializes remaining in-flight queries as unresolved and returns
    /// every query observed, indexed by hostname is left to the caller.
    pub fn finish(mut self) -> (Vec<DnsQuery>, Vec<ErrorRecord>) {
        self.resolved.extend(self.pending.into_values());
        (self.resolved, Vec::new())
    }
}

impl Default for DnsTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the `by_hostname` index spec.md §4.6 describes, in observation
/// order (the order `queries` is already in).
pub fn index_by_hostname(queries: &[DnsQuery]) -> HashMap<String, Vec<usize>> {
    let mut index: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, q) in queries.iter().enumerate() {
        index.entry(q.hostname.clone()).or_default().push(i);
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query_message(id: u16, name: &str) -> Vec<u8> {
        let mut builder = dns_parser::Builder::new_query(id, true);
        builder.add_question(
            name,
            false,
            QueryType::A,
            dns_parser::QueryClass::IN,
        );
        builder.build().expect("valid dns query")
    }

    fn test_flow() -> FlowKey {
        use crate::tcp::endpoint::Endpoint;
        FlowKey::new(
            Endpoint::new(Ipv4Addr::new(10, 0, 0, 1), 5000),
            Endpoint::new(Ipv4Addr::new(8, 8, 8, 8), 53),
        )
    }

    #[test]
    fn unresolved_query_survives_to_finish() {
        let mut tracker = DnsTracker::new();
        let mut errors = Vec::new();
        tracker.add(1, 0.0, test_flow(), &query_message(42, "example.com"), &mut errors);
        assert!(errors.is_empty());
        let (queries, _) = tracker.finish();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].hostname, "example.com");
        assert!(queries[0].ts_response.is_none());
        assert_eq!(queries[0].duration(), 0.0);
    }

    #[test]
    fn by_hostname_groups_in_observation_order() {
        let queries = vec![
            DnsQuery { hostname: "a.com".into(), ts_query: 0.0, ts_response: Some(0.1), resolved: vec![] },
            DnsQuery { hostname: "b.com".into(), ts_query: 0.2, ts_response: Some(0.3), resolved: vec![] },
            DnsQuery { hostname: "a.com".into(), ts_query: 0.4, ts_response: Some(0.5), resolved: vec![] },
        ];
        let index = index_by_hostname(&queries);
        assert_eq!(index["a.com"], vec![0, 2]);
        assert_eq!(index["b.com"], vec![1]);
    }
}
