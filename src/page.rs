//! Page-tracker interface (spec.md §1: explicitly an external collaborator,
//! same footing as the JSON serializer). The session only needs a `getref`
//! oracle and somewhere to deposit computed page metadata; the grouping
//! heuristic itself (by navigation, by `Referer` chain, whatever a given
//! deployment wants) lives outside this crate.

use crate::http::Request;

#[derive(Debug, Clone, Copy, Default)]
pub struct PageMetadata {
    /// `max_end - min_start` across the page's entries (spec.md §4.7).
    pub network_load_time: f64,
}

pub trait PageTracker {
    /// Returns the page id `request` belongs to, or `None` to leave the
    /// entry un-paged.
    fn getref(&mut self, request: &Request) -> Option<String>;

    /// Called once per page after all entries are processed, with the
    /// network-load interval computed in `HttpSession::build`.
    fn set_page_metadata(&mut self, page_id: &str, metadata: PageMetadata);
}

/// No-op tracker used when [`crate::config::Config::process_pages`] is
/// false: every entry is un-paged and metadata writes are discarded.
#[derive(Debug, Default)]
pub struct NullPageTracker;

impl PageTracker for NullPageTracker {
    fn getref(&mut self, _request: &Request) -> Option<String> {
        None
    }

    fn set_page_metadata(&mut self, _page_id: &str, _metadata: PageMetadata) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_tracker_never_assigns_a_page() {
        use crate::http::message::{Body, HeaderList, MessageMeta};

        let mut tracker = NullPageTracker;
        let req = Request {
            meta: MessageMeta {
                ts_start: None,
                ts_end: None,
                data_consumed: 0,
                headers: HeaderList::new(),
                body: Body::empty(),
            },
            method: "GET".into(),
            uri: "/".into(),
            version: 1,
            host: None,
            ts_connect: None,
            ts_connect_end: None,
        };
        assert!(tracker.getref(&req).is_none());
        tracker.set_page_metadata("p1", PageMetadata { network_load_time: 10.0 });
    }
}
