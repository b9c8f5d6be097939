//! Components D and E: HTTP framing and flow analysis (spec.md §4.4–4.5).

pub mod analyzer;
pub mod framer;
pub mod message;

pub use analyzer::analyze_flow;
pub use message::{Body, HeaderList, MessagePair, Request, Response};
