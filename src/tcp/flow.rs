use crate::tcp::direction::TcpDirection;
use crate::tcp::endpoint::{Endpoint, FlowKey};

/// All packets between the same two endpoints in one TCP connection.
/// `fwd` is the direction from the first-seen SYN originator to its peer
/// (or, absent a SYN, the direction of the first segment seen); `rev` is
/// the other direction. Once assigned, direction is stable for the life of
/// the flow.
#[derive(Debug, Clone)]
pub struct TcpFlow {
    pub key: FlowKey,
    pub fwd_endpoint: Endpoint,
    pub rev_endpoint: Endpoint,
    pub fwd: TcpDirection,
    pub rev: TcpDirection,
    pub reset: bool,
}

impl TcpFlow {
    pub fn new(key: FlowKey, fwd_endpoint: Endpoint, rev_endpoint: Endpoint) -> Self {
        TcpFlow {
            key,
            fwd_endpoint,
            rev_endpoint,
            fwd: TcpDirection::new(),
            rev: TcpDirection::new(),
            reset: false,
        }
    }

    /// `true` once both directions have seen a FIN, or either has seen RST.
    pub fn is_closed(&self) -> bool {
        self.reset || (self.fwd.closed && self.rev.closed)
    }

    /// Timestamp of the client's SYN (or first segment, if SYN was missed).
    pub fn ts_connect(&self) -> Option<f64> {
        self.fwd.first_ts
    }

    /// Timestamp of the server's SYN-ACK (or first server byte, if missed).
    pub fn ts_connect_end(&self) -> Option<f64> {
        self.rev.first_ts
    }

    pub fn direction_mut(&mut self, src: Endpoint) -> &mut TcpDirection {
        if src == self.fwd_endpoint {
            &mut self.fwd
        } else {
            &mut self.rev
        }
    }

    pub fn direction(&self, src: Endpoint) -> &TcpDirection {
        if src == self.fwd_endpoint {
            &self.fwd
        } else {
            &self.rev
        }
    }

    /// Forces both directions closed, for end-of-input finalization.
    pub fn force_close(&mut self) {
        self.fwd.closed = true;
        self.rev.closed = true;
    }
}
