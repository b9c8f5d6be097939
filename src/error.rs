use thiserror::Error;

/// The error kinds from spec.md §7. Every variant is a *value*, never a
/// control-flow escape: callers accumulate these rather than bailing out.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("captured length shorter than wire length")]
    IncompletePacket,
    #[error("failed to decode link/IP frame: {0}")]
    FrameDecode(String),
    #[error("TCP anomaly: {0}")]
    TcpAnomaly(String),
    #[error("HTTP framing failed at offset {offset}: {reason}")]
    HttpParse { offset: usize, reason: String },
    #[error("flow does not contain HTTP in either direction")]
    NotHttpFlow,
    #[error("failed to decode DNS message: {0}")]
    DnsDecode(String),
    #[error("input ended mid-record")]
    EndOfInputTruncation,
}

/// One accumulated error, with enough context to find the offending frame
/// or flow later. Mirrors `PcapErrorRecord`/`HttpErrorRecord` in
/// `original_source/pcap.py` and `original_source/pcap2har/httpsession.py`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    /// Index of the frame that produced this error, numbered from 1 like
    /// Wireshark, if the error is frame-scoped.
    pub frame_index: Option<u64>,
    /// Free-form context: a flow key, a direction name, anything that helps
    /// a human find the source of the error without re-running the parse.
    pub context: String,
    pub error: ParseError,
}

impl ErrorRecord {
    pub fn new(frame_index: Option<u64>, context: impl Into<String>, error: ParseError) -> Self {
        ErrorRecord { frame_index, context: context.into(), error }
    }
}
