/// Core-visible configuration, passed explicitly to session construction.
///
/// There is no ambient/global configuration (see DESIGN.md); every
/// component that needs one of these flags receives it as an argument.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Drop response bodies after framing, keeping only `data_consumed`.
    pub drop_response_bodies: bool,
    /// Enable page-tracker integration and `log.pages` output.
    pub process_pages: bool,
    /// Retain entries whose request never received a response.
    pub keep_unfulfilled_requests: bool,
    /// Per-direction cap on buffered (out-of-order) bytes before the flow
    /// is abandoned with a `TcpAnomaly` error. Recommended default: 16 MiB.
    pub max_buffer_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            drop_response_bodies: false,
            process_pages: false,
            keep_unfulfilled_requests: false,
            max_buffer_bytes: 16 * 1024 * 1024,
        }
    }
}
