use thiserror::Error;

/// Fatal errors only: anything that reaches the caller aborts the trace.
/// Malformed or unrelated datagrams never surface here; the walker logs
/// them and keeps waiting.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("socket setup failed: {0}")]
    SocketSetup(#[source] std::io::Error),

    #[error("failed to send probe: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to receive reply: {0}")]
    Recv(#[source] std::io::Error),

    #[error("cannot resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
}

pub type TraceResult<T> = Result<T, TraceError>;
