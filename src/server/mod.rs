//! Connection acceptance and protocol negotiation.

pub mod detect;
pub mod listener;
pub mod tls;

/// Log a connection-level failure with the operation that produced it.
///
/// The expected "stream truncated" condition — a peer dropping the raw
/// socket before the TLS close_notify exchange finishes — is reported as
/// an `UnexpectedEof` somewhere in the error chain and is filtered out so
/// it never shows up as a real error.
pub fn fail(err: impl Into<anyhow::Error>, op: &str) {
    let err = err.into();

    if is_stream_truncated(&err) {
        tracing::debug!(operation = op, "peer closed stream early");
        return;
    }

    tracing::error!(operation = op, "connection error: {err:#}");
}

fn is_stream_truncated(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::UnexpectedEof)
    })
}
