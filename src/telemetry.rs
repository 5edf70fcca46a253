//! Logging initialization.
//!
//! The engine logs through `tracing` directly rather than a bespoke
//! `Logger` trait — `tracing`'s target/span mechanism is a strict superset
//! of the debug/info/warn/error interface an embedding application expects.
//! [`init`] wires a `tracing-subscriber` `fmt` layer honoring `RUST_LOG`
//! (or `info` by default). There is no OTLP exporter here: this crate has
//! no distributed trace context to propagate across processes.

use tracing_subscriber::EnvFilter;

/// Initialize a stderr `tracing` subscriber for an embedding application
/// that has not already installed one of its own.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init() {
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .try_init();
}

/// Test-only helpers for asserting on emitted log output.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use tracing_subscriber::fmt::MakeWriter;

    /// Install a subscriber writing to the given in-memory sink for the
    /// duration of the returned guard.
    pub fn capture<W>(writer: W) -> tracing::subscriber::DefaultGuard
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_env_filter(EnvFilter::new("debug"))
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}
