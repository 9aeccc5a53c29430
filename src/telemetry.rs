use tokio::task::JoinHandle;
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Compose the tracing subscriber: env-filter first (`RUST_LOG` wins over the
/// provided default), then a fmt layer writing to `sink`.
pub fn get_subscriber<Sink>(
    default_env_filter: String,
    sink: Sink,
) -> impl Subscriber + Send + Sync + 'static
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_env_filter));

    Registry::default()
        .with(env_filter)
        .with(fmt::layer().with_writer(sink))
}

/// Register the subscriber as the process-wide default. Call once.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync + 'static) {
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set subscriber");
}

/// `tokio::task::spawn_blocking` loses the caller's span; re-attach it so
/// password hashing shows up under the request that triggered it.
pub fn spawn_blocking_with_tracing<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let current_span = tracing::Span::current();
    tokio::task::spawn_blocking(move || current_span.in_scope(f))
}
