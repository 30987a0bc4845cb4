//! Data model for solar generation forecasts and PV_Live truth values.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod db;
pub mod query;
pub mod schema;

/// Set up a global [`tracing`] subscriber.
///
/// Log levels are controlled by `RUST_LOG`, and default to `info`. Only the first call has any
/// effect, so this is safe to call from every test.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
