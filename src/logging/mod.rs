//! Logging infrastructure for Favorr
//!
//! Diagnostic logs go through `tracing`; ledger transitions additionally go
//! to the JSONL audit trail.

pub mod audit;

pub use audit::{AuditEvent, AuditLogger, EventType};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

/// Install the global subscriber; `RUST_LOG` overrides `log_level`
pub fn init(log_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("favorr={},info", log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
