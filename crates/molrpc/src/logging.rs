//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable selecting the crate log level when `RUST_LOG` is unset.
pub const LOG_LEVEL_ENV: &str = "MOLRPC_LOG";

/// Installs a stderr subscriber with `MOLRPC_LOG` and `LOG_FORMAT` support.
///
/// `RUST_LOG` takes precedence when set. Calling this more than once is a
/// no-op, so embedders that already installed a subscriber keep theirs.
pub fn init_tracing() {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(default_directives(std::env::var(LOG_LEVEL_ENV).ok().as_deref())),
    };
    let json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .try_init();
}

fn default_directives(level: Option<&str>) -> String {
    let level = match level {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("molrpc={level}")
}
