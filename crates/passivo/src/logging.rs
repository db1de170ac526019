//! Tracing subscriber setup for the server binary.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Map a `PASSIVO_LOG` value to a level name. Unknown values mean `info`.
fn base_level(value: Option<&str>) -> &'static str {
    match value.map(str::trim) {
        Some("debug") => "debug",
        Some("trace") => "trace",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    }
}

fn default_filter(level: &str) -> String {
    format!("passivo={level},passivo_server={level}")
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `PASSIVO_LOG` picks the level for
/// this crate. `LOG_FORMAT=json` switches to JSON lines. Output goes to stderr.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = base_level(std::env::var("PASSIVO_LOG").ok().as_deref());
        EnvFilter::new(default_filter(level))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names() {
        assert_eq!(base_level(Some("debug")), "debug");
        assert_eq!(base_level(Some("warning")), "warn");
        assert_eq!(base_level(Some("error")), "error");
        assert_eq!(base_level(Some("loud")), "info");
        assert_eq!(base_level(None), "info");
    }

    #[test]
    fn default_filter_parses() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("passivo=debug"));
        assert!(EnvFilter::try_new(filter).is_ok());
    }
}
