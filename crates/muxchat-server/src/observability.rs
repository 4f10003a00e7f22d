use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    match std::env::var("MUXCHAT_OBSERVABILITY_ENABLED") {
        Ok(value) => parse_bool_env(&value).unwrap_or(true),
        Err(_) => true,
    }
}

/// Relay and server logs at `info`, dependencies only at `warn`.
const DEFAULT_DIRECTIVES: &str = "warn,muxchat_relay=info,muxchat_server=info";

/// First parseable, non-empty candidate wins; otherwise `DEFAULT_DIRECTIVES`.
fn resolve_env_filter(
    log_level: Option<String>,
    rust_log: Option<String>,
) -> tracing_subscriber::EnvFilter {
    [log_level, rust_log]
        .into_iter()
        .flatten()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| tracing_subscriber::EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `MUXCHAT_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `MUXCHAT_LOG_LEVEL`: optional level/filter override (`info`, `muxchat_relay=debug`, etc.).
/// - `MUXCHAT_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file.
///   If unset, logs are emitted to stdout in a human-readable console format.
/// - `RUST_LOG`: fallback filter.
///
/// Each transcode runs inside a `transcode` span carrying `request_id`,
/// `provider` and `model`; both formats print those fields on every event
/// so a log line can be matched to the `x-request-id` response header.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter(
            std::env::var("MUXCHAT_LOG_LEVEL").ok(),
            std::env::var("RUST_LOG").ok(),
        );
        if let Ok(path_raw) = std::env::var("MUXCHAT_JSON_LOG_PATH") {
            let path = std::path::PathBuf::from(path_raw);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = std::fs::create_dir_all(parent);
            }
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("muxchat.logs.jsonl");
            let writer = tracing_appender::rolling::never(dir, file_name);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stdout);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_env_values() {
        assert_eq!(parse_bool_env(" Off "), Some(false));
        assert_eq!(parse_bool_env("enabled"), Some(true));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn filter_defaults_to_muxchat_crates_at_info() {
        let filter = resolve_env_filter(None, None).to_string();
        assert!(filter.contains("muxchat_relay=info"));
        assert!(filter.contains("muxchat_server=info"));
    }

    #[test]
    fn unparseable_log_level_falls_back_to_rust_log() {
        let filter = resolve_env_filter(
            Some("muxchat_relay=loud".into()),
            Some("muxchat_relay=debug".into()),
        );
        assert!(filter.to_string().contains("muxchat_relay=debug"));
    }

    #[test]
    fn blank_log_level_is_ignored() {
        let filter = resolve_env_filter(Some("  ".into()), None);
        assert!(filter.to_string().contains("muxchat_server=info"));
    }
}
