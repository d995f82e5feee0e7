use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Env-var configuration. Every knob has a default that matches the behavior
// of the tool with no environment at all; values that fail to parse fall
// back to the default with a warning.
// ---------------------------------------------------------------------------

pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_BASE_URL: &str = "IMAGEHAUL_BASE_URL";
pub const ENV_SETTLE_MS: &str = "IMAGEHAUL_SETTLE_MS";
pub const ENV_RESULTS_TIMEOUT_SECS: &str = "IMAGEHAUL_RESULTS_TIMEOUT_SECS";
pub const ENV_DOWNLOAD_TIMEOUT_SECS: &str = "IMAGEHAUL_DOWNLOAD_TIMEOUT_SECS";

fn env_u64(key: &str, default: u64) -> u64 {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!("{}={:?} is not a number — using {}", key, raw, default);
            default
        }
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `scraping::browser::find_chrome_executable`).
/// Only returns a value when `CHROME_EXECUTABLE` points at an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if !p.is_empty() && Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

/// Base URL of the image search site. Overridable so the full navigation
/// flow can be pointed at a local fixture server.
pub fn search_base_url() -> String {
    std::env::var(ENV_BASE_URL)
        .ok()
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "https://yandex.com".to_string())
}

/// Layout-settle pause after each scroll instruction.
pub fn settle_pause() -> Duration {
    Duration::from_millis(env_u64(ENV_SETTLE_MS, 1500))
}

/// Bounded wait for the results view to render a recognizable marker.
pub fn results_timeout() -> Duration {
    Duration::from_secs(env_u64(ENV_RESULTS_TIMEOUT_SECS, 10))
}

/// Per-request timeout for a single image download.
pub fn download_timeout() -> Duration {
    Duration::from_secs(env_u64(ENV_DOWNLOAD_TIMEOUT_SECS, 10))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_env() {
        assert_eq!(settle_pause(), Duration::from_millis(1500));
        assert_eq!(results_timeout(), Duration::from_secs(10));
        assert_eq!(download_timeout(), Duration::from_secs(10));
        assert_eq!(search_base_url(), "https://yandex.com");
    }
}
