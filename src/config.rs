//! Application-level configuration loading: round timings, batch limits and history storage.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::animator::AnimatorParams;

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "COIN_TOSS_CONFIG_PATH";
/// Default location of the persisted toss history.
const DEFAULT_HISTORY_PATH: &str = "data/toss-history.json";

/// Timings and limits driving the game engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// How long an outcome or error message stays visible.
    pub message_duration: Duration,
    /// How long the result source may take before the round fails.
    pub request_timeout: Duration,
    /// Delay between the landing event and the landing sound cue.
    pub landing_cue_delay: Duration,
    /// Period of the animation frame clock.
    pub frame_interval: Duration,
    /// Largest accepted batch size.
    pub batch_max: u32,
    /// Number of history entries kept.
    pub history_capacity: usize,
    /// Settle simulation tunables.
    pub animator: AnimatorParams,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            message_duration: Duration::from_millis(2_500),
            request_timeout: Duration::from_millis(8_000),
            landing_cue_delay: Duration::from_millis(700),
            frame_interval: Duration::from_millis(16),
            batch_max: 50,
            history_capacity: 50,
            animator: AnimatorParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Engine timings.
    pub game: GameConfig,
    /// Bounds of the simulated result source delay.
    pub result_delay: (Duration, Duration),
    /// Default number of history entries per page.
    pub history_page_size: usize,
    /// History file; `None` keeps the history in memory only.
    pub history_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            result_delay: (Duration::from_millis(500), Duration::from_millis(1_500)),
            history_page_size: 10,
            history_path: Some(PathBuf::from(DEFAULT_HISTORY_PATH)),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON configuration document; absent fields keep their defaults.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    message_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    min_spin_ms: Option<u64>,
    landing_cue_delay_ms: Option<u64>,
    frame_interval_ms: Option<u64>,
    batch_max: Option<u32>,
    history_capacity: Option<usize>,
    history_page_size: Option<usize>,
    #[serde(deserialize_with = "explicit_option")]
    history_path: Option<Option<PathBuf>>,
    result_delay_min_ms: Option<u64>,
    result_delay_max_ms: Option<u64>,
}

/// Distinguish an explicit `null` (persistence disabled) from an absent key.
fn explicit_option<'de, D>(deserializer: D) -> Result<Option<Option<PathBuf>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<PathBuf>::deserialize(deserializer).map(Some)
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let ms = Duration::from_millis;

        let mut game = defaults.game;
        if let Some(value) = raw.message_ms {
            game.message_duration = ms(value);
        }
        if let Some(value) = raw.request_timeout_ms {
            game.request_timeout = ms(value);
        }
        if let Some(value) = raw.min_spin_ms {
            game.animator.min_spin = ms(value);
        }
        if let Some(value) = raw.landing_cue_delay_ms {
            game.landing_cue_delay = ms(value);
        }
        if let Some(value) = raw.frame_interval_ms {
            game.frame_interval = ms(value.max(1));
        }
        if let Some(value) = raw.batch_max {
            game.batch_max = value.max(1);
        }
        if let Some(value) = raw.history_capacity {
            game.history_capacity = value.max(1);
        }

        let min = raw
            .result_delay_min_ms
            .map(ms)
            .unwrap_or(defaults.result_delay.0);
        let max = raw
            .result_delay_max_ms
            .map(ms)
            .unwrap_or(defaults.result_delay.1)
            .max(min);

        Self {
            game,
            result_delay: (min, max),
            history_page_size: raw
                .history_page_size
                .unwrap_or(defaults.history_page_size)
                .max(1),
            history_path: raw.history_path.unwrap_or(defaults.history_path),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
