use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Top-level configuration, loaded from `~/.kbdcmd.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Daemon tuning.
    pub daemon: DaemonConfig,
    /// Logging setup.
    pub telemetry: TelemetryConfig,
    /// Window-mark persistence.
    pub marks: MarksConfig,
    /// Snippet trigger → expansion spec. `@date` expands to today's date;
    /// anything else is literal text.
    pub snippets: HashMap<String, String>,
    /// Binding key name → action spec (`cycle`, `open:<path>`,
    /// `open-cycle:<path>`, `desktop:<n>`, `nop`).
    pub bindings: HashMap<String, String>,
}

/// Daemon tuning knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// Keystroke gap, in milliseconds, after which the snippet buffer resets.
    pub staleness_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    /// Write daemon logs to `log_path` instead of stdout.
    pub enabled: bool,
    /// Log file location; `~` expands to the home directory.
    pub log_path: String,
}

/// Window-mark persistence configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MarksConfig {
    /// Mark map location.
    pub file_path: String,
}

impl Config {
    /// Load config from `~/.kbdcmd.toml`, writing the default file first if
    /// none exists.
    ///
    /// # Errors
    /// Fails when the file cannot be read, written, or parsed.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    /// Parse a config from TOML text, for tests and tooling.
    ///
    /// # Errors
    /// Fails on malformed TOML.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("failed to parse config TOML")
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".kbdcmd.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand `~` in paths to the home directory.
    ///
    /// # Errors
    /// Fails when `HOME` is unset.
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

/// Contents written to `~/.kbdcmd.toml` on first run.
pub const DEFAULT_CONFIG: &str = r#"[daemon]
staleness_ms = 400

[telemetry]
enabled = true
log_path = "~/.kbdcmd/daemon.log"

[marks]
file_path = "/tmp/kbdcmd-marks.json"

[snippets]
tdf = "@date"

[bindings]
l = "cycle"
d = "open-cycle:/Applications/kitty.app"
s = "open-cycle:/Applications/Safari.app"
f = "open-cycle:/Applications/Google Chrome.app"
v = "open-cycle:/Applications/Cursor.app"
b = "open:/Applications/Spotify.app"
m = "open-cycle:/System/Applications/Mail.app"
j = "nop"
1 = "desktop:1"
2 = "desktop:2"
3 = "desktop:3"
4 = "desktop:4"
5 = "desktop:5"
6 = "desktop:6"
7 = "desktop:7"
8 = "desktop:8"
9 = "desktop:9"
"#;
