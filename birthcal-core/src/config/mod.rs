//! Application configuration.
//!
//! Read from `~/.config/birthcal/config.toml` (or an explicit path) and
//! overlaid by `BIRTHCAL_*` environment variables, using `__` between
//! section and key, e.g. `BIRTHCAL_SOURCE__PASSWORD`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::constants::{
    DEFAULT_PORT, DEFAULT_REFRESH_MINUTES, DEFAULT_REMINDER_VALUE, MAX_REFRESH_MINUTES,
};
use crate::error::{BirthcalError, BirthcalResult};
use crate::fetch::validate_url;
use crate::reminder::{ReminderDirection, ReminderSettings, ReminderTrigger, ReminderUnit};
use crate::sync::{SourceMode, SyncConfig};

const ENV_PREFIX: &str = "BIRTHCAL";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceSection,
    pub server: ServerSection,
    pub sync: SyncSection,
    pub reminder: ReminderSection,
}

/// Where contacts come from.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub mode: SourceMode,
    /// Local `.vcf` file, `~` is expanded.
    pub path: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

// Keep the password out of debug logs
impl fmt::Debug for SourceSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSection")
            .field("mode", &self.mode)
            .field("path", &self.path)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: i64,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection {
            port: DEFAULT_PORT as i64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub refresh_interval_minutes: i64,
}

impl Default for SyncSection {
    fn default() -> Self {
        SyncSection {
            refresh_interval_minutes: DEFAULT_REFRESH_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderSection {
    pub enabled: bool,
    pub value: u32,
    pub unit: ReminderUnit,
    pub direction: ReminderDirection,
    /// Raw ISO 8601 trigger; takes precedence over the fields above.
    pub trigger: Option<String>,
}

impl Default for ReminderSection {
    fn default() -> Self {
        ReminderSection {
            enabled: false,
            value: DEFAULT_REMINDER_VALUE,
            unit: ReminderUnit::default(),
            direction: ReminderDirection::default(),
            trigger: None,
        }
    }
}

impl AppConfig {
    pub fn config_path() -> BirthcalResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| BirthcalError::Config("Could not determine config directory".into()))?
            .join("birthcal");

        Ok(config_dir.join("config.toml"))
    }

    /// Load the configuration.
    ///
    /// With no explicit path the default location is used, and a commented
    /// template is written there on first run. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> BirthcalResult<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    Self::create_default_config(&path)?;
                }
                (path, false)
            }
        };

        Self::from_file(&path, required)
    }

    fn from_file(path: &Path, required: bool) -> BirthcalResult<Self> {
        Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BirthcalError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| BirthcalError::Config(e.to_string()))
    }

    /// Parse a TOML document, without environment overrides.
    pub fn from_toml(contents: &str) -> BirthcalResult<Self> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .map_err(|e| BirthcalError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| BirthcalError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> BirthcalResult<()> {
        let contents = format!(
            "\
# birthcal configuration

[source]
# Where contacts are read from: \"local\" or \"web\"
# mode = \"local\"
# path = \"~/contacts.vcf\"
# url = \"https://dav.example.com/addressbooks/me/contacts/?export\"
# username = \"\"
# password = \"\"

[server]
# port = {DEFAULT_PORT}

[sync]
# refresh_interval_minutes = {DEFAULT_REFRESH_MINUTES}

[reminder]
# enabled = false
# value = {DEFAULT_REMINDER_VALUE}
# unit = \"days\"        # days, hours or minutes
# direction = \"before\" # before or after
# Or an explicit ISO 8601 trigger:
# trigger = \"-P1D\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BirthcalError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| BirthcalError::Config(format!("Could not write config file: {e}")))?;

        tracing::info!(path = %path.display(), "Created default configuration");

        Ok(())
    }

    pub fn port(&self) -> BirthcalResult<u16> {
        u16::try_from(self.server.port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| {
                BirthcalError::Config(format!(
                    "server port {} is out of range (1-65535)",
                    self.server.port
                ))
            })
    }

    /// Time between scheduled syncs; non-positive values fall back to the default.
    pub fn refresh_interval(&self) -> Duration {
        let minutes = match self.sync.refresh_interval_minutes {
            m if m > 0 => m.min(MAX_REFRESH_MINUTES),
            _ => DEFAULT_REFRESH_MINUTES,
        };
        Duration::from_secs((minutes as u64).saturating_mul(60))
    }

    /// The alarm trigger to attach to events, if any.
    ///
    /// An explicit `trigger` wins; otherwise `enabled` turns the
    /// value/unit/direction settings into one.
    pub fn reminder_trigger(&self) -> BirthcalResult<Option<ReminderTrigger>> {
        let section = &self.reminder;

        if let Some(raw) = section.trigger.as_deref().filter(|t| !t.trim().is_empty()) {
            return ReminderTrigger::parse(raw).map(Some);
        }

        if !section.enabled {
            return Ok(None);
        }

        let settings = ReminderSettings {
            value: section.value,
            unit: section.unit,
            direction: section.direction,
        };
        Ok(Some(settings.to_trigger()))
    }

    /// Validated settings for the sync pipeline.
    pub fn sync_config(&self) -> BirthcalResult<SyncConfig> {
        let source = &self.source;
        let mut config = SyncConfig {
            mode: source.mode,
            reminder: self.reminder_trigger()?,
            ..SyncConfig::default()
        };

        match source.mode {
            SourceMode::Local => {
                if source.path.trim().is_empty() {
                    return Err(BirthcalError::Config(
                        "source.path is required for local mode".into(),
                    ));
                }
                config.local_path = PathBuf::from(shellexpand::tilde(source.path.trim()).into_owned());
            }
            SourceMode::Web => {
                if source.url.trim().is_empty() {
                    return Err(BirthcalError::Config(
                        "source.url is required for web mode".into(),
                    ));
                }
                validate_url(source.url.trim())
                    .map_err(|e| BirthcalError::Config(format!("source.url: {e}")))?;
                config.web_url = source.url.trim().to_string();
                config.web_user = source.username.clone();
                config.web_password = source.password.clone();
            }
        }

        Ok(config)
    }
}
