use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where and how verbosely the connector logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    /// Level for this crate's own targets
    #[serde(default = "default_level")]
    pub level: String,
    /// Level for every other target (tokio, dependencies)
    #[serde(default = "default_dependency_level")]
    pub dependency_level: String,
    /// Extra `target=level` directives, e.g. for a single module
    #[serde(default)]
    pub directives: Vec<String>,
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    /// "daily", "hourly", "minutely" or "never"
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            dependency_level: default_dependency_level(),
            directives: Vec::new(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Reconciliation timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Delay before the first reconciliation, gives the scanner time to fill its cache
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            period_ms: default_period_ms(),
        }
    }
}

/// Switches for legacy link-protocol quirks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilitySettings {
    /// Re-run service discovery after the body sensor location step
    #[serde(default = "default_true")]
    pub rediscover_after_location_read: bool,
    /// Tear the link down when notification registration is rejected
    #[serde(default = "default_false")]
    pub close_on_registration_failure: bool,
}

impl Default for CompatibilitySettings {
    fn default() -> Self {
        Self {
            rediscover_after_location_read: default_true(),
            close_on_registration_failure: default_false(),
        }
    }
}

/// Behaviour of the in-process peripheral simulator used by the demo binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSettings {
    #[serde(default = "default_baseline_bpm")]
    pub baseline_bpm: u16,
    #[serde(default = "default_notification_interval_ms")]
    pub notification_interval_ms: u64,
    /// Latency applied to every simulated transport completion
    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,
    #[serde(default = "default_true")]
    pub report_energy_expended: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            baseline_bpm: default_baseline_bpm(),
            notification_interval_ms: default_notification_interval_ms(),
            response_delay_ms: default_response_delay_ms(),
            report_energy_expended: default_true(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    #[serde(default)]
    pub compatibility: CompatibilitySettings,

    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    #[serde(default)]
    pub simulator: SimulatorSettings,
}

fn default_level() -> String {
    "info".to_string()
}
fn default_dependency_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "heart_rate_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_initial_delay_ms() -> u64 {
    10_000
}
fn default_period_ms() -> u64 {
    10_000
}
fn default_baseline_bpm() -> u16 {
    68
}
fn default_notification_interval_ms() -> u64 {
    1000
}
fn default_response_delay_ms() -> u64 {
    50
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults when it is missing or unreadable
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("HeartRateLink");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}
