use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra passes over the failures of the previous pass (0 = no retry).
    pub passes: u32,
    /// Base delay in seconds before the first retry pass (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum delay between passes in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            passes: 0,
            base_delay_secs: 1.0,
            max_delay_secs: 30,
        }
    }
}

/// Transfer driver: one tokio task per transfer, or a single loop stepping every
/// transfer one chunk at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferBackend {
    #[default]
    Tasks,
    Stepped,
}

/// A family of hosts named `<prefix>01`..`<prefix><count>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    pub prefix: String,
    pub count: u32,
}

impl HostGroup {
    /// Host names of the group, numbered from 1 and zero-padded to two digits.
    pub fn expand(&self) -> Vec<String> {
        (1..=self.count)
            .map(|i| format!("{}{:02}", self.prefix, i))
            .collect()
    }
}

/// Global configuration loaded from `~/.config/hopfleet/config.toml`.
/// Keys missing from the file take their `Default` values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HopfleetConfig {
    /// Login name on relays and targets. `None` = `$USER`.
    pub username: Option<String>,
    /// Relay (first hop) host names.
    pub relays: Vec<String>,
    /// Individually listed target hosts.
    pub hosts: Vec<String>,
    /// Target host families expanded by `HostGroup::expand`.
    pub host_groups: Vec<HostGroup>,
    /// Private key for the relay hop. A leading `~/` is expanded.
    pub relay_key_path: PathBuf,
    /// Private key for the target hop. A leading `~/` is expanded.
    pub target_key_path: PathBuf,
    /// SSH port on relays and targets.
    pub port: u16,
    /// Handshake timeout per hop, in seconds.
    pub connect_timeout_secs: u64,
    /// Deadline for each read of remote output, in seconds. 0 disables it.
    pub read_timeout_secs: u64,
    /// Hosts (or downloads) processed per wave.
    pub wave_size: usize,
    /// Bytes read per transfer step.
    pub chunk_size: usize,
    /// Ask both hops for zlib compression.
    pub compression: bool,
    /// Transfer driver. Missing = tasks.
    pub transfer_backend: Option<TransferBackend>,
    /// Optional retry policy; if missing, built-in defaults are used.
    pub retry: Option<RetryConfig>,
}

impl Default for HopfleetConfig {
    fn default() -> Self {
        Self {
            username: None,
            relays: Vec::new(),
            hosts: Vec::new(),
            host_groups: Vec::new(),
            relay_key_path: PathBuf::from("~/.ssh/id_ed25519"),
            target_key_path: PathBuf::from("~/.ssh/id_ed25519"),
            port: 22,
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            wave_size: 20,
            chunk_size: 4096,
            compression: true,
            transfer_backend: None,
            retry: None,
        }
    }
}

impl HopfleetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    pub fn backend(&self) -> TransferBackend {
        self.transfer_backend.unwrap_or_default()
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    /// Configured username, else `$USER`.
    pub fn resolved_username(&self) -> Result<String> {
        match &self.username {
            Some(u) => Ok(u.clone()),
            None => std::env::var("USER").context("username not configured and $USER is unset"),
        }
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.wave_size == 0 {
            anyhow::bail!("wave_size must be at least 1");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be at least 1");
        }
        if self.relays.is_empty() {
            anyhow::bail!("no relays configured");
        }
        if let Some(retry) = &self.retry {
            let base = retry.base_delay_secs;
            if !base.is_finite() || base < 0.0 {
                anyhow::bail!("retry.base_delay_secs must be a finite, non-negative number (got {base})");
            }
        }
        Ok(())
    }
}

/// Expand a leading `~/` using `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hopfleet")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HopfleetConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HopfleetConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit file.
pub fn load_from_path(path: &Path) -> Result<HopfleetConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: HopfleetConfig =
        toml::from_str(&data).with_context(|| format!("invalid config: {}", path.display()))?;
    Ok(cfg)
}
