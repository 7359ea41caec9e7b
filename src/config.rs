use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub shutdown_timeout_secs: u64,
    pub startup_jitter_min_ms: u64,
    pub startup_jitter_max_ms: u64,
    pub http: HttpConfig,
    pub scheduler: SchedulerConfig,
    pub probes: Vec<ProbeConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            shutdown_timeout_secs: 30,
            startup_jitter_min_ms: 0,
            startup_jitter_max_ms: 0,
            http: HttpConfig::default(),
            scheduler: SchedulerConfig::default(),
            probes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub address: String,
    /// Per-request budget; slower requests get 408.
    pub request_timeout_secs: u64,
    /// Overrides the server's advertised teardown deadline.
    pub teardown_timeout_secs: Option<u64>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            teardown_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Cron expression with a leading seconds field.
    pub heartbeat_schedule: String,
    pub teardown_timeout_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_schedule: "0 * * * * *".to_string(),
            teardown_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    pub address: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub teardown_timeout_secs: Option<u64>,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("app-lifecycle")
        .join("config.toml")
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default location if it exists, else
    /// built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = default_config_path();
                if default.exists() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.shutdown_timeout_secs == 0 {
            return Err(AppError::Config(
                "shutdown_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.startup_jitter_min_ms > self.startup_jitter_max_ms {
            return Err(AppError::Config(format!(
                "startup_jitter_min_ms ({}) exceeds startup_jitter_max_ms ({})",
                self.startup_jitter_min_ms, self.startup_jitter_max_ms
            )));
        }
        if self.http.enabled {
            self.http.socket_addr()?;
            if self.http.request_timeout_secs == 0 {
                return Err(AppError::Config(
                    "http.request_timeout_secs must be greater than zero".into(),
                ));
            }
        }
        if self.scheduler.enabled {
            cron::Schedule::from_str(&self.scheduler.heartbeat_schedule).map_err(|e| {
                AppError::Config(format!(
                    "scheduler.heartbeat_schedule {:?}: {}",
                    self.scheduler.heartbeat_schedule, e
                ))
            })?;
        }
        for probe in &self.probes {
            if probe.name.is_empty() || probe.address.is_empty() {
                return Err(AppError::Config(
                    "probes need both a name and an address".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Random delay in `[startup_jitter_min_ms, startup_jitter_max_ms]`.
    pub fn startup_jitter(&self) -> Duration {
        if self.startup_jitter_max_ms == 0 {
            return Duration::ZERO;
        }
        let lo = self.startup_jitter_min_ms.min(self.startup_jitter_max_ms);
        let ms = rand::thread_rng().gen_range(lo..=self.startup_jitter_max_ms);
        Duration::from_millis(ms)
    }
}

impl HttpConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .parse()
            .map_err(|e| AppError::Config(format!("http.address {:?}: {}", self.address, e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn teardown_timeout(&self) -> Option<Duration> {
        self.teardown_timeout_secs.map(Duration::from_secs)
    }
}

impl SchedulerConfig {
    pub fn teardown_timeout(&self) -> Option<Duration> {
        self.teardown_timeout_secs.map(Duration::from_secs)
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Option<Duration> {
        self.teardown_timeout_secs.map(Duration::from_secs)
    }
}
