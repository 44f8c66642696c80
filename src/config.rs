use std::{collections::BTreeSet, fs, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::GpioError;
use crate::gpio::{PinNumber, RegistryConfig};

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }
}

impl FromStr for Direction {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::Input),
            "out" => Ok(Direction::Output),
            other => Err(GpioError::InvalidDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Edge {
    None,
    Rising,
    Falling,
    Both,
}

impl Default for Edge {
    fn default() -> Self {
        Edge::None
    }
}

impl Edge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edge::None => "none",
            Edge::Rising => "rising",
            Edge::Falling => "falling",
            Edge::Both => "both",
        }
    }

    /// Whether a transition on this edge wakes the event loop.
    pub fn is_triggering(&self) -> bool {
        !matches!(self, Edge::None)
    }
}

impl FromStr for Edge {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Edge::None),
            "rising" => Ok(Edge::Rising),
            "falling" => Ok(Edge::Falling),
            "both" => Ok(Edge::Both),
            other => Err(GpioError::InvalidEdge(other.to_string())),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForwardConfig {
    pub url: String,
    pub id: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    pub forward: ForwardConfig,
    pub enabled_pins: Vec<PinNumber>,
    #[serde(default = "default_edge")]
    pub edge: Edge,
    #[serde(default)]
    pub active_low: bool,
}

fn default_timeout() -> u64 {
    10
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_ROOT)
}

fn default_edge() -> Edge {
    Edge::Both
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            forward: ForwardConfig {
                url: "http://ops.voltserver.dev/ioboard-http".to_string(),
                id: "http-ioboard0".to_string(),
                timeout: default_timeout(),
            },
            enabled_pins: vec![1, 2, 3],
            edge: default_edge(),
            active_low: false,
        }
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GpioError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| GpioError::Config(format!("Failed to read config: {e}")))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .map_err(|e| GpioError::Config(format!("Invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), GpioError> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| GpioError::Config(format!("Failed to encode config: {e}")))?;
        fs::write(&path, contents)
            .map_err(|e| GpioError::Config(format!("Failed to write config: {e}")))
    }

    fn validate(&self) -> Result<(), GpioError> {
        if self.enabled_pins.contains(&0) {
            return Err(GpioError::Config("pin numbers must be positive".into()));
        }
        // every enabled pin carries the forwarder as callback, so it needs a triggering edge
        if !self.edge.is_triggering() {
            return Err(GpioError::InvalidEdge(self.edge.as_str().to_string()));
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            available_pins: self.enabled_pins.iter().copied().collect::<BTreeSet<_>>(),
        }
    }
}
