//! Configuration for Vitrine
//!
//! Loads configuration from TOML file at `~/.config/vitrine/config.toml`
//! Auto-generates default config file on first run if missing.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::renderer::{AcceptPolicy, DEFAULT_MAX_PENDING};
use crate::wm::Settings;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub placement: PlacementConfig,
    pub pixmaps: PixmapConfig,
    pub renderer: RendererConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from the default location, or use defaults if the
    /// file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            info!("Config file not found at {:?}, using defaults", config_path);
            // Auto-generate default config file
            if let Err(e) = Self::save_default(&config_path) {
                warn!("Failed to create default config file: {}", e);
            }
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path; the file must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;

        info!("Configuration loaded from {:?}", path);
        debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the path to the config file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("vitrine");

        Ok(config_dir.join("config.toml"))
    }

    /// Save default configuration to file
    fn save_default(path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let toml_string = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default config")?;

        fs::write(path, toml_string).context("Failed to write default config file")?;

        info!("Created default config file at {:?}", path);
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            min_offset: self.placement.min_offset,
            free_pixmap_on_unmap: self.pixmaps.free_on_unmap,
        }
    }

    pub fn accept_policy(&self) -> AcceptPolicy {
        AcceptPolicy {
            accept_override_redirect: self.renderer.accept_override_redirect,
            min_size: self.renderer.min_size,
        }
    }
}

/// Output surface configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Overlay width; the screen width when unset
    pub width: Option<u16>,
    /// Overlay height; the screen height when unset
    pub height: Option<u16>,
    /// Window id of the host surface
    pub host_window: Option<u32>,
}

impl OutputConfig {
    /// Overlay size, falling back to `screen` for unset dimensions
    pub fn size(&self, screen: (u16, u16)) -> (u16, u16) {
        (
            self.width.unwrap_or(screen.0),
            self.height.unwrap_or(screen.1),
        )
    }
}

/// Window placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Smallest x and y a client may configure itself to
    pub min_offset: i16,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_offset: Settings::default().min_offset,
        }
    }
}

/// Backing pixmap policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixmapConfig {
    /// Free a window's pixmap on unmap instead of keeping it until resize
    pub free_on_unmap: bool,
}

impl Default for PixmapConfig {
    fn default() -> Self {
        Self {
            free_on_unmap: Settings::default().free_pixmap_on_unmap,
        }
    }
}

/// Renderer connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Socket path; `$XDG_RUNTIME_DIR/vitrine.sock` when unset
    pub socket: Option<PathBuf>,
    pub accept_override_redirect: bool,
    pub min_size: u16,
    /// Unsent bytes tolerated before the renderer counts as stalled
    pub max_pending: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        let policy = AcceptPolicy::default();
        Self {
            socket: None,
            accept_override_redirect: policy.accept_override_redirect,
            min_size: policy.min_size,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl RendererConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.socket.clone().unwrap_or_else(vitrine_ipc::socket_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is not set
    pub filter: Option<String>,
}
