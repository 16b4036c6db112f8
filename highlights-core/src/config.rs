use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    pub system: SystemSection,
    pub paths: PathsSection,
    pub provider: ProviderSection,
    pub selection: SelectionSection,
    pub search: SearchSection,
    pub download: DownloadSection,
    pub branding: BrandingSection,
    pub ledger: LedgerSection,
}

impl PipelineConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.videos_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.data_dir)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.logs_dir)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.resolve_path(&self.ledger.path)
    }

    /// Branding assets live under `paths.assets_dir` unless given as absolute paths.
    pub fn asset_path<P: AsRef<Path>>(&self, asset: P) -> PathBuf {
        let asset = asset.as_ref();
        if asset.is_absolute() {
            asset.to_path_buf()
        } else {
            self.resolve_path(&self.paths.assets_dir).join(asset)
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.provider.leagues.is_empty() {
            return Err("provider.leagues must list at least one league".into());
        }
        let mut seen = HashSet::new();
        for league in &self.provider.leagues {
            if league.league_id.trim().is_empty() {
                return Err(format!("league for sport {} has an empty id", league.sport));
            }
            if !seen.insert(league.league_id.as_str()) {
                return Err(format!("league {} is configured twice", league.league_id));
            }
        }
        if self.selection.batch_size == 0 {
            return Err("selection.batch_size must be greater than zero".into());
        }
        if self.selection.window_hours < self.selection.primary_window_hours {
            return Err(format!(
                "selection.window_hours ({}) is shorter than primary_window_hours ({})",
                self.selection.window_hours, self.selection.primary_window_hours
            ));
        }
        if self.search.max_results == 0 {
            return Err("search.max_results must be greater than zero".into());
        }
        if self.search.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err("search.keywords must contain a non-empty keyword".into());
        }
        if self.download.retries == 0 || self.download.fragment_retries == 0 {
            return Err("download retries must be greater than zero".into());
        }
        if self.download.attempts == 0 {
            return Err("download.attempts must be greater than zero".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSection {
    pub node_name: String,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub videos_dir: String,
    pub assets_dir: String,
    pub data_dir: String,
    pub logs_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    pub base_url: String,
    pub api_key: String,
    pub endpoint: String,
    pub timeout_seconds: u64,
    pub leagues: Vec<LeagueEntry>,
}

/// One recognized league. Lower `priority` wins ties.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LeagueEntry {
    pub sport: String,
    pub league_id: String,
    pub priority: u32,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Primary,
    Extended,
    #[default]
    Full,
}

impl WindowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowKind::Primary => "primary",
            WindowKind::Extended => "extended",
            WindowKind::Full => "full",
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "primary" => Ok(WindowKind::Primary),
            "extended" => Ok(WindowKind::Extended),
            "full" => Ok(WindowKind::Full),
            other => Err(format!("unknown selection window: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionSection {
    pub window: WindowKind,
    pub primary_window_hours: f64,
    pub window_hours: f64,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    pub binary: String,
    pub max_results: usize,
    pub keywords: Vec<String>,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub delay_range_ms: [u64; 2],
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadSection {
    pub binary: String,
    pub max_height: u32,
    #[serde(default)]
    pub format: Option<String>,
    pub retries: u32,
    pub fragment_retries: u32,
    pub attempts: u32,
    pub retry_delay_seconds: [u32; 2],
    #[serde(default)]
    pub cookies_file: Option<String>,
    #[serde(default)]
    pub archive_file: Option<String>,
    #[serde(default)]
    pub no_check_certificates: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrandingMode {
    #[default]
    TwoStage,
    SinglePass,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrandingSection {
    pub mode: BrandingMode,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub logo: String,
    #[serde(default)]
    pub subscribe_image: Option<String>,
    pub subscribe_clip: String,
    pub logo_margin: u32,
    pub divider_y: u32,
    pub divider_color: String,
    #[serde(default)]
    pub subscribe_image_from_seconds: Option<u32>,
    pub video_codec: String,
    pub audio_codec: String,
    pub pixel_format: String,
    #[serde(default)]
    pub keep_raw_on_failure: bool,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSection {
    pub path: String,
}

pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let path = path.as_ref();
    let config: PipelineConfig = load_toml(path)?;
    config.validate().map_err(|reason| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
