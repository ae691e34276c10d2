//! Provider configuration
//!
//! The configuration is persisted as JSON using the key names of the plugin
//! settings surface (`API_URL`, `token`, `DEFAULT_SPEAKER`, ...). At runtime it lives
//! in a [`ConfigStore`], which hands out immutable snapshots so that a call in flight
//! never observes a half-applied update.

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, TtsBridgeError};

const CONFIG_FILENAME: &str = "tts_bridge_config.json";

/// Wire schema and auth style of the remote synthesis service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderProfile {
    /// Gradio `/run/predict` endpoint with positional arguments, no auth
    LegacyV1,
    /// JSON knob schema with an `access_token` field in the body
    TokenQuery,
    /// JSON knob schema with an `Authorization: Bearer` header
    BearerAuth,
}

impl Default for ProviderProfile {
    fn default() -> Self {
        ProviderProfile::LegacyV1
    }
}

impl ProviderProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderProfile::LegacyV1 => "legacy_v1",
            ProviderProfile::TokenQuery => "token_query",
            ProviderProfile::BearerAuth => "bearer_auth",
        }
    }

    /// Request timeout used when `TIMEOUT` is not set
    pub fn default_timeout(&self) -> Duration {
        match self {
            ProviderProfile::LegacyV1 => Duration::from_secs(30),
            ProviderProfile::TokenQuery => Duration::from_secs(100),
            ProviderProfile::BearerAuth => Duration::from_secs(10),
        }
    }
}

/// Inclusive numeric range; a missing side is unbounded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Range {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Range {
    pub const fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub const fn unit() -> Self {
        Self::new(Some(0.0), Some(1.0))
    }
}

/// Declared ranges for every bounded synthesis parameter
///
/// Missing entries and missing sides keep their defaults; an explicit `null` side
/// removes that limit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "BoundsFile")]
pub struct ParamBounds {
    pub sdp_ratio: Range,
    pub noise_scale: Range,
    pub noise_scale_w: Range,
    pub length_scale: Range,
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self {
            sdp_ratio: Range::unit(),
            noise_scale: Range::unit(),
            noise_scale_w: Range::unit(),
            length_scale: Range::new(Some(0.0), None),
        }
    }
}

/// `BOUNDS` as written in the config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BoundsFile {
    sdp_ratio: RangeFile,
    noise_scale: RangeFile,
    noise_scale_w: RangeFile,
    length_scale: RangeFile,
}

/// Outer `None`: side absent; `Some(None)`: explicit `null`
#[derive(Debug, Default, Deserialize)]
struct RangeFile {
    #[serde(default, deserialize_with = "present")]
    min: Option<Option<f64>>,
    #[serde(default, deserialize_with = "present")]
    max: Option<Option<f64>>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

impl RangeFile {
    fn over(self, default: Range) -> Range {
        Range::new(self.min.unwrap_or(default.min), self.max.unwrap_or(default.max))
    }
}

impl From<BoundsFile> for ParamBounds {
    fn from(file: BoundsFile) -> Self {
        let defaults = ParamBounds::default();
        Self {
            sdp_ratio: file.sdp_ratio.over(defaults.sdp_ratio),
            noise_scale: file.noise_scale.over(defaults.noise_scale),
            noise_scale_w: file.noise_scale_w.over(defaults.noise_scale_w),
            length_scale: file.length_scale.over(defaults.length_scale),
        }
    }
}

/// Process-wide provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Base URL of the synthesis service
    #[serde(rename = "API_URL")]
    pub base_url: String,

    /// Access token; embedded in the body or sent as bearer depending on profile
    #[serde(rename = "token")]
    pub auth_token: String,

    #[serde(rename = "PROFILE")]
    pub profile: ProviderProfile,

    #[serde(rename = "DEFAULT_MODEL")]
    pub default_model: Option<String>,

    #[serde(rename = "DEFAULT_SPEAKER")]
    pub default_speaker: String,

    #[serde(rename = "DEFAULT_emotion")]
    pub default_emotion: Option<String>,

    #[serde(rename = "DEFAULT_SDP_RATIO")]
    pub default_sdp_ratio: f64,

    #[serde(rename = "DEFAULT_NOISE_SCALE")]
    pub default_noise_scale: f64,

    #[serde(rename = "DEFAULT_NOISE_SCALE_W")]
    pub default_noise_scale_w: f64,

    #[serde(rename = "DEFAULT_LENGTH_SCALE")]
    pub default_length_scale: f64,

    #[serde(rename = "BOUNDS")]
    pub bounds: ParamBounds,

    /// Synthesis request timeout in seconds; profile default when absent
    #[serde(rename = "TIMEOUT")]
    pub timeout_secs: Option<u64>,

    /// Audio download timeout in seconds; falls back to the request timeout
    #[serde(rename = "DOWNLOAD_TIMEOUT")]
    pub download_timeout_secs: Option<u64>,

    /// Total attempts of the whole pipeline for retryable failures
    #[serde(rename = "HTTP_RETRY_COUNT")]
    pub retry_count: u32,

    /// Debug switch: keep downloaded audio on disk
    #[serde(rename = "KEEP_TMP_FILE")]
    pub keep_tmp_file: bool,

    /// Directory for downloaded audio; system temp dir when absent
    #[serde(rename = "TMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// In push mode send the provider URL instead of the downloaded bytes
    #[serde(rename = "PUSH_SOURCE_URL")]
    pub push_source_url: bool,

    #[serde(rename = "LOG_LEVEL")]
    pub log_level: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aiboycoder-hoyotts.ms.show/".to_string(),
            auth_token: String::new(),
            profile: ProviderProfile::default(),
            default_model: None,
            default_speaker: "莱依拉".to_string(),
            default_emotion: None,
            default_sdp_ratio: 0.2,
            default_noise_scale: 0.6,
            default_noise_scale_w: 0.8,
            default_length_scale: 1.0,
            bounds: ParamBounds::default(),
            timeout_secs: None,
            download_timeout_secs: None,
            retry_count: 3,
            keep_tmp_file: false,
            temp_dir: None,
            push_source_url: false,
            log_level: "INFO".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.profile.default_timeout())
    }

    pub fn download_timeout(&self) -> Duration {
        self.download_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.timeout())
    }

    /// Load configuration from disk, writing defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = ProviderConfig::default();
            config.save(path)?;
            return Ok(config);
        }

        let json = fs::read_to_string(path).map_err(|e| {
            TtsBridgeError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&json).map_err(|e| {
            TtsBridgeError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Save configuration to disk
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    TtsBridgeError::Configuration(format!(
                        "Failed to create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| {
            TtsBridgeError::Configuration(format!("Failed to write {}: {}", path.display(), e))
        })
    }
}

/// Default location of the persisted configuration
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tts-bridge")
        .join(CONFIG_FILENAME)
}

/// Live configuration shared by all calls
///
/// Readers take an `Arc` snapshot; writers replace the whole snapshot. When bound to
/// a file, every update is persisted before it becomes visible.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<ProviderConfig>>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            path: None,
        }
    }

    /// Load from `path` and persist later updates back to it
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = ProviderConfig::load(&path)?;
        log::info!("Loaded TTS configuration from {}", path.display());
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            path: Some(path),
        })
    }

    pub fn snapshot(&self) -> Arc<ProviderConfig> {
        self.current.read().clone()
    }

    /// Apply `change` to a copy of the current config and publish it
    pub fn update<F>(&self, change: F) -> Result<Arc<ProviderConfig>>
    where
        F: FnOnce(&mut ProviderConfig),
    {
        let mut guard = self.current.write();
        let mut next = (**guard).clone();
        change(&mut next);

        if let Some(path) = &self.path {
            next.save(path)?;
        }

        let next = Arc::new(next);
        *guard = next.clone();
        Ok(next)
    }

    /// Re-read the bound file, picking up edits made by another process
    pub fn reload(&self) -> Result<Arc<ProviderConfig>> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot());
        };
        let next = Arc::new(ProviderConfig::load(path)?);
        *self.current.write() = next.clone();
        Ok(next)
    }

    pub fn set_default_model(&self, model: impl Into<String>) -> Result<()> {
        let model = model.into();
        self.update(|c| c.default_model = Some(model)).map(|_| ())
    }

    pub fn set_default_speaker(&self, speaker: impl Into<String>) -> Result<()> {
        let speaker = speaker.into();
        self.update(|c| c.default_speaker = speaker).map(|_| ())
    }

    pub fn set_default_emotion(&self, emotion: impl Into<String>) -> Result<()> {
        let emotion = emotion.into();
        self.update(|c| c.default_emotion = Some(emotion)).map(|_| ())
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ProviderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_plugin_settings() {
        let config = ProviderConfig::default();
        assert_eq!(config.default_speaker, "莱依拉");
        assert_eq!(config.default_sdp_ratio, 0.2);
        assert_eq!(config.retry_count, 3);
        assert!(!config.keep_tmp_file);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.download_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_timeout_override() {
        let config = ProviderConfig {
            profile: ProviderProfile::TokenQuery,
            ..ProviderConfig::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(100));

        let config = ProviderConfig {
            timeout_secs: Some(5),
            download_timeout_secs: Some(7),
            ..config
        };
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.download_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn test_parse_settings_keys() {
        let json = r#"{
            "API_URL": "http://127.0.0.1:9880/",
            "token": "secret",
            "PROFILE": "bearer_auth",
            "DEFAULT_SPEAKER": "胡桃",
            "DEFAULT_emotion": "开心",
            "HTTP_RETRY_COUNT": 5,
            "KEEP_TMP_FILE": true
        }"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9880/");
        assert_eq!(config.auth_token, "secret");
        assert_eq!(config.profile, ProviderProfile::BearerAuth);
        assert_eq!(config.default_speaker, "胡桃");
        assert_eq!(config.default_emotion.as_deref(), Some("开心"));
        assert_eq!(config.retry_count, 5);
        assert!(config.keep_tmp_file);
        // unspecified keys keep their defaults
        assert_eq!(config.default_noise_scale, 0.6);
        assert_eq!(config.bounds, ParamBounds::default());
    }

    #[test]
    fn test_load_creates_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILENAME);

        let config = ProviderConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.default_speaker, ProviderConfig::default().default_speaker);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        fs::write(&path, "{ not json").unwrap();

        let err = ProviderConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_store_update_persists_and_keeps_old_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let store = ConfigStore::open(&path).unwrap();

        let before = store.snapshot();
        store.set_default_speaker("纳西妲").unwrap();
        store.set_default_model("genshin-v2").unwrap();

        assert_eq!(before.default_speaker, "莱依拉");
        assert_eq!(store.snapshot().default_speaker, "纳西妲");
        assert_eq!(store.snapshot().default_model.as_deref(), Some("genshin-v2"));

        let reopened = ConfigStore::open(&path).unwrap();
        assert_eq!(reopened.snapshot().default_speaker, "纳西妲");
    }

    #[test]
    fn test_reload_picks_up_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let store = ConfigStore::open(&path).unwrap();

        let edited = ProviderConfig {
            default_emotion: Some("难过".to_string()),
            ..ProviderConfig::default()
        };
        edited.save(&path).unwrap();

        let config = store.reload().unwrap();
        assert_eq!(config.default_emotion.as_deref(), Some("难过"));
    }

    #[test]
    fn test_partial_bounds_keep_default_sides() {
        let json = r#"{
            "BOUNDS": {
                "sdp_ratio": { "max": 2 },
                "noise_scale": { "min": null },
                "length_scale": { "max": 5.0 }
            }
        }"#;
        let config: ProviderConfig = serde_json::from_str(json).unwrap();
        let bounds = &config.bounds;

        assert_eq!(bounds.sdp_ratio, Range::new(Some(0.0), Some(2.0)));
        assert_eq!(bounds.noise_scale, Range::new(None, Some(1.0)));
        assert_eq!(bounds.noise_scale_w, Range::unit());
        assert_eq!(bounds.length_scale, Range::new(Some(0.0), Some(5.0)));
    }

    #[test]
    fn test_bounds_survive_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        let mut config = ProviderConfig::default();
        config.bounds.sdp_ratio = Range::new(Some(0.1), Some(0.9));
        config.save(&path).unwrap();

        let loaded = ProviderConfig::load(&path).unwrap();
        assert_eq!(loaded.bounds, config.bounds);
        // an unbounded side is written as null and read back as unbounded
        assert_eq!(loaded.bounds.length_scale.max, None);
    }
}
