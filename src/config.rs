use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::DEFAULT_BATCH_SIZE;
use crate::loader::{LoaderParams, DEFAULT_MAX_SKIP_PAGES, DEFAULT_PER_PAGE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendCfg {
    pub base_url: String,
    /// Env var holding the host platform's ID token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: u64,
    /// Fall back to `/api/proxy-image` when a direct image load fails.
    #[serde(default = "yes")]
    pub use_image_proxy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderCfg {
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    #[serde(default = "default_max_skip_pages")]
    pub max_skip_pages: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderCfg {
    #[serde(default = "default_format")]
    pub format: String, // png|jpg|webp
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    pub font_path: Option<PathBuf>,
    #[serde(default)]
    pub thumbnail: bool,
    #[serde(default = "default_thumb_max")]
    pub thumb_max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCfg {
    pub backend: BackendCfg,
    #[serde(default)]
    pub loader: LoaderCfg,
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

fn default_token_env() -> String { "LINE_ID_TOKEN".into() }
fn default_timeout_ms() -> u64 { 15_000 }
fn default_max_image_bytes() -> u64 { 20 * 1024 * 1024 }
fn yes() -> bool { true }
fn default_per_page() -> u32 { DEFAULT_PER_PAGE }
fn default_batch_size() -> usize { DEFAULT_BATCH_SIZE }
fn default_batch_pause_ms() -> u64 { 10 }
fn default_max_skip_pages() -> u32 { DEFAULT_MAX_SKIP_PAGES }
fn default_format() -> String { "png".into() }
fn default_jpeg_quality() -> u8 { 90 }
fn default_thumb_max() -> u32 { 320 }
fn default_out_dir() -> PathBuf { PathBuf::from("out") }

impl Default for BackendCfg {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            token_env: default_token_env(),
            timeout_ms: default_timeout_ms(),
            max_image_bytes: default_max_image_bytes(),
            use_image_proxy: true,
        }
    }
}

impl Default for LoaderCfg {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            max_skip_pages: default_max_skip_pages(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        Self {
            format: default_format(),
            jpeg_quality: default_jpeg_quality(),
            font_path: None,
            thumbnail: false,
            thumb_max: default_thumb_max(),
        }
    }
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            backend: BackendCfg::default(),
            loader: LoaderCfg::default(),
            render: RenderCfg::default(),
            out_dir: default_out_dir(),
        }
    }
}

impl From<&LoaderCfg> for LoaderParams {
    fn from(c: &LoaderCfg) -> Self {
        Self {
            per_page: c.per_page.max(1),
            batch_size: c.batch_size.max(1),
            batch_pause: Duration::from_millis(c.batch_pause_ms),
            max_skip_pages: c.max_skip_pages,
        }
    }
}

impl BackendCfg {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_ms) }

    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.trim().is_empty())
    }
}

impl AppCfg {
    /// Load YAML from `path` if given (defaults otherwise), then apply
    /// `PHRASECARD_*` environment overrides.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let txt = tokio::fs::read_to_string(p)
                    .await
                    .with_context(|| format!("Failed to read config file: {}", p.display()))?;
                serde_yaml::from_str(&txt).context("Failed to parse config YAML")?
            }
            None => AppCfg::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("PHRASECARD_BASE_URL") { self.backend.base_url = v; }
        if let Some(v) = get("PHRASECARD_TOKEN_ENV") { self.backend.token_env = v; }
        if let Some(v) = get("PHRASECARD_PER_PAGE").and_then(|v| v.parse().ok()) { self.loader.per_page = v; }
        if let Some(v) = get("PHRASECARD_BATCH_SIZE").and_then(|v| v.parse().ok()) { self.loader.batch_size = v; }
        if let Some(v) = get("PHRASECARD_OUT_DIR") { self.out_dir = PathBuf::from(v); }
        if let Some(v) = get("PHRASECARD_FONT") { self.render.font_path = Some(PathBuf::from(v)); }
    }
}
