//! Layered configuration and path helpers.
//!
//! Figment merges `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_STORE__URL`). [`Settings`] is the
//! typed view every binary builds its services from.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    /// Load from `dir/config.toml` and the overlay for `env_name`.
    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            other => tracing::debug!(env = other, "no overlay for environment"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("failed to get '{key}': {e}")))
    }

    /// Typed settings, defaults filled in, validated.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Lance,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// LanceDB directory or Qdrant URL.
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    pub query_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub upload_batch_size: usize,
    pub max_retries: usize,
    pub retry_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Lance,
            url: "./data/lancedb".into(),
            api_key: None,
            collection: "nasa_corpus_v1".into(),
            query_timeout_secs: 90,
            write_timeout_secs: 120,
            upload_batch_size: 64,
            max_retries: 5,
            retry_backoff_ms: 2000,
        }
    }
}

impl StoreSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pooling {
    Cls,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub dense_model_dir: String,
    pub sparse_model_dir: String,
    pub dense_dim: usize,
    pub sparse_top_k: usize,
    pub max_len: usize,
    pub batch_size: usize,
    pub pooling: Pooling,
    pub use_fake: bool,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            dense_model_dir: "./models/bge-small-en-v1.5".into(),
            sparse_model_dir: "./models/splade-cocondenser-ensembledistil".into(),
            dense_dim: 384,
            sparse_top_k: 200,
            max_len: 256,
            batch_size: 16,
            pooling: Pooling::Cls,
            use_fake: false,
        }
    }
}

impl EncoderSettings {
    /// `use_fake` or `APP_USE_FAKE_EMBEDDINGS=1`.
    pub fn fake_requested(&self) -> bool {
        self.use_fake || env::var("APP_USE_FAKE_EMBEDDINGS").map(|v| v == "1").unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-2.5-flash".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
            max_output_tokens: 2048,
            temperature: 0.2,
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 15 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireShape {
    /// Shape A: citations are URL strings, integer `confidence_score`.
    #[default]
    Urls,
    /// Shape B: citation objects, boolean `confident`.
    Objects,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerSettings {
    pub shape: WireShape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    pub serpapi_key: String,
    pub max_images: usize,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self { serpapi_key: String::new(), max_images: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub ttl_secs: u64,
    pub max_sessions: usize,
    pub history_window: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self { ttl_secs: 3600, max_sessions: 1000, history_window: 5 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub encoder: EncoderSettings,
    pub llm: LlmSettings,
    pub retrieval: RetrievalSettings,
    pub answer: AnswerSettings,
    pub images: ImageSettings,
    pub session: SessionSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("store.upload_batch_size", self.store.upload_batch_size),
            ("store.max_retries", self.store.max_retries),
            ("encoder.dense_dim", self.encoder.dense_dim),
            ("encoder.sparse_top_k", self.encoder.sparse_top_k),
            ("encoder.max_len", self.encoder.max_len),
            ("encoder.batch_size", self.encoder.batch_size),
            ("retrieval.top_k", self.retrieval.top_k),
            ("session.max_sessions", self.session.max_sessions),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::InvalidConfig(format!("{key} must be greater than zero")));
        }
        if self.store.collection.trim().is_empty() {
            return Err(Error::InvalidConfig("store.collection must not be empty".into()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against `base` after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_match_deployment_values() {
        let s = Settings::default();
        assert_eq!(s.store.collection, "nasa_corpus_v1");
        assert_eq!(s.store.upload_batch_size, 64);
        assert_eq!(s.store.query_timeout(), Duration::from_secs(90));
        assert_eq!(s.encoder.dense_dim, 384);
        assert_eq!(s.encoder.sparse_top_k, 200);
        assert_eq!(s.retrieval.top_k, 15);
        assert_eq!(s.answer.shape, WireShape::Urls);
        assert_eq!(s.session.history_window, 5);
    }

    #[test]
    fn toml_overrides_single_keys() {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            "[store]\nbackend = \"memory\"\ncollection = \"tiny\"\n[answer]\nshape = \"objects\"\n",
        )
        .unwrap();
        fs::write(tmp.path().join("config.test.toml"), "[retrieval]\ntop_k = 4\n").unwrap();
        let s = Config::load_from(tmp.path(), "test").unwrap().settings().unwrap();
        assert_eq!(s.store.backend, StoreBackend::Memory);
        assert_eq!(s.store.collection, "tiny");
        assert_eq!(s.store.max_retries, 5);
        assert_eq!(s.answer.shape, WireShape::Objects);
        assert_eq!(s.retrieval.top_k, 4);
    }

    #[test]
    fn zero_batch_is_rejected() {
        let figment = Figment::from(Toml::string("[encoder]\nbatch_size = 0\n"));
        let err = Config::from_figment(figment).settings().unwrap_err();
        assert!(err.to_string().contains("encoder.batch_size"));
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let base = Path::new("/srv/sciqa");
        assert_eq!(resolve_with_base(base, "models/x"), PathBuf::from("/srv/sciqa/models/x"));
        assert_eq!(resolve_with_base(base, "/abs"), PathBuf::from("/abs"));
    }
}
