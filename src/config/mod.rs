//! 設定モジュール（YAML 読み込み）
//!
//! `ConfigSet` はルートディレクトリ配下の複数YAMLファイルを読み込み、
//! 実行時に必要な設定値を型安全に提供します。
//! 一部の値は環境変数で上書きできます（`apply_env_overrides`）。
mod engines;
mod error;
mod monitoring;
mod protocol;
mod server;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

pub use engines::*;
pub use error::ConfigError;
pub use monitoring::*;
pub use protocol::*;
pub use server::*;

/// 設定ディレクトリを指す環境変数名
pub const CONFIG_DIR_ENV: &str = "ASR_GATEWAY_CONFIG_DIR";
/// `server.ws_bind_addr` を上書き
pub const WS_BIND_ENV: &str = "ASR_GATEWAY_WS_BIND";
/// `engines.sample_rate_hz` を上書き
pub const SAMPLE_RATE_ENV: &str = "ASR_GATEWAY_SAMPLE_RATE";
/// `engines.default_engine` を上書き
pub const DEFAULT_ENGINE_ENV: &str = "ASR_GATEWAY_DEFAULT_ENGINE";

/// すべての設定をひとまとめにした構造体
#[derive(Debug, Clone)]
pub struct ConfigSet {
    pub server: ServerConfig,
    pub engines: EngineRegistryConfig,
    pub protocol: ProtocolConfig,
    pub monitoring: MonitoringConfig,
    root: PathBuf,
}

impl ConfigSet {
    /// ルートディレクトリから各YAMLを読み込み
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root));
        }

        let server = load_yaml(root.join("server.yaml"))?;
        let engines: EngineRegistryConfig = load_yaml(root.join("engines.yaml"))?;
        let protocol = load_yaml(root.join("protocol.yaml"))?;
        let monitoring = load_yaml(root.join("monitoring.yaml"))?;
        engines.validate()?;

        Ok(Self {
            server,
            engines,
            protocol,
            monitoring,
            root,
        })
    }

    /// 環境変数（未設定時は `config/`）から設定を読み込み、上書き値を適用
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var(CONFIG_DIR_ENV).unwrap_or_else(|_| "config".to_string());
        let mut config = Self::load_from_dir(dir)?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// `lookup` が返す値で一部の設定を上書き（テストでは任意の関数を渡せる）
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(WS_BIND_ENV).filter(|v| !v.is_empty()) {
            self.server.ws_bind_addr = addr;
        }
        if let Some(raw) = lookup(SAMPLE_RATE_ENV) {
            let rate = raw
                .trim()
                .parse::<u32>()
                .map_err(|e| ConfigError::invalid("sample_rate_hz", format!("{raw:?}: {e}")))?;
            self.engines.sample_rate_hz = rate;
        }
        if let Some(key) = lookup(DEFAULT_ENGINE_ENV).filter(|v| !v.is_empty()) {
            self.engines.default_engine = key;
        }
        self.engines.validate()
    }

    /// 設定ルートのパス（デバッグ等に利用）
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// YAMLファイルを読み込み、型 `T` へデシリアライズ
fn load_yaml<T>(path: PathBuf) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let data = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse { path, source })
}
