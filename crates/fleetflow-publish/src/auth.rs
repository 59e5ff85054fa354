//! レジストリ認証処理
//!
//! username があれば `docker login` を実行し、エンコード済みトークンだけが
//! 渡された場合は Docker クライアントの config.json に書き込みます。
//! どちらも無ければ匿名でプッシュします。

use crate::command::EngineCommand;
use crate::config::{BuildConfig, RegistryCredentials};
use crate::error::{PublishError, Result};
use crate::executor::{CommandExecutor, run_traced};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// 認証の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// `docker login` に成功した
    LoggedIn,
    /// config.json に認証情報を書き込んだ
    CredentialsWritten(PathBuf),
    /// 認証なし
    Anonymous,
}

/// レジストリ認証を管理
#[derive(Debug, Clone)]
pub struct RegistryAuthenticator {
    config_dir: PathBuf,
}

impl Default for RegistryAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryAuthenticator {
    /// 新しい RegistryAuthenticator を作成
    ///
    /// デフォルトで $DOCKER_CONFIG、なければ ~/.docker を使用
    pub fn new() -> Self {
        let config_dir = std::env::var("DOCKER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(".docker"))
                    .unwrap_or_else(|| PathBuf::from(".docker"))
            });

        Self { config_dir }
    }

    /// 指定したディレクトリの config.json を使用
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    pub async fn authenticate<E>(&self, executor: &E, config: &BuildConfig) -> Result<AuthOutcome>
    where
        E: CommandExecutor + ?Sized,
    {
        match &config.credentials {
            RegistryCredentials::Login {
                username,
                password,
                email,
            } => {
                let command = EngineCommand::Login {
                    username: username.clone(),
                    password: password.clone(),
                    email: email.clone(),
                    registry: config.registry.clone(),
                };

                let outcome = run_traced(executor, &command).await?;
                if !outcome.success {
                    return Err(PublishError::LoginFailed {
                        registry: config.registry.clone(),
                    });
                }

                tracing::info!("Logged in to {}", config.registry);
                Ok(AuthOutcome::LoggedIn)
            }
            RegistryCredentials::Token { auth, email } => {
                let path = self.write_credentials(&config.registry, auth, email.as_deref())?;
                tracing::info!("Wrote registry credentials to {}", path.display());
                Ok(AuthOutcome::CredentialsWritten(path))
            }
            RegistryCredentials::Anonymous => {
                println!("A username was not specified. Assuming anonymous publishing.");
                Ok(AuthOutcome::Anonymous)
            }
        }
    }

    /// config.json の `auths` にレジストリのエントリを書き込む
    ///
    /// 他のレジストリのエントリや既存のキーはそのまま残す。
    pub fn write_credentials(
        &self,
        registry: &str,
        auth: &str,
        email: Option<&str>,
    ) -> Result<PathBuf> {
        let path = self.config_path();
        let mut document = self.load_config(&path)?;

        let root = document
            .as_object_mut()
            .ok_or_else(|| credentials_error(&path, "config.json is not a JSON object"))?;
        let auths = root
            .entry("auths")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(|| credentials_error(&path, "\"auths\" is not a JSON object"))?;

        let mut entry = Map::new();
        entry.insert("auth".to_string(), Value::String(auth.to_string()));
        if let Some(email) = email {
            entry.insert("email".to_string(), Value::String(email.to_string()));
        }
        auths.insert(registry.to_string(), Value::Object(entry));

        std::fs::create_dir_all(&self.config_dir)
            .map_err(|e| credentials_error(&path, &e.to_string()))?;
        let content = serde_json::to_string_pretty(&document)?;
        std::fs::write(&path, content).map_err(|e| credentials_error(&path, &e.to_string()))?;

        Ok(path)
    }

    /// 既存の config.json を読み込み（無ければ空のオブジェクト）
    fn load_config(&self, path: &Path) -> Result<Value> {
        if !path.exists() {
            return Ok(Value::Object(Map::new()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| credentials_error(path, &format!("Failed to read config.json: {}", e)))?;
        if content.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }

        serde_json::from_str(&content)
            .map_err(|e| credentials_error(path, &format!("Failed to parse config.json: {}", e)))
    }
}

fn credentials_error(path: &Path, message: &str) -> PublishError {
    PublishError::CredentialsFile {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
