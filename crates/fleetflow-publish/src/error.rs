use crate::command::Operation;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Invalid publish configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid registry URL '{url}': {message}")]
    InvalidRegistryUrl { url: String, message: String },

    #[error("Failed to install registry certificate at {path}: {source}")]
    CertInstall {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write registry credentials to {path}: {message}")]
    CredentialsFile { path: PathBuf, message: String },

    #[error("Docker engine did not become ready after {attempts} attempts")]
    EngineNotReady { attempts: u32 },

    #[error("Login failed.")]
    LoginFailed { registry: String },

    #[error("docker {operation} failed (exit code: {})", describe_exit(.exit_code))]
    CommandFailed {
        operation: Operation,
        exit_code: Option<i32>,
        diagnostics: String,
    },

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PublishError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            PublishError::InvalidRegistryUrl { url, message } => {
                format!(
                    "レジストリURLを解釈できません: {} ({})\n\
                     \n\
                     解決方法:\n\
                     1. registry に https://registry.example.com の形式で指定してください\n\
                     2. cert を指定しない場合はURLの解釈は不要です",
                    url, message
                )
            }
            PublishError::CertInstall { path, source } => {
                format!(
                    "証明書の書き込みに失敗しました: {} ({})\n\
                     \n\
                     証明書ディレクトリへの書き込み権限を確認してください。",
                    path.display(),
                    source
                )
            }
            PublishError::LoginFailed { registry } => {
                format!(
                    "Login failed.\n\
                     \n\
                     レジストリ {} の username / password を確認してください。",
                    registry
                )
            }
            PublishError::EngineNotReady { attempts } => {
                format!(
                    "Docker デーモンが {} 回の確認で応答しませんでした。\n\
                     \n\
                     DOCKER_LAUNCH_DEBUG=true でデーモンの出力を確認してください。",
                    attempts
                )
            }
            PublishError::CommandFailed {
                operation,
                diagnostics,
                ..
            } if !diagnostics.trim().is_empty() => {
                format!("docker {} に失敗しました:\n{}", operation, diagnostics.trim_end())
            }
            _ => format!("{}", self),
        }
    }

    /// 失敗したコマンドの種類（コマンド失敗以外は None）
    pub fn operation(&self) -> Option<Operation> {
        match self {
            PublishError::CommandFailed { operation, .. } => Some(*operation),
            PublishError::LoginFailed { .. } => Some(Operation::Login),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PublishError>;

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "terminated by signal".to_string(),
    }
}
