//! 入力設定の正規化
//!
//! CI から渡されたパラメータ（[`RawConfig`]）にデフォルト値を補い、
//! パスを解決して、パイプラインが読み取り専用で使う [`BuildConfig`] を作ります。

use crate::cert;
use crate::error::{PublishError, Result};
use crate::pusher::validate_tag;
use crate::reference::ImageReference;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

/// レジストリ未指定時のデフォルト（Docker Hub）
pub const DEFAULT_REGISTRY: &str = "https://index.docker.io/v1/";
/// デフォルトの Dockerfile 名
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";
/// デフォルトのビルドコンテキスト
pub const DEFAULT_CONTEXT: &str = ".";
/// デフォルトのタグ
pub const DEFAULT_TAG: &str = "latest";
/// レジストリ証明書の配置先
pub const DEFAULT_CERTS_ROOT: &str = "/etc/docker/certs.d";

/// CI から渡される生のパラメータ
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub registry: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    /// Base64 エンコード済みの "username:password"
    pub auth: Option<String>,
    pub repo: Option<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub tag: Vec<String>,
    pub file: Option<String>,
    pub context: Option<String>,
    pub cert: Option<String>,
    pub storage_driver: Option<String>,
    pub insecure: bool,
    pub dns: Vec<String>,
    pub archive: RawArchive,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawArchive {
    pub file: Option<String>,
    #[serde(deserialize_with = "string_or_list")]
    pub tag: Vec<String>,
}

impl RawConfig {
    /// JSON ドキュメントから読み込み
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// `"v1"` と `["v1", "latest"]` のどちらの書き方も受け付ける
fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// レジストリ認証の方法
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCredentials {
    /// `docker login` を実行する
    Login {
        username: String,
        password: String,
        email: Option<String>,
    },
    /// エンコード済みトークンをクライアント設定ファイルに書き込む
    Token { auth: String, email: Option<String> },
    /// 認証なし
    Anonymous,
}

/// イメージアーカイブの指定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// 絶対パス
    pub path: PathBuf,
    /// 保存対象を絞り込むタグ（空なら全タグ）
    pub tags: Vec<String>,
}

/// 正規化済みのビルド設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub registry: String,
    pub credentials: RegistryCredentials,
    pub repository: String,
    /// 先頭がプライマリタグ（常に 1 件以上）
    pub tags: Vec<String>,
    pub dockerfile: String,
    pub context: String,
    pub cert: Option<String>,
    pub storage_driver: Option<String>,
    pub insecure: bool,
    pub dns: Vec<String>,
    pub archive: Option<Archive>,
}

impl BuildConfig {
    /// タグが空の場合は [`DEFAULT_TAG`]
    pub fn primary_tag(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or(DEFAULT_TAG)
    }

    pub fn secondary_tags(&self) -> &[String] {
        self.tags.get(1..).unwrap_or(&[])
    }

    /// [`ConfigNormalizer`] を経由せずに組み立てた設定の検査
    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(PublishError::InvalidConfig(
                "repo must not be empty".to_string(),
            ));
        }
        if self.tags.is_empty() {
            return Err(PublishError::InvalidConfig(
                "at least one tag is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reference(&self, tag: &str) -> ImageReference {
        ImageReference::new(self.repository.clone(), tag)
    }

    pub fn primary_reference(&self) -> ImageReference {
        self.reference(self.primary_tag())
    }

    /// 全タグの参照（設定順）
    pub fn references(&self) -> Vec<ImageReference> {
        self.tags.iter().map(|tag| self.reference(tag)).collect()
    }
}

/// [`RawConfig`] から [`BuildConfig`] を作る
#[derive(Debug, Clone)]
pub struct ConfigNormalizer {
    workspace: PathBuf,
    certs_root: PathBuf,
}

impl ConfigNormalizer {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            certs_root: PathBuf::from(DEFAULT_CERTS_ROOT),
        }
    }

    /// 証明書の配置先を変更
    pub fn with_certs_root(mut self, certs_root: impl Into<PathBuf>) -> Self {
        self.certs_root = certs_root.into();
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// デフォルト値の補完・パス解決を行い、証明書が指定されていればインストールする
    pub fn normalize(&self, raw: RawConfig) -> Result<BuildConfig> {
        let config = self.resolve(raw)?;

        if let Some(cert) = &config.cert {
            let path = cert::install_cert(&self.certs_root, &config.registry, cert)?;
            tracing::info!("Installed registry certificate: {}", path.display());
        }

        Ok(config)
    }

    /// 副作用なしの正規化
    pub fn resolve(&self, raw: RawConfig) -> Result<BuildConfig> {
        let registry = non_empty(raw.registry);

        let repository = non_empty(raw.repo)
            .ok_or_else(|| PublishError::InvalidConfig("repo must not be empty".to_string()))?;
        let repository = qualify_repository(&repository, registry.as_deref());

        let registry = registry.unwrap_or_else(|| DEFAULT_REGISTRY.to_string());

        let mut tags = clean_list(raw.tag);
        if tags.is_empty() {
            tags.push(DEFAULT_TAG.to_string());
        }

        let email = non_empty(raw.email);
        let credentials = match (non_empty(raw.username), non_empty(raw.auth)) {
            (Some(username), _) => RegistryCredentials::Login {
                username,
                password: raw.password.unwrap_or_default(),
                email,
            },
            (None, Some(auth)) => RegistryCredentials::Token { auth, email },
            (None, None) => RegistryCredentials::Anonymous,
        };

        let archive = match non_empty(raw.archive.file) {
            Some(file) => Some(Archive {
                path: self.resolve_path(&file)?,
                tags: clean_list(raw.archive.tag),
            }),
            None => None,
        };

        let archive_tags = archive.iter().flat_map(|a| a.tags.iter());
        for tag in tags.iter().chain(archive_tags) {
            validate_tag(tag)
                .map_err(|e| PublishError::InvalidConfig(format!("invalid tag: {}", e)))?;
        }

        Ok(BuildConfig {
            registry,
            credentials,
            repository,
            tags,
            dockerfile: non_empty(raw.file).unwrap_or_else(|| DEFAULT_DOCKERFILE.to_string()),
            context: non_empty(raw.context).unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            cert: non_empty(raw.cert),
            storage_driver: non_empty(raw.storage_driver),
            insecure: raw.insecure,
            dns: clean_list(raw.dns),
            archive,
        })
    }

    /// 相対パスはワークスペース基準で解決する
    fn resolve_path(&self, file: &str) -> Result<PathBuf> {
        let path = Path::new(file);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        Ok(std::path::absolute(self.workspace.join(path))?)
    }
}

/// 短縮形のリポジトリ名にレジストリを付与する
///
/// `registry/namespace/name` 形式でなく、かつレジストリで始まっていない場合のみ
/// `registry/` を先頭に付ける。既に修飾済みのリポジトリは変化しない。
pub fn qualify_repository(repository: &str, registry: Option<&str>) -> String {
    match registry {
        Some(registry)
            if !registry.is_empty()
                && repository.matches('/').count() <= 1
                && !repository.starts_with(registry) =>
        {
            format!("{}/{}", registry, repository)
        }
        _ => repository.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(repo: &str) -> RawConfig {
        RawConfig {
            repo: Some(repo.to_string()),
            ..Default::default()
        }
    }

    fn normalizer() -> ConfigNormalizer {
        ConfigNormalizer::new("/ws")
    }

    #[test]
    fn test_qualify_short_name() {
        assert_eq!(
            qualify_repository("octocat/app", Some("registry.example.com")),
            "registry.example.com/octocat/app"
        );
        assert_eq!(
            qualify_repository("app", Some("registry.example.com")),
            "registry.example.com/app"
        );
    }

    #[test]
    fn test_qualify_is_idempotent() {
        let once = qualify_repository("octocat/app", Some("registry.example.com"));
        let twice = qualify_repository(&once, Some("registry.example.com"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_qualify_keeps_fully_qualified() {
        assert_eq!(
            qualify_repository("ghcr.io/org/app", Some("registry.example.com")),
            "ghcr.io/org/app"
        );
    }

    #[test]
    fn test_qualify_without_registry() {
        assert_eq!(qualify_repository("octocat/app", None), "octocat/app");
        assert_eq!(qualify_repository("octocat/app", Some("")), "octocat/app");
    }

    #[test]
    fn test_defaults() {
        let config = normalizer().resolve(raw("octocat/app")).unwrap();

        assert_eq!(config.registry, DEFAULT_REGISTRY);
        // デフォルトレジストリはリポジトリに付与しない
        assert_eq!(config.repository, "octocat/app");
        assert_eq!(config.tags, vec!["latest"]);
        assert_eq!(config.dockerfile, "Dockerfile");
        assert_eq!(config.context, ".");
        assert_eq!(config.credentials, RegistryCredentials::Anonymous);
        assert!(config.archive.is_none());
    }

    #[test]
    fn test_empty_strings_use_defaults() {
        let mut input = raw("octocat/app");
        input.file = Some(String::new());
        input.context = Some(String::new());
        input.tag = vec![String::new()];

        let config = normalizer().resolve(input).unwrap();
        assert_eq!(config.dockerfile, "Dockerfile");
        assert_eq!(config.context, ".");
        assert_eq!(config.tags, vec!["latest"]);
    }

    #[test]
    fn test_empty_repo_rejected() {
        let result = normalizer().resolve(RawConfig::default());
        assert!(matches!(result, Err(PublishError::InvalidConfig(_))));
    }

    #[test]
    fn test_custom_registry_qualifies_repo() {
        let mut input = raw("octocat/app");
        input.registry = Some("registry.example.com".to_string());

        let config = normalizer().resolve(input).unwrap();
        assert_eq!(config.registry, "registry.example.com");
        assert_eq!(config.repository, "registry.example.com/octocat/app");
    }

    #[test]
    fn test_relative_archive_path() {
        let mut input = raw("octocat/app");
        input.archive.file = Some("out/img.tar".to_string());

        let config = normalizer().resolve(input).unwrap();
        let archive = config.archive.unwrap();
        assert_eq!(archive.path, PathBuf::from("/ws/out/img.tar"));
        assert!(archive.tags.is_empty());
    }

    #[test]
    fn test_absolute_archive_path() {
        let mut input = raw("octocat/app");
        input.archive.file = Some("/cache/img.tar".to_string());
        input.archive.tag = vec!["a".to_string(), "b".to_string()];

        let config = normalizer().resolve(input).unwrap();
        let archive = config.archive.unwrap();
        assert_eq!(archive.path, PathBuf::from("/cache/img.tar"));
        assert_eq!(archive.tags, vec!["a", "b"]);
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let mut input = raw("octocat/app");
        input.tag = vec!["1.0".to_string(), "feature/login".to_string()];

        let result = normalizer().resolve(input);
        assert!(matches!(result, Err(PublishError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_archive_tag_rejected() {
        let mut input = raw("octocat/app");
        input.archive.file = Some("img.tar".to_string());
        input.archive.tag = vec![".bad".to_string()];

        let result = normalizer().resolve(input);
        assert!(matches!(result, Err(PublishError::InvalidConfig(_))));
    }

    #[test]
    fn test_credentials_login() {
        let mut input = raw("octocat/app");
        input.username = Some("octocat".to_string());
        input.password = Some("s3cret".to_string());
        input.auth = Some("b2N0b2NhdDpzM2NyZXQ=".to_string());

        let config = normalizer().resolve(input).unwrap();
        assert_eq!(
            config.credentials,
            RegistryCredentials::Login {
                username: "octocat".to_string(),
                password: "s3cret".to_string(),
                email: None,
            }
        );
    }

    #[test]
    fn test_credentials_token() {
        let mut input = raw("octocat/app");
        input.auth = Some("b2N0b2NhdDpzM2NyZXQ=".to_string());
        input.email = Some("octocat@github.com".to_string());

        let config = normalizer().resolve(input).unwrap();
        assert_eq!(
            config.credentials,
            RegistryCredentials::Token {
                auth: "b2N0b2NhdDpzM2NyZXQ=".to_string(),
                email: Some("octocat@github.com".to_string()),
            }
        );
    }

    #[test]
    fn test_references_follow_tag_order() {
        let mut input = raw("octocat/app");
        input.tag = vec!["1.0".to_string(), "1".to_string(), "latest".to_string()];

        let config = normalizer().resolve(input).unwrap();
        assert_eq!(config.primary_reference().to_string(), "octocat/app:1.0");
        assert_eq!(config.secondary_tags(), &["1", "latest"]);
        let refs: Vec<String> = config.references().iter().map(|r| r.to_string()).collect();
        assert_eq!(refs, vec!["octocat/app:1.0", "octocat/app:1", "octocat/app:latest"]);
    }

    #[test]
    fn test_from_json_tag_as_string() {
        let raw = RawConfig::from_json(r#"{"repo": "octocat/app", "tag": "1.0"}"#).unwrap();
        assert_eq!(raw.tag, vec!["1.0"]);
    }

    #[test]
    fn test_from_json_full_document() {
        let raw = RawConfig::from_json(
            r#"{
                "registry": "registry.example.com",
                "repo": "octocat/app",
                "tag": ["1.0", "latest"],
                "storage_driver": "overlay2",
                "insecure": true,
                "dns": ["8.8.8.8"],
                "archive": {"file": "cache/img.tar", "tag": "1.0"}
            }"#,
        )
        .unwrap();

        assert_eq!(raw.tag, vec!["1.0", "latest"]);
        assert_eq!(raw.storage_driver.as_deref(), Some("overlay2"));
        assert!(raw.insecure);
        assert_eq!(raw.dns, vec!["8.8.8.8"]);
        assert_eq!(raw.archive.file.as_deref(), Some("cache/img.tar"));
        assert_eq!(raw.archive.tag, vec!["1.0"]);
    }

    #[test]
    fn test_normalize_installs_cert() {
        let certs = tempfile::tempdir().unwrap();
        let mut input = raw("octocat/app");
        input.registry = Some("https://registry.example.com:5000".to_string());
        input.cert = Some("-----BEGIN CERTIFICATE-----\n".to_string());

        ConfigNormalizer::new("/ws")
            .with_certs_root(certs.path())
            .normalize(input)
            .unwrap();

        let installed = certs.path().join("registry.example.com:5000").join("ca.crt");
        assert_eq!(
            std::fs::read_to_string(installed).unwrap(),
            "-----BEGIN CERTIFICATE-----\n"
        );
    }

    #[test]
    fn test_empty_tags_do_not_panic() {
        let mut config = ConfigNormalizer::new("/ws").resolve(raw("octocat/app")).unwrap();
        assert!(config.validate().is_ok());

        config.tags.clear();
        assert_eq!(config.primary_tag(), DEFAULT_TAG);
        assert!(config.secondary_tags().is_empty());
        assert!(matches!(
            config.validate(),
            Err(PublishError::InvalidConfig(_))
        ));
    }
}
