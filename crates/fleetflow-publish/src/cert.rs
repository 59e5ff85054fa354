//! レジストリ TLS 証明書のインストール

use crate::error::{PublishError, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// レジストリ URL から証明書ディレクトリ名（`host[:port]`）を得る
///
/// スキームが省略されている場合は `https://` とみなす。
pub fn registry_host(registry: &str) -> Result<String> {
    let candidate = if registry.contains("://") {
        registry.to_string()
    } else {
        format!("https://{}", registry)
    };

    let url = Url::parse(&candidate).map_err(|e| PublishError::InvalidRegistryUrl {
        url: registry.to_string(),
        message: e.to_string(),
    })?;

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| PublishError::InvalidRegistryUrl {
            url: registry.to_string(),
            message: "missing host".to_string(),
        })?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// `<certs_root>/<host>/ca.crt` に証明書を書き込む
pub fn install_cert(certs_root: &Path, registry: &str, cert: &str) -> Result<PathBuf> {
    let dir = certs_root.join(registry_host(registry)?);
    let path = dir.join("ca.crt");

    create_cert_dir(&dir).map_err(|source| PublishError::CertInstall {
        path: dir.clone(),
        source,
    })?;

    std::fs::write(&path, cert).map_err(|source| PublishError::CertInstall {
        path: path.clone(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).map_err(
            |source| PublishError::CertInstall {
                path: path.clone(),
                source,
            },
        )?;
    }

    Ok(path)
}

#[cfg(unix)]
fn create_cert_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o711)
        .create(dir)
}

#[cfg(not(unix))]
fn create_cert_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}
