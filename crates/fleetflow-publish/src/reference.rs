//! イメージ参照（`repository:tag`）

use std::fmt;

/// `repository:tag` 形式のイメージ参照
///
/// 永続化はせず、コマンド引数を組み立てるためだけに使う。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    repository: String,
    tag: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// 同じリポジトリの別タグを指す参照
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self::new(self.repository.clone(), tag)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
