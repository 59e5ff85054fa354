//! イメージアーカイブの読み込みと保存
//!
//! ビルド前にアーカイブがあれば `docker load` で復元し、
//! プッシュ後に `docker save` で書き出します。

use crate::command::EngineCommand;
use crate::config::{Archive, BuildConfig};
use crate::error::Result;
use crate::executor::{CommandExecutor, run_checked};
use std::path::PathBuf;

/// アーカイブ読み込みの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveLoad {
    /// アーカイブ未設定
    NotConfigured,
    /// ファイルが無いのでスクラッチからビルドする
    Missing(PathBuf),
    /// 読み込んだ
    Loaded(PathBuf),
}

/// アーカイブに保存するイメージ
///
/// タグの絞り込みがあれば `repository:tag` を、無ければリポジトリ全体を対象にする。
pub fn archive_images(config: &BuildConfig, archive: &Archive) -> Vec<String> {
    if archive.tags.is_empty() {
        vec![config.repository.clone()]
    } else {
        archive
            .tags
            .iter()
            .map(|tag| config.reference(tag).to_string())
            .collect()
    }
}

pub struct ArchiveHandler<'a, E: ?Sized> {
    executor: &'a E,
}

impl<'a, E> ArchiveHandler<'a, E>
where
    E: CommandExecutor + ?Sized,
{
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// アーカイブが存在すれば読み込む
    pub async fn load(&self, config: &BuildConfig) -> Result<ArchiveLoad> {
        let Some(archive) = &config.archive else {
            return Ok(ArchiveLoad::NotConfigured);
        };

        if !archive.path.exists() {
            println!(
                "Archive {} does not exist. Building from scratch.",
                archive.path.display()
            );
            return Ok(ArchiveLoad::Missing(archive.path.clone()));
        }

        let command = EngineCommand::Load {
            input: archive.path.clone(),
        };
        run_checked(self.executor, &command).await?;

        Ok(ArchiveLoad::Loaded(archive.path.clone()))
    }

    /// イメージをアーカイブに保存する
    ///
    /// 保存先の親ディレクトリが無ければ作成する。
    pub async fn save(&self, config: &BuildConfig) -> Result<Option<PathBuf>> {
        let Some(archive) = &config.archive else {
            return Ok(None);
        };

        if let Some(parent) = archive.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let command = EngineCommand::Save {
            output: archive.path.clone(),
            images: archive_images(config, archive),
        };
        run_checked(self.executor, &command).await?;

        tracing::info!("Saved image archive: {}", archive.path.display());
        Ok(Some(archive.path.clone()))
    }
}
