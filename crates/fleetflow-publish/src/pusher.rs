//! タグ付けとプッシュ処理
//!
//! ビルドしたイメージに追加タグを付け、全タグをレジストリにプッシュします。
//! 途中で失敗した場合も、既に付けたタグやプッシュ済みのタグは戻しません。

use crate::command::EngineCommand;
use crate::config::BuildConfig;
use crate::error::Result;
use crate::executor::{CommandExecutor, run_checked};
use crate::reference::ImageReference;
use colored::Colorize;

/// タグ付け・プッシュを実行するハンドラ
pub struct ImagePusher<'a, E: ?Sized> {
    executor: &'a E,
}

impl<'a, E> ImagePusher<'a, E>
where
    E: CommandExecutor + ?Sized,
{
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// プライマリ以外の各タグをプライマリ参照の別名として付ける
    ///
    /// # Returns
    /// 付けたタグの参照（設定順）
    pub async fn tag_aliases(&self, config: &BuildConfig) -> Result<Vec<ImageReference>> {
        let primary = config.primary_reference();
        let mut tagged = Vec::with_capacity(config.secondary_tags().len());

        for tag in config.secondary_tags() {
            let target = primary.with_tag(tag.as_str());
            let command = EngineCommand::Tag {
                source: primary.clone(),
                target: target.clone(),
            };
            run_checked(self.executor, &command).await?;
            tagged.push(target);
        }

        Ok(tagged)
    }

    /// 全タグ（プライマリ含む）をレジストリにプッシュ
    ///
    /// # Returns
    /// プッシュした参照（設定順）
    pub async fn push_all(&self, config: &BuildConfig) -> Result<Vec<ImageReference>> {
        let mut pushed = Vec::with_capacity(config.tags.len());

        for reference in config.references() {
            println!("  → {}", reference.to_string().cyan());
            let command = EngineCommand::Push {
                reference: reference.clone(),
            };
            run_checked(self.executor, &command).await?;
            println!("  {} Pushed {}", "✓".green(), reference);
            pushed.push(reference);
        }

        Ok(pushed)
    }
}

/// Docker タグとして妥当か
///
/// - 128文字以下
/// - 英数字、ピリオド、ハイフン、アンダースコアのみ
/// - 先頭はピリオドまたはハイフンではない
pub fn validate_tag(tag: &str) -> std::result::Result<(), String> {
    if tag.is_empty() {
        return Err("(empty)".to_string());
    }

    if tag.len() > 128 {
        return Err(format!("Tag too long ({} characters, max 128)", tag.len()));
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(format!("Tag must not start with '.' or '-': {}", tag));
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
    {
        return Err(format!("Invalid character '{}' in tag: {}", c, tag));
    }

    Ok(())
}
