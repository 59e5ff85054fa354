use crate::command::EngineCommand;
use crate::config::BuildConfig;
use crate::error::Result;
use crate::executor::{CommandExecutor, run_checked};
use crate::reference::ImageReference;

pub struct ImageBuilder<'a, E: ?Sized> {
    executor: &'a E,
}

impl<'a, E> ImageBuilder<'a, E>
where
    E: CommandExecutor + ?Sized,
{
    pub fn new(executor: &'a E) -> Self {
        Self { executor }
    }

    /// プライマリタグでイメージをビルド
    ///
    /// ベースイメージは常に pull し、中間コンテナは削除する。
    pub async fn build_image(&self, config: &BuildConfig) -> Result<ImageReference> {
        let reference = config.primary_reference();
        tracing::info!("Building image: {}", reference);

        let command = EngineCommand::Build {
            dockerfile: config.dockerfile.clone(),
            reference: reference.clone(),
            context: config.context.clone(),
        };
        run_checked(self.executor, &command).await?;

        tracing::info!("Successfully built: {}", reference);
        Ok(reference)
    }
}
