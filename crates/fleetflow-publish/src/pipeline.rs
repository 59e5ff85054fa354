//! イメージ公開パイプライン
//!
//! デーモン起動 → 準備完了待ち → 認証 → 環境情報 → アーカイブ読み込み →
//! ビルド → タグ付け → プッシュ → アーカイブ保存 の順に実行します。
//! 準備完了待ち以降の各ステージは逐次実行で、失敗した時点で全体を中断します。

use crate::archive::{ArchiveHandler, ArchiveLoad};
use crate::auth::{AuthOutcome, RegistryAuthenticator};
use crate::builder::ImageBuilder;
use crate::command::EngineCommand;
use crate::config::BuildConfig;
use crate::engine::{
    DaemonHandle, EngineLauncher, Readiness, ReadinessProbe, daemon_options, launch_debug_enabled,
};
use crate::error::{PublishError, Result};
use crate::executor::{CommandExecutor, run_traced};
use crate::progress::EngineProgress;
use crate::pusher::ImagePusher;
use crate::reference::ImageReference;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

/// パイプラインの動作設定
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub probe: ReadinessProbe,
    /// 準備完了しなかった場合にエラーにする
    pub strict_readiness: bool,
    /// デーモンの出力を表示する
    pub launch_debug: bool,
    /// config.json の配置先（None なら $DOCKER_CONFIG / ~/.docker）
    pub docker_config_dir: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            probe: ReadinessProbe::default(),
            strict_readiness: false,
            launch_debug: launch_debug_enabled(),
            docker_config_dir: None,
        }
    }
}

/// パイプラインの実行結果
#[derive(Debug)]
pub struct PipelineReport {
    pub readiness: Readiness,
    pub auth: AuthOutcome,
    pub archive_load: ArchiveLoad,
    pub built: ImageReference,
    pub tagged: Vec<ImageReference>,
    pub pushed: Vec<ImageReference>,
    pub saved: Option<PathBuf>,
    /// 起動したデーモン（パイプライン終了後も動き続ける）
    pub daemon: DaemonHandle,
}

pub struct Pipeline<E: ?Sized> {
    config: BuildConfig,
    executor: Arc<E>,
    options: PipelineOptions,
}

impl<E> Pipeline<E>
where
    E: CommandExecutor + ?Sized + 'static,
{
    pub fn new(config: BuildConfig, executor: Arc<E>) -> Self {
        Self::with_options(config, executor, PipelineOptions::default())
    }

    pub fn with_options(config: BuildConfig, executor: Arc<E>, options: PipelineOptions) -> Self {
        Self {
            config,
            executor,
            options,
        }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// 全ステージを実行
    pub async fn run(&self) -> Result<PipelineReport> {
        let config = &self.config;
        let executor = self.executor.as_ref();
        config.validate()?;

        stage("Starting Docker daemon");
        let daemon = EngineLauncher::new(Arc::clone(&self.executor))
            .with_debug(self.options.launch_debug)
            .launch(daemon_options(config));

        let readiness = self.wait_for_engine().await?;

        stage("Authenticating");
        let authenticator = match &self.options.docker_config_dir {
            Some(dir) => RegistryAuthenticator::with_config_dir(dir),
            None => RegistryAuthenticator::new(),
        };
        let auth = authenticator.authenticate(executor, config).await?;

        self.report_environment().await;

        let archives = ArchiveHandler::new(executor);
        let archive_load = archives.load(config).await?;

        stage(&format!("Building {}", config.primary_reference()));
        let built = ImageBuilder::new(executor).build_image(config).await?;

        let pusher = ImagePusher::new(executor);
        let tagged = pusher.tag_aliases(config).await?;

        stage(&format!("Pushing {} tag(s)", config.tags.len()));
        let pushed = pusher.push_all(config).await?;

        let saved = archives.save(config).await?;

        println!();
        println!("{}", format!("✓ Published {}", config.repository).green().bold());

        Ok(PipelineReport {
            readiness,
            auth,
            archive_load,
            built,
            tagged,
            pushed,
            saved,
            daemon,
        })
    }

    /// デーモンの準備完了を待つ
    ///
    /// 応答しなくてもデフォルトでは続行し、最初の実コマンドの失敗に任せる。
    async fn wait_for_engine(&self) -> Result<Readiness> {
        let progress = EngineProgress::new("Waiting for Docker daemon...");
        let readiness = self.options.probe.wait(self.executor.as_ref()).await;

        match readiness {
            Readiness::Ready { attempts } => {
                progress.finish_ready(attempts);
            }
            Readiness::NotReady { attempts } => {
                progress.finish_not_ready(attempts);
                if self.options.strict_readiness {
                    return Err(PublishError::EngineNotReady { attempts });
                }
                tracing::warn!(
                    "Docker daemon did not respond after {} attempts; continuing",
                    attempts
                );
            }
        }

        Ok(readiness)
    }

    /// docker version / info をビルドログに残す（失敗は無視）
    async fn report_environment(&self) {
        for command in [EngineCommand::Version, EngineCommand::Info] {
            match run_traced(self.executor.as_ref(), &command).await {
                Ok(outcome) if !outcome.success => {
                    tracing::debug!(
                        "docker {} exited with {:?}",
                        outcome.operation,
                        outcome.exit_code
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!("docker {} could not be run: {}", command.operation(), e);
                }
            }
        }
    }
}

fn stage(title: &str) {
    println!();
    println!("{}", title.blue().bold());
}
