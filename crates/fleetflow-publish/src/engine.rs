//! Docker デーモンの起動と準備完了待ち
//!
//! デーモンはバックグラウンドタスクとして起動し、[`DaemonHandle`] で
//! 終了の確認・キャンセルができるようにしています。
//! 準備完了の判定は `docker info` を一定回数試す [`ReadinessProbe`] が担当します。

use crate::command::{DaemonOptions, EngineCommand};
use crate::config::BuildConfig;
use crate::executor::{CommandExecutor, CommandOutcome, OutputMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// `true` のときデーモンの出力を表示する環境変数
pub const LAUNCH_DEBUG_ENV: &str = "DOCKER_LAUNCH_DEBUG";
/// 準備完了確認の試行回数
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 3;
/// 準備完了確認の間隔
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// 環境変数でデーモン出力の表示が有効になっているか
pub fn launch_debug_enabled() -> bool {
    std::env::var(LAUNCH_DEBUG_ENV).is_ok_and(|v| v == "true")
}

/// 設定からデーモン起動オプションを導出
pub fn daemon_options(config: &BuildConfig) -> DaemonOptions {
    let insecure_registry = if config.insecure && !config.registry.is_empty() {
        Some(config.registry.clone())
    } else {
        None
    };

    DaemonOptions {
        storage_driver: config.storage_driver.clone(),
        insecure_registry,
        dns: config.dns.clone(),
    }
}

/// デーモンタスクの終わり方
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonExit {
    /// プロセスが終了した
    Exited(CommandOutcome),
    /// プロセスを起動できなかった
    SpawnFailed(String),
    /// [`DaemonHandle::cancel`] で止めた
    Cancelled,
}

/// バックグラウンドで動くデーモンのハンドル
///
/// ハンドルを drop してもデーモンは止まらない（切り離される）。
#[derive(Debug)]
pub struct DaemonHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<DaemonExit>,
}

impl DaemonHandle {
    /// デーモンタスクが既に終わっているか
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// デーモンの停止を要求
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// デーモンタスクの終了を待つ
    pub async fn wait(self) -> DaemonExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => DaemonExit::SpawnFailed(e.to_string()),
        }
    }

    /// 停止を要求して終了を待つ
    pub async fn shutdown(mut self) -> DaemonExit {
        self.cancel();
        self.wait().await
    }
}

/// デーモンをバックグラウンドで起動する
pub struct EngineLauncher<E: ?Sized> {
    executor: Arc<E>,
    debug: bool,
}

impl<E> EngineLauncher<E>
where
    E: CommandExecutor + ?Sized + 'static,
{
    pub fn new(executor: Arc<E>) -> Self {
        Self {
            executor,
            debug: launch_debug_enabled(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// デーモンを起動してすぐに戻る
    ///
    /// デーモンの終了はパイプラインからは観測しない。準備完了は
    /// [`ReadinessProbe`] で別途確認する。
    pub fn launch(&self, options: DaemonOptions) -> DaemonHandle {
        let command = EngineCommand::Daemon(options);
        let output = if self.debug {
            OutputMode::Inherit
        } else {
            OutputMode::Discard
        };

        println!("{}", self.executor.describe(&command));

        let executor = Arc::clone(&self.executor);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            // 送信側が drop された場合は切り離し扱い（キャンセルしない）
            let cancelled = async move {
                if cancel_rx.await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            tokio::select! {
                result = executor.run(&command, output) => match result {
                    Ok(outcome) => {
                        tracing::debug!("Docker daemon exited: {:?}", outcome.exit_code);
                        DaemonExit::Exited(outcome)
                    }
                    Err(e) => {
                        tracing::debug!("Docker daemon failed to start: {}", e);
                        DaemonExit::SpawnFailed(e.to_string())
                    }
                },
                _ = cancelled => DaemonExit::Cancelled,
            }
        });

        DaemonHandle {
            cancel: Some(cancel_tx),
            task,
        }
    }
}

/// 準備完了確認の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// `attempts` 回目で応答した
    Ready { attempts: u32 },
    /// 全試行で応答しなかった
    NotReady { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Readiness::Ready { attempts } | Readiness::NotReady { attempts } => *attempts,
        }
    }
}

/// `docker info` による準備完了確認
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessProbe {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_PROBE_ATTEMPTS,
            interval: DEFAULT_PROBE_INTERVAL,
        }
    }
}

impl ReadinessProbe {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// デーモンが応答するまで待つ
    ///
    /// 最初に成功した時点で終了し、試行の間だけ `interval` 待機する。
    pub async fn wait<E>(&self, executor: &E) -> Readiness
    where
        E: CommandExecutor + ?Sized,
    {
        for attempt in 0..self.max_attempts {
            match executor.run(&EngineCommand::Info, OutputMode::Discard).await {
                Ok(outcome) if outcome.success => {
                    return Readiness::Ready {
                        attempts: attempt + 1,
                    };
                }
                Ok(outcome) => {
                    tracing::debug!(
                        "Docker daemon not ready (attempt {}/{}, exit code {:?})",
                        attempt + 1,
                        self.max_attempts,
                        outcome.exit_code
                    );
                }
                Err(e) => {
                    tracing::debug!(
                        "Docker daemon not ready (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_attempts,
                        e
                    );
                }
            }

            // 最後の試行でなければ待機
            if attempt + 1 < self.max_attempts {
                sleep(self.interval).await;
            }
        }

        Readiness::NotReady {
            attempts: self.max_attempts,
        }
    }
}
