use async_trait::async_trait;
use fleetflow_publish::{
    BuildConfig, CommandExecutor, CommandOutcome, ConfigNormalizer, EngineCommand, Operation,
    OutputMode, PipelineOptions, RawConfig, ReadinessProbe, Result,
};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

type FailurePredicate = Box<dyn Fn(&EngineCommand) -> bool + Send + Sync>;

/// 実行したコマンドを記録するだけの executor
pub struct RecordingExecutor {
    calls: Mutex<Vec<(EngineCommand, OutputMode)>>,
    failures: Vec<FailurePredicate>,
    engine_down: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Vec::new(),
            engine_down: false,
        }
    }

    /// 条件に合うコマンドを非ゼロ終了させる
    pub fn fail_when(
        mut self,
        predicate: impl Fn(&EngineCommand) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.failures.push(Box::new(predicate));
        self
    }

    /// 指定した操作をすべて失敗させる
    pub fn fail_operation(self, operation: Operation) -> Self {
        self.fail_when(move |command| command.operation() == operation)
    }

    /// `docker info` が常に失敗する（デーモンが応答しない）
    pub fn engine_down(mut self) -> Self {
        self.engine_down = true;
        self
    }

    /// デーモン起動と準備完了確認を除いた、パイプラインが発行したコマンド
    pub fn pipeline_commands(&self) -> Vec<EngineCommand> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(command, output)| {
                command.operation() != Operation::Daemon && *output == OutputMode::Inherit
            })
            .map(|(command, _)| command.clone())
            .collect()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.pipeline_commands()
            .iter()
            .map(EngineCommand::operation)
            .collect()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.operations()
            .into_iter()
            .filter(|op| *op == operation)
            .count()
    }

    /// デーモン起動時の引数列
    pub fn daemon_args(&self) -> Option<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|(command, _)| command.operation() == Operation::Daemon)
            .map(|(command, _)| command.args())
    }

    pub fn probe_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(command, output)| {
                command.operation() == Operation::Info && *output == OutputMode::Discard
            })
            .count()
    }

    /// 指定した操作の引数列（発行順）
    pub fn args_of(&self, operation: Operation) -> Vec<Vec<String>> {
        self.pipeline_commands()
            .iter()
            .filter(|command| command.operation() == operation)
            .map(EngineCommand::args)
            .collect()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, command: &EngineCommand, output: OutputMode) -> Result<CommandOutcome> {
        self.calls.lock().unwrap().push((command.clone(), output));

        let probe_failed = self.engine_down && command.operation() == Operation::Info;
        if probe_failed || self.failures.iter().any(|failure| failure(command)) {
            return Ok(CommandOutcome::failed(
                command.operation(),
                Some(1),
                format!("{} failed", command.operation()),
            ));
        }

        Ok(CommandOutcome::succeeded(command.operation()))
    }
}

pub fn build_config(workspace: &Path, raw: RawConfig) -> BuildConfig {
    ConfigNormalizer::new(workspace).resolve(raw).unwrap()
}

pub fn raw(repo: &str, tags: &[&str]) -> RawConfig {
    RawConfig {
        repo: Some(repo.to_string()),
        tag: tags.iter().map(|t| t.to_string()).collect(),
        ..Default::default()
    }
}

/// 待機なしのテスト用オプション
pub fn options(docker_config_dir: &Path) -> PipelineOptions {
    PipelineOptions {
        probe: ReadinessProbe::new(3, Duration::ZERO),
        strict_readiness: false,
        launch_debug: false,
        docker_config_dir: Some(docker_config_dir.to_path_buf()),
    }
}
