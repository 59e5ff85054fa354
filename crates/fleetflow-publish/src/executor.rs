//! Docker CLI の実行
//!
//! [`CommandExecutor`] はコマンドの「実行方法」を抽象化します。
//! 本番では [`DockerCli`] が外部プロセスを起動し、テストでは記録用の実装に差し替えます。

use crate::command::{EngineCommand, Operation};
use crate::error::{PublishError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// docker バイナリのデフォルトパス
pub const DEFAULT_DOCKER_BIN: &str = "/usr/bin/docker";

/// 診断用に保持する stderr の末尾行数
pub const DIAGNOSTIC_TAIL_LINES: usize = 64;

/// 子プロセスの出力の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// stdout / stderr をそのまま流す（stderr は診断用に保持もする）
    Inherit,
    /// 出力を捨てる
    Discard,
}

/// 1 回のコマンド実行結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub operation: Operation,
    pub success: bool,
    /// シグナルで終了した場合は None
    pub exit_code: Option<i32>,
    /// stderr の内容（表示用にそのまま流したもの）
    pub diagnostics: String,
}

impl CommandOutcome {
    pub fn succeeded(operation: Operation) -> Self {
        Self {
            operation,
            success: true,
            exit_code: Some(0),
            diagnostics: String::new(),
        }
    }

    pub fn failed(
        operation: Operation,
        exit_code: Option<i32>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            success: false,
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }

    /// 失敗を [`PublishError::CommandFailed`] に変換
    pub fn into_result(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(PublishError::CommandFailed {
                operation: self.operation,
                exit_code: self.exit_code,
                diagnostics: self.diagnostics,
            })
        }
    }
}

/// コマンド実行の抽象
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// コマンドを実行し、終了を待つ
    ///
    /// 非ゼロ終了は `Ok` の [`CommandOutcome`] として返す。
    /// `Err` になるのはプロセス自体を起動できなかった場合のみ。
    async fn run(&self, command: &EngineCommand, output: OutputMode) -> Result<CommandOutcome>;

    /// トレース表示用の 1 行
    fn describe(&self, command: &EngineCommand) -> String {
        command.trace_line("docker")
    }
}

/// 実行前にコマンドをエコーしてから実行する
pub async fn run_traced<E>(executor: &E, command: &EngineCommand) -> Result<CommandOutcome>
where
    E: CommandExecutor + ?Sized,
{
    println!("{}", executor.describe(command));
    executor.run(command, OutputMode::Inherit).await
}

/// [`run_traced`] の結果、非ゼロ終了をエラーにする
pub async fn run_checked<E>(executor: &E, command: &EngineCommand) -> Result<CommandOutcome>
where
    E: CommandExecutor + ?Sized,
{
    run_traced(executor, command).await?.into_result()
}

/// docker CLI を外部プロセスとして起動する実装
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: PathBuf,
    workdir: Option<PathBuf>,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_BIN)
    }
}

impl DockerCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            workdir: None,
        }
    }

    /// 作業ディレクトリ（ワークスペース）を指定
    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

/// 直近 `capacity` 行だけを保持するバッファ
///
/// デーモンのように終了しないプロセスでもメモリが増え続けない。
#[derive(Debug)]
struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn into_string(self) -> String {
        let mut text = String::new();
        for line in self.lines {
            text.push_str(&line);
            text.push('\n');
        }
        text
    }
}

#[async_trait]
impl CommandExecutor for DockerCli {
    async fn run(&self, command: &EngineCommand, output: OutputMode) -> Result<CommandOutcome> {
        let operation = command.operation();
        let mut cmd = Command::new(&self.program);
        cmd.args(command.args());
        cmd.stdin(Stdio::null());
        // デーモンタスクのキャンセル時にプロセスも止める
        cmd.kill_on_drop(true);

        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        match output {
            OutputMode::Inherit => {
                cmd.stdout(Stdio::inherit());
                cmd.stderr(Stdio::piped());
            }
            OutputMode::Discard => {
                cmd.stdout(Stdio::null());
                cmd.stderr(Stdio::null());
            }
        }

        tracing::debug!("Running: {}", command.trace_line(&self.program_name()));

        let mut child = cmd.spawn().map_err(|source| PublishError::Spawn {
            program: self.program_name(),
            source,
        })?;

        // stderr は端末に流しつつ、末尾だけ診断用に保持する
        let mut tail = DiagnosticTail::new(DIAGNOSTIC_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut segments = BufReader::new(stderr).split(b'\n');
            while let Some(segment) = segments.next_segment().await? {
                let line = String::from_utf8_lossy(&segment).into_owned();
                eprintln!("{}", line);
                tail.push(line);
            }
        }
        let diagnostics = tail.into_string();

        let status = child.wait().await?;
        tracing::debug!("docker {} exited with {}", operation, status);

        if status.success() {
            Ok(CommandOutcome {
                diagnostics,
                ..CommandOutcome::succeeded(operation)
            })
        } else {
            Ok(CommandOutcome::failed(operation, status.code(), diagnostics))
        }
    }

    fn describe(&self, command: &EngineCommand) -> String {
        command.trace_line(&self.program_name())
    }
}
