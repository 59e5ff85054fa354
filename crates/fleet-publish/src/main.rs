use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use fleetflow_publish::config::DEFAULT_CERTS_ROOT;
use fleetflow_publish::executor::DEFAULT_DOCKER_BIN;
use fleetflow_publish::{
    ConfigNormalizer, DockerCli, Pipeline, PipelineOptions, PublishError, RawConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "fleet-publish")]
#[command(version)]
#[command(about = "Dockerイメージをビルドしてレジストリに公開する", long_about = None)]
struct Cli {
    /// 設定ファイル（JSON）。フラグ・環境変数の指定が優先される
    #[arg(short, long, env = "PLUGIN_CONFIG")]
    config: Option<PathBuf>,

    /// ワークスペース（相対パスの基準、コマンドの作業ディレクトリ）
    #[arg(short, long, env = "DRONE_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// レジストリ URL
    #[arg(long, env = "PLUGIN_REGISTRY")]
    registry: Option<String>,

    #[arg(long, env = "PLUGIN_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "PLUGIN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, env = "PLUGIN_EMAIL")]
    email: Option<String>,

    /// Base64 エンコード済みの認証トークン（username 未指定時のみ使用）
    #[arg(long, env = "PLUGIN_AUTH", hide_env_values = true)]
    auth: Option<String>,

    /// リポジトリ名
    #[arg(long, env = "PLUGIN_REPO")]
    repo: Option<String>,

    /// タグ（カンマ区切り、先頭がビルド時のタグ）
    #[arg(long = "tag", env = "PLUGIN_TAG", value_delimiter = ',')]
    tags: Vec<String>,

    /// Dockerfile のパス
    #[arg(short = 'f', long, env = "PLUGIN_FILE")]
    file: Option<String>,

    /// ビルドコンテキスト
    #[arg(long, env = "PLUGIN_CONTEXT")]
    context: Option<String>,

    /// レジストリの CA 証明書（PEM）
    #[arg(long, env = "PLUGIN_CERT", hide_env_values = true)]
    cert: Option<String>,

    #[arg(long, env = "PLUGIN_STORAGE_DRIVER")]
    storage_driver: Option<String>,

    /// レジストリを insecure として扱う
    #[arg(long, env = "PLUGIN_INSECURE")]
    insecure: bool,

    /// デーモンに渡す DNS サーバー（カンマ区切り）
    #[arg(long, env = "PLUGIN_DNS", value_delimiter = ',')]
    dns: Vec<String>,

    /// イメージアーカイブのパス
    #[arg(long, env = "PLUGIN_ARCHIVE_FILE")]
    archive_file: Option<String>,

    /// アーカイブに保存するタグ（カンマ区切り、未指定ならリポジトリ全体）
    #[arg(long, env = "PLUGIN_ARCHIVE_TAG", value_delimiter = ',')]
    archive_tags: Vec<String>,

    /// docker 実行ファイル
    #[arg(long, env = "DOCKER_BIN", default_value = DEFAULT_DOCKER_BIN)]
    docker_bin: PathBuf,

    /// 証明書のインストール先
    #[arg(long, env = "DOCKER_CERTS_DIR", default_value = DEFAULT_CERTS_ROOT)]
    certs_dir: PathBuf,

    /// デーモンが応答しなければビルド前に中断する
    #[arg(long, env = "PLUGIN_STRICT_READINESS")]
    strict_readiness: bool,
}

impl Cli {
    /// 設定ファイルの内容にフラグ・環境変数の指定を上書きする
    fn into_raw_config(self) -> anyhow::Result<RawConfig> {
        let mut raw = match &self.config {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                RawConfig::from_json(&content)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => RawConfig::default(),
        };

        overlay(&mut raw.registry, self.registry);
        overlay(&mut raw.username, self.username);
        overlay(&mut raw.password, self.password);
        overlay(&mut raw.email, self.email);
        overlay(&mut raw.auth, self.auth);
        overlay(&mut raw.repo, self.repo);
        overlay(&mut raw.file, self.file);
        overlay(&mut raw.context, self.context);
        overlay(&mut raw.cert, self.cert);
        overlay(&mut raw.storage_driver, self.storage_driver);
        overlay(&mut raw.archive.file, self.archive_file);

        if !self.tags.is_empty() {
            raw.tag = self.tags;
        }
        if !self.dns.is_empty() {
            raw.dns = self.dns;
        }
        if !self.archive_tags.is_empty() {
            raw.archive.tag = self.archive_tags;
        }
        raw.insecure |= self.insecure;

        Ok(raw)
    }
}

fn overlay(target: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *target = value;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<PublishError>() {
                Some(publish_error) => {
                    eprintln!("{}", publish_error.user_message().red());
                }
                None => {
                    eprintln!("{} {:#}", "Error:".red().bold(), e);
                }
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let workspace = cli.workspace.clone();
    let docker_bin = cli.docker_bin.clone();
    let certs_dir = cli.certs_dir.clone();
    let strict_readiness = cli.strict_readiness;

    let raw = cli.into_raw_config()?;
    let config = ConfigNormalizer::new(&workspace)
        .with_certs_root(certs_dir)
        .normalize(raw)?;

    tracing::debug!("Publishing {} with tags {:?}", config.repository, config.tags);

    let executor = Arc::new(DockerCli::new(docker_bin).with_workdir(&workspace));
    let options = PipelineOptions {
        strict_readiness,
        ..PipelineOptions::default()
    };

    let report = Pipeline::with_options(config, executor, options).run().await?;
    tracing::debug!("Pushed {} reference(s)", report.pushed.len());

    Ok(())
}
