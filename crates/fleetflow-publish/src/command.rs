//! Docker CLI コマンドの組み立て
//!
//! パイプラインが発行する論理操作ごとに、引数列を型付きで生成します。
//! 実行方法（プロセス起動・出力の扱い）は [`crate::executor`] が担当します。

use crate::reference::ImageReference;
use std::fmt;
use std::path::PathBuf;

/// パイプラインが Docker に対して行う論理操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Daemon,
    Info,
    Version,
    Login,
    Load,
    Build,
    Tag,
    Push,
    Save,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Daemon => "daemon",
            Operation::Info => "info",
            Operation::Version => "version",
            Operation::Login => "login",
            Operation::Load => "load",
            Operation::Build => "build",
            Operation::Tag => "tag",
            Operation::Push => "push",
            Operation::Save => "save",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// デーモン起動時のオプション
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonOptions {
    pub storage_driver: Option<String>,
    /// `--insecure-registry` に渡すレジストリ
    pub insecure_registry: Option<String>,
    pub dns: Vec<String>,
}

/// Docker CLI の 1 回の呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    Daemon(DaemonOptions),
    Info,
    Version,
    Login {
        username: String,
        password: String,
        email: Option<String>,
        registry: String,
    },
    Load {
        input: PathBuf,
    },
    Build {
        dockerfile: String,
        reference: ImageReference,
        context: String,
    },
    Tag {
        source: ImageReference,
        target: ImageReference,
    },
    Push {
        reference: ImageReference,
    },
    Save {
        output: PathBuf,
        /// 保存対象（タグ付き参照、またはリポジトリ名のみ）
        images: Vec<String>,
    },
}

impl EngineCommand {
    pub fn operation(&self) -> Operation {
        match self {
            EngineCommand::Daemon(_) => Operation::Daemon,
            EngineCommand::Info => Operation::Info,
            EngineCommand::Version => Operation::Version,
            EngineCommand::Login { .. } => Operation::Login,
            EngineCommand::Load { .. } => Operation::Load,
            EngineCommand::Build { .. } => Operation::Build,
            EngineCommand::Tag { .. } => Operation::Tag,
            EngineCommand::Push { .. } => Operation::Push,
            EngineCommand::Save { .. } => Operation::Save,
        }
    }

    /// docker バイナリに渡す引数列
    pub fn args(&self) -> Vec<String> {
        self.render(false)
    }

    /// トレース表示用の引数列（パスワードはマスク）
    pub fn masked_args(&self) -> Vec<String> {
        self.render(true)
    }

    fn render(&self, mask: bool) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match self {
            EngineCommand::Daemon(options) => {
                args.push("-d".into());
                if let Some(driver) = &options.storage_driver {
                    args.push("-s".into());
                    args.push(driver.clone());
                }
                if let Some(registry) = &options.insecure_registry {
                    args.push("--insecure-registry".into());
                    args.push(registry.clone());
                }
                for server in &options.dns {
                    args.push("--dns".into());
                    args.push(server.clone());
                }
            }
            EngineCommand::Info => args.push("info".into()),
            EngineCommand::Version => args.push("version".into()),
            EngineCommand::Login {
                username,
                password,
                email,
                registry,
            } => {
                args.extend([
                    "login".to_string(),
                    "-u".to_string(),
                    username.clone(),
                    "-p".to_string(),
                ]);
                args.push(if mask {
                    "********".into()
                } else {
                    password.clone()
                });
                // -e は古い Docker CLI のみが受け付けるため、指定がある場合だけ渡す
                if let Some(email) = email {
                    args.push("-e".into());
                    args.push(email.clone());
                }
                args.push(registry.clone());
            }
            EngineCommand::Load { input } => {
                args.extend(["load".to_string(), "-i".to_string()]);
                args.push(input.display().to_string());
            }
            EngineCommand::Build {
                dockerfile,
                reference,
                context,
            } => {
                args.extend([
                    "build".to_string(),
                    "--pull=true".to_string(),
                    "--rm=true".to_string(),
                    "-f".to_string(),
                    dockerfile.clone(),
                    "-t".to_string(),
                    reference.to_string(),
                    context.clone(),
                ]);
            }
            EngineCommand::Tag { source, target } => {
                args.extend(["tag".to_string(), source.to_string(), target.to_string()]);
            }
            EngineCommand::Push { reference } => {
                args.extend(["push".to_string(), reference.to_string()]);
            }
            EngineCommand::Save { output, images } => {
                args.extend(["save".to_string(), "-o".to_string()]);
                args.push(output.display().to_string());
                args.extend(images.iter().cloned());
            }
        }

        args
    }

    /// `$ docker build ...` 形式のトレース行
    pub fn trace_line(&self, program: &str) -> String {
        let mut line = format!("$ {}", program);
        for arg in self.masked_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(tag: &str) -> ImageReference {
        ImageReference::new("octocat/app", tag)
    }

    #[test]
    fn test_daemon_args_order() {
        let cmd = EngineCommand::Daemon(DaemonOptions {
            storage_driver: Some("overlay2".to_string()),
            insecure_registry: Some("https://registry.local".to_string()),
            dns: vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()],
        });

        assert_eq!(
            cmd.args(),
            vec![
                "-d",
                "-s",
                "overlay2",
                "--insecure-registry",
                "https://registry.local",
                "--dns",
                "8.8.8.8",
                "--dns",
                "8.8.4.4",
            ]
        );
    }

    #[test]
    fn test_daemon_args_minimal() {
        let cmd = EngineCommand::Daemon(DaemonOptions::default());
        assert_eq!(cmd.args(), vec!["-d"]);
    }

    #[test]
    fn test_build_args() {
        let cmd = EngineCommand::Build {
            dockerfile: "Dockerfile".to_string(),
            reference: reference("latest"),
            context: ".".to_string(),
        };

        assert_eq!(
            cmd.args(),
            vec![
                "build",
                "--pull=true",
                "--rm=true",
                "-f",
                "Dockerfile",
                "-t",
                "octocat/app:latest",
                "."
            ]
        );
        assert_eq!(cmd.operation(), Operation::Build);
    }

    #[test]
    fn test_login_password_masked_in_trace() {
        let cmd = EngineCommand::Login {
            username: "octocat".to_string(),
            password: "s3cret".to_string(),
            email: Some("octocat@github.com".to_string()),
            registry: "https://index.docker.io/v1/".to_string(),
        };

        assert!(cmd.args().contains(&"s3cret".to_string()));
        let trace = cmd.trace_line("/usr/bin/docker");
        assert!(!trace.contains("s3cret"));
        assert_eq!(
            trace,
            "$ /usr/bin/docker login -u octocat -p ******** -e octocat@github.com https://index.docker.io/v1/"
        );
    }

    #[test]
    fn test_login_without_email() {
        let cmd = EngineCommand::Login {
            username: "octocat".to_string(),
            password: "s3cret".to_string(),
            email: None,
            registry: "https://index.docker.io/v1/".to_string(),
        };
        assert!(!cmd.args().contains(&"-e".to_string()));
    }

    #[test]
    fn test_save_args() {
        let cmd = EngineCommand::Save {
            output: PathBuf::from("/ws/out/img.tar"),
            images: vec!["octocat/app:a".to_string(), "octocat/app:b".to_string()],
        };
        assert_eq!(
            cmd.args(),
            vec!["save", "-o", "/ws/out/img.tar", "octocat/app:a", "octocat/app:b"]
        );
    }

    #[test]
    fn test_tag_and_push_args() {
        let tag = EngineCommand::Tag {
            source: reference("1.0"),
            target: reference("latest"),
        };
        assert_eq!(tag.args(), vec!["tag", "octocat/app:1.0", "octocat/app:latest"]);

        let push = EngineCommand::Push {
            reference: reference("1.0"),
        };
        assert_eq!(push.args(), vec!["push", "octocat/app:1.0"]);
    }
}
