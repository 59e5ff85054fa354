//! FleetFlow image publishing pipeline
//!
//! This crate turns a checked-out source tree into a published container
//! image from a CI step: it normalizes the step parameters, starts the
//! Docker daemon and waits for it, logs in to the registry, builds the
//! image, applies every tag, pushes them, and optionally restores / saves
//! the image from / to a tar archive.
//!
//! Every Docker invocation goes through [`CommandExecutor`], so the stage
//! logic can be exercised without a real daemon.
//!
//! # Tag validation
//!
//! [`ConfigNormalizer`] rejects tags that `docker tag` would refuse (more
//! than 128 characters, a leading `.` or `-`, or characters outside
//! `[A-Za-z0-9._-]`) with [`PublishError::InvalidConfig`]. This happens
//! before the daemon is started, so a bad tag never reaches the build.
//! Archive tags are checked the same way.
//!
//! # Example
//!
//! ```ignore
//! use fleetflow_publish::{ConfigNormalizer, DockerCli, Pipeline, RawConfig};
//! use std::sync::Arc;
//!
//! let config = ConfigNormalizer::new("/drone/src").normalize(RawConfig {
//!     repo: Some("octocat/app".into()),
//!     tag: vec!["1.0".into(), "latest".into()],
//!     ..Default::default()
//! })?;
//!
//! let executor = Arc::new(DockerCli::default().with_workdir("/drone/src"));
//! let report = Pipeline::new(config, executor).run().await?;
//! println!("pushed {} tags", report.pushed.len());
//! ```

pub mod archive;
pub mod auth;
pub mod builder;
pub mod cert;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod progress;
pub mod pusher;
pub mod reference;

pub use archive::{ArchiveHandler, ArchiveLoad};
pub use auth::{AuthOutcome, RegistryAuthenticator};
pub use builder::ImageBuilder;
pub use command::{DaemonOptions, EngineCommand, Operation};
pub use config::{BuildConfig, ConfigNormalizer, RawArchive, RawConfig, RegistryCredentials};
pub use engine::{DaemonExit, DaemonHandle, EngineLauncher, Readiness, ReadinessProbe};
pub use error::{PublishError, Result};
pub use executor::{CommandExecutor, CommandOutcome, DockerCli, OutputMode};
pub use pipeline::{Pipeline, PipelineOptions, PipelineReport};
pub use pusher::ImagePusher;
pub use reference::ImageReference;
