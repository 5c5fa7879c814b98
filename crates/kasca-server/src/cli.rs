// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Command line interface

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use kasca_logging::CliLoggingArgs;
use kasca_recorder::FinalizerKind;

use crate::config::{FileConfig, ServerConfig};
use crate::replay::ReplayArgs;
use crate::server::Server;
use crate::stats::StatsArgs;

#[derive(Parser, Debug)]
#[command(name = "kasca-server")]
#[command(about = "Keystroke and audio recording server")]
#[command(version, propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub logging: CliLoggingArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Accept keyboard and control connections and record sessions
    Serve(ServeArgs),
    /// Summarize a directory of finished recordings
    Stats(StatsArgs),
    /// Reconstruct the typed text of a finished recording
    Replay(ReplayArgs),
}

impl Commands {
    pub async fn run(self) -> Result<()> {
        match self {
            Commands::Serve(args) => args.run().await,
            Commands::Stats(args) => args.run().await,
            Commands::Replay(args) => args.run().await,
        }
    }
}

/// Flags override the `--config` file, which overrides built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(long, env = "KASCA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the server to
    #[arg(long, env = "KASCA_BIND_ADDR")]
    pub bind_addr: Option<SocketAddr>,

    /// Directory for recording documents and audio
    #[arg(long, env = "KASCA_RECORDINGS_DIR")]
    pub recordings_dir: Option<PathBuf>,

    /// Audio duration repair: ebml, ffmpeg or none
    #[arg(long, env = "KASCA_AUDIO_FINALIZER")]
    pub audio_finalizer: Option<FinalizerKind>,

    /// ffmpeg executable for the ffmpeg finalizer
    #[arg(long, env = "KASCA_FFMPEG_PATH")]
    pub ffmpeg_path: Option<PathBuf>,

    /// Audio chunks buffered per recording
    #[arg(long, env = "KASCA_AUDIO_QUEUE_CAPACITY")]
    pub audio_queue_capacity: Option<usize>,

    /// Finalize recordings idle for this many seconds (0 disables)
    #[arg(long, env = "KASCA_IDLE_RECORDING_TIMEOUT_SECS")]
    pub idle_recording_timeout_secs: Option<u64>,

    /// Seconds between idle checks
    #[arg(long, env = "KASCA_IDLE_CHECK_INTERVAL_SECS")]
    pub idle_check_interval_secs: Option<u64>,

    /// Random delay bound before each audio write, for ordering tests
    #[arg(long, env = "KASCA_CHUNK_DELAY_MS_MAX", hide = true)]
    pub chunk_delay_ms_max: Option<u64>,
}

impl ServeArgs {
    /// Layer defaults, the config file and these flags into one config.
    pub fn resolve(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::default();
        if let Some(path) = &self.config {
            config.merge(FileConfig::load(path)?);
        }
        config.merge(FileConfig {
            bind_addr: self.bind_addr,
            recordings_dir: self.recordings_dir.clone(),
            audio_finalizer: self.audio_finalizer,
            ffmpeg_path: self.ffmpeg_path.clone(),
            audio_queue_capacity: self.audio_queue_capacity,
            idle_recording_timeout_secs: self.idle_recording_timeout_secs,
            idle_check_interval_secs: self.idle_check_interval_secs,
            chunk_delay_ms_max: self.chunk_delay_ms_max,
        });
        config.validate()?;
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.resolve()?;
        let server = Server::new(config).await?;
        server.run().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_flags() {
        let cli = Cli::try_parse_from([
            "kasca-server",
            "--log-level",
            "debug",
            "serve",
            "--bind-addr",
            "0.0.0.0:9001",
            "--audio-finalizer",
            "none",
        ])
        .unwrap();
        assert!(cli.logging.log_level.is_some());
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9001");
        assert_eq!(config.audio_finalizer, FinalizerKind::None);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kasca.toml");
        std::fs::write(
            &path,
            "bind_addr = \"127.0.0.1:7000\"\nrecordings_dir = \"/srv/rec\"\n",
        )
        .unwrap();

        let args = ServeArgs {
            config: Some(path),
            recordings_dir: Some(PathBuf::from("/tmp/override")),
            ..ServeArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:7000");
        assert_eq!(config.recordings_dir, PathBuf::from("/tmp/override"));
    }

    #[test]
    fn test_replay_and_stats_parse() {
        let cli =
            Cli::try_parse_from(["kasca-server", "replay", "r.json", "--at", "1500"]).unwrap();
        let Commands::Replay(args) = cli.command else {
            panic!("expected replay");
        };
        assert_eq!(args.at, Some(1500));
        assert!(!args.events);

        let cli = Cli::try_parse_from(["kasca-server", "stats", "/data", "--json"]).unwrap();
        let Commands::Stats(args) = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(args.dir, PathBuf::from("/data"));
        assert!(args.json);
    }

    #[test]
    fn test_invalid_finalizer_is_rejected() {
        let err = Cli::try_parse_from(["kasca-server", "serve", "--audio-finalizer", "mp3"]);
        assert!(err.is_err());
    }
}
