//! ESPStream CLI.
//!
//! # Commands
//! ```text
//! espstream stream  --url <ws-url> --project <p> --cq <cq> --window <w> [--field <f>...]
//! espstream stream  --host <h> --port <n> [--tls] [--base-path <path>] --project ...
//! espstream run     --config <stream.yaml>
//! espstream decode  --schema <frame> --frame <frame>... [--format cbor|json]
//! espstream types
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use espstream_client::{ClientConfig, ServerAddress, SubscriptionConfig};
use espstream_core::types::TYPE_TABLE;
use espstream_core::WireFormat;
use espstream_observability::{init_tracing, LogConfig};
use std::path::PathBuf;

mod cmd_decode;
mod cmd_stream;
mod config;

#[derive(Parser)]
#[command(
    name = "espstream",
    about = "Stream and decode event stream processing window data",
    long_about = "
ESPStream CLI: subscribe to ESP windows over WebSocket and print their events,
or decode captured frames offline.

ENVIRONMENT VARIABLES:
  ESPSTREAM_AUTHORIZATION   Authorization header sent on connect
  RUST_LOG                  Log filter, overrides --verbose and config files
",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe to one window and print its events
    Stream {
        /// Full WebSocket URL of the server (base path included)
        #[arg(long, conflicts_with_all = ["host", "port", "tls", "base_path"])]
        url: Option<String>,
        /// Server host (alternative to --url)
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Use wss
        #[arg(long)]
        tls: bool,
        #[arg(long, default_value = "")]
        base_path: String,
        /// Authorization header value
        #[arg(long, env = "ESPSTREAM_AUTHORIZATION", hide_env_values = true)]
        authorization: Option<String>,
        #[arg(long)]
        project: String,
        /// Continuous query name
        #[arg(long)]
        cq: String,
        #[arg(long)]
        window: String,
        /// Server-side batching interval (0 = server default)
        #[arg(long, default_value_t = 0)]
        interval: u64,
        /// Maximum events per batch (0 = server default)
        #[arg(long, default_value_t = 0)]
        max_events: u64,
        /// Only include these fields (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Print events as JSON
        #[arg(long)]
        json: bool,
    },

    /// Stream every subscription listed in a YAML config file
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Print events as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode captured frames against a captured schema frame
    Decode {
        /// File holding the schema message
        #[arg(long)]
        schema: PathBuf,
        /// Files holding event or bulk messages
        #[arg(long = "frame", num_args = 1.., required = true)]
        frames: Vec<PathBuf>,
        /// Encoding the subscription negotiated
        #[arg(long, default_value = "cbor")]
        format: WireFormat,
        /// Print events as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the schema type names the decoder understands
    Types,
}

fn log_config(verbose: bool, json: bool) -> LogConfig {
    LogConfig {
        level: if verbose { "debug" } else { "info" }.into(),
        json,
        ..LogConfig::default()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Stream {
            url,
            host,
            port,
            tls,
            base_path,
            authorization,
            project,
            cq,
            window,
            interval,
            max_events,
            fields,
            json,
        } => {
            init_tracing(&log_config(cli.verbose, cli.json_logs));
            let address = match (url, host) {
                (Some(url), _) => ServerAddress::from_url(&url)?,
                (None, Some(host)) => ServerAddress::new(tls, host, port, &base_path),
                (None, None) => anyhow::bail!("either --url or --host is required"),
            };
            let mut config = ClientConfig::new(address.connect_url());
            config.authorization = authorization;
            let sub = SubscriptionConfig {
                project,
                cq,
                window,
                interval,
                max_events,
                fields,
            };
            cmd_stream::run(config, &[sub], json).await
        }

        Commands::Run { config, json } => {
            let config = config::StreamConfig::from_yaml_file(&config)?;
            let mut log = config.log.clone();
            if cli.verbose {
                log.level = "debug".into();
            }
            log.json |= cli.json_logs;
            init_tracing(&log);
            cmd_stream::run(config.client, &config.subscriptions, json).await
        }

        Commands::Decode {
            schema,
            frames,
            format,
            json,
        } => {
            init_tracing(&log_config(cli.verbose, cli.json_logs));
            cmd_decode::run(&schema, &frames, format, json)
                .with_context(|| format!("decoding against '{}'", schema.display()))
        }

        Commands::Types => {
            cmd_types();
            Ok(())
        }
    }
}

// ─── Command implementations ─────────────────────────────────────────────────

fn cmd_types() {
    println!("{:<12} DECODES AS", "SERVER TYPE");
    for (name, ty) in TYPE_TABLE {
        println!("{name:<12} {ty}");
    }
}
