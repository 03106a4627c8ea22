//! Courier binary.
//!
//! Runs a TCP dispatch server for the built-in endpoints, writes schema files
//! and endpoint manifests, and ships a small ping client for smoke tests.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use courier_dispatch::{dump_schemas, Dispatcher, EndpointRegistry};
use courier_wire::{CborCodec, Message};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod handlers;
mod logging;
mod server;

use config::CourierConfig;
use handlers::{Ping, Pong};
use logging::CourierLogFormatter;
use server::FrameDecoder;

/// Envelope dispatch server and tooling
#[derive(Parser, Debug)]
#[command(name = "courier", version, about = "Envelope dispatch server and tooling")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "courier.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the built-in endpoints over TCP
    Serve {
        /// Listen address, e.g. 0.0.0.0:7400
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Upper bound on shared handler pool threads
        #[arg(long)]
        max_pool_threads: Option<usize>,

        /// Log handlers slower than this, e.g. 2s
        #[arg(long)]
        slow_handler_threshold: Option<humantime::Duration>,

        /// Build the registry from a stored manifest
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Write request and response schema files
    DumpSchemas {
        /// Output directory
        #[arg(long)]
        out: Option<PathBuf>,

        /// Drop package lines
        #[arg(long)]
        remove_package: bool,

        /// Suffix packages with request or response
        #[arg(long)]
        suffix_kind: bool,
    },

    /// Write the endpoint manifest, or print it as JSON
    Manifest {
        /// Output file for the binary manifest
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Send one ping and wait for the pong
    Ping {
        /// Server address
        #[arg(long, default_value = "127.0.0.1:7400")]
        connect: SocketAddr,

        /// Sequence number
        #[arg(long, default_value = "1")]
        seq: u32,

        /// Give up after this long
        #[arg(long, default_value = "5s")]
        timeout: humantime::Duration,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = args
        .log_level
        .clone()
        .or_else(|| std::env::var("COURIER_LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());

    let env_filter = EnvFilter::new("info")
        .add_directive(format!("courier={}", log_level).parse()?)
        .add_directive(format!("courier_buffer={}", log_level).parse()?)
        .add_directive(format!("courier_wire={}", log_level).parse()?)
        .add_directive(format!("courier_dispatch={}", log_level).parse()?);

    let formatter = CourierLogFormatter::new("courier");

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(true)
        .event_format(formatter)
        .init();

    info!("Starting courier v{}", env!("CARGO_PKG_VERSION"));

    let mut config = CourierConfig::load_from_file(&args.config)?;
    let codec = CborCodec::new();

    match args.command {
        Command::Serve {
            listen,
            max_pool_threads,
            slow_handler_threshold,
            manifest,
        } => {
            if let Some(listen) = listen {
                config.listen = listen.to_string();
            }
            if let Some(threads) = max_pool_threads {
                config.max_pool_threads = threads;
            }
            if let Some(threshold) = slow_handler_threshold {
                config.slow_handler_threshold = threshold.into();
            }
            let registry = match manifest {
                Some(path) => {
                    let data = std::fs::read(&path)
                        .with_context(|| format!("reading manifest {:?}", path))?;
                    info!("Loading endpoints from manifest {:?}", path);
                    handlers::registry_from_manifest(&data, &codec)?
                }
                None => handlers::registry()?,
            };
            serve(config, registry, codec).await
        }
        Command::DumpSchemas {
            out,
            remove_package,
            suffix_kind,
        } => {
            if let Some(out) = out {
                config.schema_dir = out;
            }
            config.schema.remove_package |= remove_package;
            config.schema.suffix_kind |= suffix_kind;

            let registry = handlers::registry()?;
            let options = config.schema_options();
            let written = dump_schemas(&registry, &codec, &config.schema_dir, &options)?;
            for path in written {
                println!("{}", path.display());
            }
            Ok(())
        }
        Command::Manifest { out } => {
            let registry = handlers::registry()?;
            match out {
                Some(path) => {
                    let data = registry.save_manifest(&codec)?;
                    std::fs::write(&path, &data)
                        .with_context(|| format!("writing manifest {:?}", path))?;
                    info!("Wrote {} endpoints to {:?}", registry.len(), path);
                }
                None => println!("{}", serde_json::to_string_pretty(&registry.manifest())?),
            }
            Ok(())
        }
        Command::Ping { connect, seq, timeout } => ping(connect, seq, timeout.into(), &codec).await,
    }
}

async fn serve(
    config: CourierConfig,
    registry: EndpointRegistry,
    codec: CborCodec,
) -> anyhow::Result<()> {
    registry.precompile(&codec)?;
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(registry),
        Arc::new(codec),
        config.dispatch_config(),
    )?);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding {}", config.listen))?;

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to install SIGTERM handler: {}", e))?;

    tokio::select! {
        result = server::serve(listener, dispatcher, config.max_frame_bytes) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
            Ok(())
        }
    }
}

async fn ping(
    addr: SocketAddr,
    seq: u32,
    timeout: std::time::Duration,
    codec: &CborCodec,
) -> anyhow::Result<()> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connecting to {}", addr))?;

    let request = Message::stamped(ping_sync_key(seq), Ping { seq })?;
    let sync_key = request.header().sync_key().to_string();
    let frame = server::encode_frame(&request.serialize::<Ping, _>(codec)?)?;
    let started = std::time::Instant::now();
    stream.write_all(&frame).await?;

    let mut decoder = FrameDecoder::new(CourierConfig::default().max_frame_bytes);
    let read = server::read_frame(&mut stream, &mut decoder);
    let reply = match tokio::time::timeout(timeout, read).await {
        Ok(result) => result?,
        Err(_) => bail!("no reply from {} within {}", addr, humantime::format_duration(timeout)),
    };
    let Some(reply) = reply else {
        bail!("{} closed the connection without replying", addr);
    };

    let message = Message::parse(&reply, codec)?;
    if message.header().sync_key() != sync_key {
        bail!("reply sync key {} does not match {}", message.header().sync_key(), sync_key);
    }
    let pong = message.deserialize::<Pong, _>(codec)?;
    println!(
        "{} from {} seq={} time={}",
        message.header().endpoint(),
        addr,
        pong.seq,
        humantime::format_duration(started.elapsed())
    );
    Ok(())
}

fn ping_sync_key(seq: u32) -> String {
    format!("ping-{}-{}", std::process::id(), seq)
}
