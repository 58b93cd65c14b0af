mod actor;
mod config;
mod control;
mod runtime;
mod surface;

use actor::{ActorHandle, ActorInput, StatusActor};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{CliOverrides, StatusConfig};
use ovl_core::{AgentMode, InboundFrame, NdjsonFrameDecoder};
use ovl_session::{derive_window_size, Reconciler, SessionStore, StoreReader};
use runtime::{connection_loop, route_frame, ConnectionConfig, RecordingRuntime, SocketRuntime};
use serde_json::json;
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex as StdMutex},
};
use surface::{MemorySurface, NdjsonSurface};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    sync::mpsc,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ovl-status")]
#[command(about = "Status overlay state core for the desktop agent", long_about = None)]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Agent mode: legacy, goals or tools
    #[arg(long, global = true)]
    mode: Option<AgentMode>,
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay an NDJSON event log and print the resulting state
    Replay {
        /// Event log; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        /// Task submitted before the log is replayed
        #[arg(long)]
        submit: Option<String>,
    },
    /// Connect to the agent runtime and drive the overlay
    Attach {
        #[arg(long)]
        socket: Option<PathBuf>,
        #[arg(long)]
        submit: Option<String>,
    },
}

struct LogGuard {
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

struct MultiWriter {
    file: Option<Arc<StdMutex<std::fs::File>>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.write_all(buf);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket_path = match &cli.command {
        Commands::Attach { socket, .. } => socket.clone(),
        Commands::Replay { .. } => None,
    };
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        mode: cli.mode,
        socket_path,
        log_dir: cli.log_dir.clone(),
        debug: cli.debug,
    };
    let config = config::load(&overrides)?;
    let _log_guard = init_logging(&config);
    info!(event = "startup", mode = %config.mode, debug = config.debug);

    match cli.command {
        Commands::Replay { input, submit } => replay(&config, input.as_deref(), submit).await,
        Commands::Attach { submit, .. } => attach(&config, submit).await,
    }
}

async fn replay(config: &StatusConfig, input: Option<&Path>, submit: Option<String>) -> Result<()> {
    let raw = match input {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut raw = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut raw)
                .await
                .context("reading stdin")?;
            raw
        }
    };

    let runtime = RecordingRuntime::default();
    let (actor, handle) = StatusActor::new(
        Reconciler::new(SessionStore::new(config.mode)),
        Arc::new(runtime.clone()),
        MemorySurface::default(),
        config.layout,
    );
    let mut reader = handle.reader();
    let actor_task = tokio::spawn(actor.run());

    if let Some(command) = submit {
        handle.send(ActorInput::Submit(command)).await;
    }
    let mut decoder = NdjsonFrameDecoder::<InboundFrame>::new(config.max_frame_bytes);
    let mut batch = decoder.push_chunk(&raw);
    let tail = decoder.finish();
    batch.frames.extend(tail.frames);
    batch.errors.extend(tail.errors);
    for err in &batch.errors {
        warn!(event = "replay_frame_error", error = %err);
    }
    for frame in batch.frames {
        if let Some(input) = route_frame(frame) {
            handle.send(input).await;
        }
    }
    drop(handle);

    let surface = actor_task.await.context("status actor panicked")?;
    let snapshot = reader.latest();
    let commands: Vec<_> = runtime
        .commands()
        .iter()
        .map(|command| json!({ "command": command.name(), "args": command.args() }))
        .collect();
    let report = json!({
        "snapshot": snapshot,
        "window_size": derive_window_size(&snapshot, &config.layout),
        "commands": commands,
        "resizes": surface.resizes,
        "frame_errors": batch.errors.len(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn attach(config: &StatusConfig, submit: Option<String>) -> Result<()> {
    let (frames_tx, frames_rx) = mpsc::channel(256);
    let (actor, handle) = StatusActor::new(
        Reconciler::new(SessionStore::new(config.mode)),
        Arc::new(SocketRuntime::new(frames_tx)),
        NdjsonSurface::new(io::stdout()),
        config.layout,
    );
    let actor_task = tokio::spawn(actor.run());
    let connection_task = tokio::spawn(connection_loop(
        ConnectionConfig {
            socket_path: config.socket_path.clone(),
            max_frame_bytes: config.max_frame_bytes,
        },
        handle.sender(),
        frames_rx,
    ));
    let observer_task = tokio::spawn(observe_run_state(handle.reader()));

    if let Some(command) = submit {
        handle.send(ActorInput::Submit(command)).await;
    }
    let control_task = tokio::spawn(control_loop(handle.clone()));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!(event = "shutdown");
    control_task.abort();
    connection_task.abort();
    drop(handle);
    let _ = actor_task.await;
    let _ = observer_task.await;
    Ok(())
}

async fn control_loop(handle: ActorHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match control::parse_control_line(&line) {
                Ok(Some(input)) => {
                    if !handle.send(input).await {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(event = "control_line_rejected", error = %err),
            },
            Ok(None) => break,
            Err(err) => {
                warn!(event = "control_read_error", error = %err);
                break;
            }
        }
    }
}

async fn observe_run_state(mut reader: StoreReader) {
    let mut last = reader.latest().run_state;
    while reader.changed().await {
        let snapshot = reader.latest();
        if snapshot.run_state != last {
            info!(
                event = "run_state",
                from = ?last,
                to = ?snapshot.run_state,
                error = snapshot.error.as_deref().unwrap_or("")
            );
            last = snapshot.run_state;
        }
    }
}

fn init_logging(config: &StatusConfig) -> Option<LogGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let guard = match config.log_dir.as_deref().map(open_log_file) {
        Some(Ok(guard)) => guard,
        Some(Err(err)) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
        None => LogGuard { file: None },
    };
    let file = guard.file.clone();
    let make_writer = BoxMakeWriter::new(move || MultiWriter { file: file.clone() });
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(guard)
}

fn open_log_file(log_dir: &Path) -> io::Result<LogGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("ovl-status.log"))?;
    Ok(LogGuard {
        file: Some(Arc::new(StdMutex::new(file))),
    })
}
