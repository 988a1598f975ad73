use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use tessera_config::TesseraConfig;
use tessera_core::events::{EventBus, FnListener};
use tessera_core::routine;
use tessera_engine::{Engine, Hooks};
use tessera_protocol::Message;
use tessera_socket::events::{parse_socket_message, SocketDisconnected, SocketMessageReceived};
use tessera_socket::SocketSubsystem;
use tessera_telemetry::{Logger, MetricsRecorder};

use crate::error::CliError;

const DEFAULT_PORT: u16 = 9000;

#[derive(Parser, Debug)]
#[command(name = "tessera", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Accept connections and echo every message back until Ctrl-C
    Serve(ServeArgs),
    /// Send one message and print the first reply
    Send(SendArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// YAML config file; defaults to config/tessera.yaml plus TESSERA_* env
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Listen port, overriding socket.listen_port
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Args, Debug, Clone)]
pub struct SendArgs {
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    #[arg(short, long)]
    pub message_id: i32,
    /// Message body, sent as UTF-8 bytes
    #[arg(long, default_value = "")]
    pub payload: String,
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,
}

pub async fn run_command(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Send(args) => send(args).await,
    }
}

/// Engine wired with the socket subsystem, sharing one bus and one
/// metrics registry.
struct Node {
    engine: Arc<Engine>,
    sockets: Arc<SocketSubsystem>,
    metrics: Arc<MetricsRecorder>,
}

fn build_node(config: &TesseraConfig) -> Result<Node, CliError> {
    let events = Arc::new(EventBus::with_debug(config.events.debug));
    let engine = Arc::new(Engine::with_events(events));
    let metrics = Arc::new(MetricsRecorder::new()?);

    let subsystem = SocketSubsystem::new(
        config.socket.clone(),
        engine.events().clone(),
        metrics.clone(),
    )?;
    let sockets = engine.register_subsystem(move |_| subsystem)?;

    Ok(Node {
        engine,
        sockets,
        metrics,
    })
}

async fn serve(args: ServeArgs) -> Result<(), CliError> {
    let mut config = match &args.config {
        Some(path) => TesseraConfig::load_from_path(path)?,
        None => TesseraConfig::load()?,
    };
    config.socket.listen_port = args
        .port
        .or(config.socket.listen_port)
        .or(Some(DEFAULT_PORT));

    Logger::init(&config.telemetry.log_filter, config.telemetry.thread_names)?;
    let Node {
        engine,
        sockets,
        metrics,
    } = build_node(&config)?;

    let echo_sockets = sockets.clone();
    engine
        .init(Hooks::none().post(move |engine| {
            let echo = FnListener::new("echo", move |_, payload| {
                let received = match parse_socket_message(payload) {
                    Ok(received) => received.clone(),
                    Err(e) => {
                        warn!(error = %e, "Unexpected socket message payload");
                        return;
                    }
                };
                let sockets = echo_sockets.clone();
                routine::spawn("echo", async move {
                    let request = received.message;
                    let reply = Message::new(request.message_id, request.data)
                        .with_correlation(-1, request.request_id);
                    sockets.send_message(received.socket_index, reply).await
                });
            });
            engine.events().register::<SocketMessageReceived>(&echo, &[]);
            Ok(())
        }))
        .await?;

    let stopper = engine.clone();
    routine::spawn("ctrl-c", async move {
        tokio::signal::ctrl_c().await?;
        stopper.stop();
        Ok::<(), std::io::Error>(())
    });

    let result = engine
        .start(
            Hooks::none().post(|_| {
                info!("Serving, press Ctrl-C to stop");
                Ok(())
            }),
            false,
        )
        .await;

    info!(metrics = %metrics.gather_metrics()?, "Final metrics");
    result.map_err(CliError::from)
}

async fn send(args: SendArgs) -> Result<(), CliError> {
    let mut config = TesseraConfig::load()?;
    config.socket.listen_port = None;

    Logger::init(&config.telemetry.log_filter, config.telemetry.thread_names)?;
    let Node { engine, .. } = build_node(&config)?;

    let (replies, mut reply_rx) = mpsc::unbounded_channel::<Option<Message>>();
    let on_reply = {
        let replies = replies.clone();
        FnListener::new("reply", move |_, payload| {
            if let Ok(received) = parse_socket_message(payload) {
                let _ = replies.send(Some(received.message.clone()));
            }
        })
    };
    let on_close = FnListener::new("closed", move |_, _| {
        let _ = replies.send(None);
    });
    engine
        .events()
        .register::<SocketMessageReceived>(&on_reply, &[]);
    engine.events().register::<SocketDisconnected>(&on_close, &[]);

    engine.init(Hooks::none()).await?;
    let running = tokio::spawn({
        let engine = engine.clone();
        async move { engine.start(Hooks::none(), false).await }
    });

    let exchange = async {
        let index = tessera_socket::connect(&engine, &args.host, args.port).await?;
        tessera_socket::send_message(&engine, index, args.message_id, args.payload.clone()).await?;

        let reply = tokio::time::timeout(Duration::from_millis(args.timeout_ms), reply_rx.recv())
            .await
            .map_err(|_| CliError::Timeout(args.timeout_ms))?
            .flatten()
            .ok_or(CliError::NoReply)?;
        println!(
            "{} {}",
            reply.message_id,
            String::from_utf8_lossy(&reply.data)
        );
        Ok::<(), CliError>(())
    }
    .await;

    engine.stop();
    running.await??;
    exchange
}
