use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use chat_relay::{
    ChatSession, ChatTransport, Commands, ConnectionMonitor, ConsoleRenderer, Container,
    ContainerConfig, RelayHttpClient, SessionConfig,
};

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            environment,
            mock_upstream,
            api_key,
            api_url,
            model,
        } => {
            let container = Arc::new(Container::new(ContainerConfig {
                api_key,
                api_url,
                model,
                environment,
                port,
                mock_upstream,
            }));
            let listener = TcpListener::bind((host.as_str(), port)).await?;
            chat_relay::serve(listener, container, shutdown_signal()).await?;
            info!("Relay stopped");
        }

        Commands::Chat {
            server,
            system_prompt,
            max_retries,
            retry_delay_ms,
            turn_timeout_secs,
        } => {
            let defaults = SessionConfig::default();
            let config = SessionConfig {
                system_prompt: system_prompt.unwrap_or(defaults.system_prompt),
                max_retries,
                retry_delay: Duration::from_millis(retry_delay_ms),
                turn_timeout: Duration::from_secs(turn_timeout_secs),
            };
            run_chat(&server, config).await?;
        }

        Commands::Status { server } => {
            let report = RelayHttpClient::new(server).fetch_status().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn run_chat(server: &str, config: SessionConfig) -> Result<()> {
    let renderer = Arc::new(ConsoleRenderer::new());
    let transport = Arc::new(RelayHttpClient::new(server));
    let monitor = Arc::new(ConnectionMonitor::new(transport.clone(), renderer.clone()));
    let session = ChatSession::new(transport, renderer.clone(), monitor.clone(), config);

    println!("Chatting via {}. Commands: /clear, /status, /quit", server);
    monitor.probe(false).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
            }
            "/status" => {
                monitor.probe(true).await;
            }
            text => {
                if !renderer.input_enabled() {
                    println!("{}", monitor.status().input_hint());
                    continue;
                }
                let turn = session.send(text);
                tokio::pin!(turn);
                loop {
                    tokio::select! {
                        _ = &mut turn => break,
                        _ = signal::ctrl_c() => {
                            session.abort();
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
