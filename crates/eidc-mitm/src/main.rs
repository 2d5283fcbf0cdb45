mod cli;
mod config;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use message_pager::Category;
use mitm_server::{DialMode, Server, ServerConfig, TlsIdentity};
use mitm_session::Session;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;

    if let Some(port) = cli.port {
        cfg.network.listen_port = port;
    }
    if let Some(ref cert) = cli.cert {
        cfg.tls.cert_file = Some(cert.clone());
    }
    if let Some(ref key) = cli.key {
        cfg.tls.key_file = Some(key.clone());
    }
    if cli.plain_dial {
        cfg.network.plain_dial = true;
    }

    // 3. Init tracing.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!(
        config_file = %cli.config.display(),
        port = cfg.network.listen_port,
        "eidc-mitm starting"
    );

    // 4. Assemble the server.
    let tls = load_tls_identity(&cfg)?;
    if tls.is_none() {
        warn!("no certificate configured; listening without TLS");
    }

    let server = Server::new(ServerConfig {
        tls,
        dial_mode: if cfg.network.plain_dial {
            DialMode::Plain
        } else {
            DialMode::Tls
        },
        connect_timeout: Some(Duration::from_secs(cfg.network.connect_timeout_secs)),
    })
    .context("failed to build server")?;

    let mut sessions = server.subscribe_sessions().await;
    let mut errors = server.subscribe_errors().await;

    server
        .serve(cfg.network.listen_port)
        .await
        .context("failed to start listener")?;

    // 5. Surface listener errors.
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            warn!(%err, "listener error");
        }
    });

    // 6. Run sessions until ctrl-c.
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT (ctrl-c); stopping");
                server.stop();
                break;
            }
            maybe = sessions.recv() => match maybe {
                Some(session) => {
                    tokio::spawn(run_session(session));
                }
                None => break,
            }
        }
    }

    Ok(())
}

fn load_tls_identity(cfg: &config::Config) -> Result<Option<TlsIdentity>> {
    let (Some(cert_file), Some(key_file)) = (&cfg.tls.cert_file, &cfg.tls.key_file) else {
        return Ok(None);
    };

    let cert_pem = std::fs::read(cert_file)
        .with_context(|| format!("failed to read certificate {}", cert_file.display()))?;
    let key_pem = std::fs::read(key_file)
        .with_context(|| format!("failed to read private key {}", key_file.display()))?;

    let chain_der = match &cfg.tls.chain_file {
        Some(chain_file) => {
            let chain_pem = std::fs::read(chain_file)
                .with_context(|| format!("failed to read chain {}", chain_file.display()))?;
            openssl::x509::X509::stack_from_pem(&chain_pem)
                .context("failed to parse chain certificates")?
                .into_iter()
                .map(|cert| cert.to_der().context("failed to encode chain certificate"))
                .collect::<Result<Vec<_>>>()?
        }
        None => Vec::new(),
    };

    Ok(Some(TlsIdentity {
        cert_pem,
        key_pem,
        chain_der,
    }))
}

/// Observe one session: log every relayed message and every session
/// error until the connection dies.
async fn run_session(session: Arc<Session>) {
    let login = session.login();
    info!(
        session = %session.id(),
        host = %login.host,
        serial = %login.connected.serial_number,
        "session established"
    );

    let mut messages = session.pager().subscribe_category(Category::Any).await;
    let mut errors = session.subscribe_errors().await;

    // Observers are installed; let traffic flow.
    session.begin_relaying();

    loop {
        tokio::select! {
            maybe = messages.recv() => match maybe {
                Some(msg) => {
                    info!(
                        session = %session.id(),
                        direction = %msg.direction(),
                        msg_type = %msg.msg_type(),
                        injected = msg.injected(),
                        dropped = msg.dropped(),
                        "message"
                    );
                }
                None => break,
            },
            maybe = errors.recv() => {
                if let Some(err) = maybe {
                    warn!(session = %session.id(), %err, "session error");
                }
            }
            _ = session.done() => break,
        }
    }

    info!(
        session = %session.id(),
        heartbeats = session.heartbeats(),
        "session ended"
    );
}
