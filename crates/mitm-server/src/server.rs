//! The accept loop.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use mitm_session::{ConnectionDetail, MitmEndpoints, Session};
use openssl::ssl::{Ssl, SslContext};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio_openssl::SslStream;
use tracing::{debug, info, warn};

use crate::dial::{connect_manager, DialMode, ManagerStream};
use crate::error::ServerError;
use crate::login::peek_login;
use crate::tls::{server_context, TlsIdentity};

/// How long a best-effort announcement waits on a full subscriber queue.
const ANNOUNCE_TIMEOUT: Duration = Duration::from_millis(100);

/// Queue depth for session and error subscribers.
const SUBSCRIBER_QUEUE: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// TLS identity presented to controllers; `None` listens in plain TCP.
    pub tls: Option<TlsIdentity>,
    /// Transport used toward the manager.
    pub dial_mode: DialMode,
    /// Timeout applied to the login peek and the manager dial.
    pub connect_timeout: Option<Duration>,
}

struct ServerShared {
    tls: Option<SslContext>,
    dial_mode: DialMode,
    connect_timeout: Option<Duration>,
    session_subs: AsyncMutex<Vec<mpsc::Sender<Arc<Session>>>>,
    err_subs: AsyncMutex<Vec<mpsc::Sender<Arc<ServerError>>>>,
}

impl ServerShared {
    async fn report(&self, err: ServerError) {
        warn!(%err, "listener error");
        let err = Arc::new(err);
        let subs = self.err_subs.lock().await;
        for tx in subs.iter() {
            let _ = tokio::time::timeout(ANNOUNCE_TIMEOUT, tx.send(Arc::clone(&err))).await;
        }
    }

    /// Best-effort announcement to subscribers in registration order.
    async fn announce(&self, session: Arc<Session>) {
        let subs = self.session_subs.lock().await;
        for tx in subs.iter() {
            let _ = tokio::time::timeout(ANNOUNCE_TIMEOUT, tx.send(Arc::clone(&session))).await;
        }
    }
}

/// Accepts controller connections and turns each into a [`Session`].
pub struct Server {
    shared: Arc<ServerShared>,
    stop: watch::Sender<bool>,
}

impl Server {
    /// Build a server. The TLS context (when configured) is constructed
    /// eagerly so certificate problems surface here, not at first accept.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let tls = config.tls.as_ref().map(server_context).transpose()?;
        let (stop, _) = watch::channel(false);
        Ok(Self {
            shared: Arc::new(ServerShared {
                tls,
                dial_mode: config.dial_mode,
                connect_timeout: config.connect_timeout,
                session_subs: AsyncMutex::new(Vec::new()),
                err_subs: AsyncMutex::new(Vec::new()),
            }),
            stop,
        })
    }

    /// Subscribe to new sessions. Sessions arrive with their relay lock
    /// still held; the subscriber configures them and calls
    /// [`Session::begin_relaying`].
    pub async fn subscribe_sessions(&self) -> mpsc::Receiver<Arc<Session>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.shared.session_subs.lock().await.push(tx);
        rx
    }

    /// Subscribe to listener-level errors.
    pub async fn subscribe_errors(&self) -> mpsc::Receiver<Arc<ServerError>> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE);
        self.shared.err_subs.lock().await.push(tx);
        rx
    }

    /// Bind the listener and start accepting in a background task.
    pub async fn serve(&self, port: u16) -> Result<(), ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(ServerError::Bind)?;
        info!(port, tls = self.shared.tls.is_some(), "listening for controllers");

        let shared = Arc::clone(&self.shared);
        let stop_rx = self.stop.subscribe();
        tokio::spawn(accept_loop(listener, shared, stop_rx));
        Ok(())
    }

    /// Close the listener; the accept loop exits after surfacing
    /// [`ServerError::Closed`] once. Live sessions are unaffected.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    shared: Arc<ServerShared>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                let stopped = match changed {
                    Ok(()) => *stop_rx.borrow(),
                    Err(_) => true,
                };
                if stopped {
                    shared.report(ServerError::Closed).await;
                    return;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((tcp, peer)) => {
                    debug!(%peer, "controller connected");
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(err) = init_session(tcp, shared.clone()).await {
                            shared.report(err).await;
                        }
                    });
                }
                Err(err) => {
                    shared.report(ServerError::Accept(err)).await;
                }
            }
        }
    }
}

/// Per-connection initialization: optional TLS accept, login peek,
/// manager dial, session construction, announcement.
async fn init_session(tcp: TcpStream, shared: Arc<ServerShared>) -> Result<(), ServerError> {
    let client_side = ConnectionDetail {
        client: tcp.peer_addr().map(|a| a.to_string()).unwrap_or_default(),
        server: tcp.local_addr().map(|a| a.to_string()).unwrap_or_default(),
    };

    match shared.tls.clone() {
        Some(ctx) => {
            let ssl = Ssl::new(&ctx)?;
            let mut stream = SslStream::new(ssl, tcp)?;
            Pin::new(&mut stream)
                .accept()
                .await
                .map_err(|err| ServerError::Handshake(err.to_string()))?;
            establish(stream, client_side, shared).await
        }
        None => establish(tcp, client_side, shared).await,
    }
}

async fn establish<C>(
    mut client: C,
    client_side: ConnectionDetail,
    shared: Arc<ServerShared>,
) -> Result<(), ServerError>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (login, initial) = peek_login(&mut client, shared.connect_timeout).await?;
    info!(host = %login.host, serial = %login.connected.serial_number, "controller login");

    let dial = connect_manager(&login.host, shared.dial_mode);
    let manager = match shared.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, dial)
            .await
            .map_err(|_| ServerError::Timeout)??,
        None => dial.await?,
    };

    let session = match manager {
        ManagerStream::Tls(stream) => {
            let server_side = server_side_detail(stream.get_ref());
            Session::spawn(
                client,
                stream,
                initial,
                login,
                MitmEndpoints {
                    client_side,
                    server_side,
                },
            )
        }
        ManagerStream::Plain(stream) => {
            let server_side = server_side_detail(&stream);
            Session::spawn(
                client,
                stream,
                initial,
                login,
                MitmEndpoints {
                    client_side,
                    server_side,
                },
            )
        }
    };

    shared.announce(session).await;
    Ok(())
}

fn server_side_detail(stream: &TcpStream) -> ConnectionDetail {
    ConnectionDetail {
        client: stream.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        server: stream.peer_addr().map(|a| a.to_string()).unwrap_or_default(),
    }
}
