//! Connection multiplexer: one task owning the listener and every lobby socket.
//!
//! [`Lobby::run`] is the only code that ever touches lobby-phase connections
//! or the [`Matchmaker`].  Each iteration waits for the first of:
//!
//! 1. a new connection on the listener,
//! 2. readiness on any registered connection (readable, or writable while
//!    it still has queued output),
//! 3. a [`LobbyCommand`] from a [`LobbyHandle`] (session cleanup, snapshots),
//! 4. a 200 ms tick, so a cleared `running` flag is noticed promptly.
//!
//! Because there is exactly one owner, no locks are needed for the directory
//! or the connection map.
//!
//! # Readiness fan-in (for beginners)
//!
//! Every registered [`TcpStream`] contributes a small future that completes
//! when the socket is ready.  `futures_util::future::select_all` turns that
//! set into one future; once it yields, every other waiter that is already
//! complete is collected too, so one wake serves every ready connection and a
//! busy peer cannot starve the rest.  Sockets are then read with `try_read`,
//! which never blocks: a `WouldBlock` result only means the readiness was
//! spurious and the loop simply waits again.
//!
//! # Output
//!
//! The loop never waits on a peer.  Replies are appended to the connection's
//! outbound buffer and written with `try_write` as far as the socket accepts.
//! Whatever is left is flushed when the socket becomes writable.  A peer that
//! lets more than [`MAX_PENDING_OUTPUT`] bytes pile up is disconnected.
//!
//! # Framing
//!
//! Each read of up to 1024 bytes is decoded on its own (see
//! [`checkers_core::protocol::codec`]); messages are dispatched in order.
//! If a message hands the connection off to a session, the remaining messages
//! of that chunk are dropped: the lobby never interprets bytes that arrived on
//! a connection after it was handed off.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use checkers_core::protocol::codec::{decode_bytes, SERVER_READ_LIMIT};
use checkers_core::{ClientBound, PlayerIdentity};
use futures_util::future::{select_all, FutureExt};
use thiserror::Error;
use tokio::io::{Interest, Ready};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::application::{ConnId, LobbyAction, Matchmaker};

use super::handoff::{into_blocking, Session, SessionCleanup, SessionParticipant, SessionRelay};

/// How often the loop wakes up on its own to check the stop flag.
const TICK: Duration = Duration::from_millis(200);

/// Unsent bytes a connection may accumulate before it is disconnected.
pub const MAX_PENDING_OUTPUT: usize = 256 * 1024;

/// Error type for the lobby listener.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// The TCP listener could not be bound.
    #[error("failed to bind lobby listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The bound address could not be read back.
    #[error("failed to read lobby listener address: {0}")]
    LocalAddr(#[source] io::Error),

    /// The lobby task is no longer running.
    #[error("lobby is not running")]
    Stopped,
}

/// Requests served by the lobby task between socket events.
#[derive(Debug)]
pub enum LobbyCommand {
    /// A session is over; forget both participants.
    ReleaseSession { asker: ConnId, accepter: ConnId },
    /// Report the current directory state.
    Snapshot(oneshot::Sender<LobbySnapshot>),
}

/// A read-only copy of the lobby's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobbySnapshot {
    pub players: Vec<PlayerIdentity>,
    pub nickname_count: usize,
    pub code_count: usize,
    /// Connections handed off to sessions that have not been released.
    pub in_session: usize,
    /// Connections the lobby itself still reads from.
    pub registered: usize,
}

/// Cloneable handle for talking to a running [`Lobby`].
#[derive(Debug, Clone)]
pub struct LobbyHandle {
    commands: mpsc::UnboundedSender<LobbyCommand>,
}

impl LobbyHandle {
    /// Asks the lobby to forget both participants of a finished session.
    pub fn release_session(&self, asker: ConnId, accepter: ConnId) -> Result<(), LobbyError> {
        self.commands
            .send(LobbyCommand::ReleaseSession { asker, accepter })
            .map_err(|_| LobbyError::Stopped)
    }

    /// Fetches a snapshot of the directory.
    pub async fn snapshot(&self) -> Result<LobbySnapshot, LobbyError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(LobbyCommand::Snapshot(tx))
            .map_err(|_| LobbyError::Stopped)?;
        rx.await.map_err(|_| LobbyError::Stopped)
    }
}

/// A lobby-phase connection and the output not yet taken by its socket.
struct Registration {
    stream: TcpStream,
    outbound: Vec<u8>,
}

impl Registration {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            outbound: Vec::new(),
        }
    }

    /// Readiness worth waking up for.
    fn interest(&self) -> Interest {
        if self.outbound.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        }
    }

    /// Writes queued output until it is gone or the socket is full.
    fn flush(&mut self) -> io::Result<()> {
        while !self.outbound.is_empty() {
            match self.stream.try_write(&self.outbound) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// What woke the loop up.
enum Wake {
    Accepted(io::Result<(TcpStream, SocketAddr)>),
    Ready(Vec<(ConnId, io::Result<Ready>)>),
    Command(LobbyCommand),
    Tick,
}

/// The lobby server: listener, registered connections, and matchmaking state.
pub struct Lobby {
    listener: TcpListener,
    local_addr: SocketAddr,
    connections: HashMap<ConnId, Registration>,
    matchmaker: Matchmaker,
    relay: Box<dyn SessionRelay>,
    commands_tx: mpsc::UnboundedSender<LobbyCommand>,
    commands_rx: mpsc::UnboundedReceiver<LobbyCommand>,
    next_conn: u64,
}

impl Lobby {
    /// Binds the listener.  Handed-off sessions are started with `relay`.
    ///
    /// # Errors
    ///
    /// Returns [`LobbyError::Bind`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr, relay: Box<dyn SessionRelay>) -> Result<Self, LobbyError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| LobbyError::Bind { addr, source })?;
        let local_addr = listener.local_addr().map_err(LobbyError::LocalAddr)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        info!("lobby listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            connections: HashMap::new(),
            matchmaker: Matchmaker::new(),
            relay,
            commands_tx,
            commands_rx,
            next_conn: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> LobbyHandle {
        LobbyHandle {
            commands: self.commands_tx.clone(),
        }
    }

    /// Serves connections until `running` is cleared.
    pub async fn run(mut self, running: Arc<AtomicBool>) {
        let mut tick = interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while running.load(Ordering::Relaxed) {
            let wake = {
                let ready_set = ready_connections(&self.connections);
                tokio::select! {
                    accepted = self.listener.accept() => Wake::Accepted(accepted),
                    ready = ready_set => Wake::Ready(ready),
                    Some(cmd) = self.commands_rx.recv() => Wake::Command(cmd),
                    _ = tick.tick() => Wake::Tick,
                }
            };

            match wake {
                Wake::Accepted(Ok((stream, peer))) => self.register(stream, peer),
                Wake::Accepted(Err(e)) => warn!("accept failed: {e}"),
                Wake::Ready(ready) => {
                    for (conn, readiness) in ready {
                        match readiness {
                            Ok(readiness) => self.serve(conn, readiness),
                            Err(e) => self.close(conn, &format!("readiness error: {e}")),
                        }
                    }
                }
                Wake::Command(cmd) => self.on_command(cmd),
                Wake::Tick => {}
            }
        }

        info!(
            "lobby stopped with {} open connection(s)",
            self.connections.len()
        );
    }

    // ── Socket events ─────────────────────────────────────────────────────────

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) {
        let conn = ConnId(self.next_conn);
        self.next_conn += 1;

        let mut registration = Registration::new(stream);
        registration
            .outbound
            .extend_from_slice(ClientBound::Hello.encode().as_bytes());
        if let Err(e) = registration.flush() {
            warn!("{conn}: greeting {peer} failed, dropping connection: {e}");
            return;
        }
        info!("{conn}: connected from {peer}");
        self.connections.insert(conn, registration);
    }

    /// Handles one readiness report.  `conn` may already be gone if an
    /// earlier report of the same wake closed or handed it off.
    fn serve(&mut self, conn: ConnId, readiness: Ready) {
        if readiness.is_writable() {
            self.flush(conn);
        }
        if readiness.is_readable() {
            self.read_from(conn);
        }
    }

    fn read_from(&mut self, conn: ConnId) {
        let Some(registration) = self.connections.get(&conn) else {
            return;
        };

        let mut buf = [0u8; SERVER_READ_LIMIT];
        match registration.stream.try_read(&mut buf) {
            Ok(0) => self.close(conn, "peer closed the connection"),
            Ok(n) => {
                let messages = decode_bytes(&buf[..n]);
                self.dispatch(conn, &messages);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => self.close(conn, &format!("read failed: {e}")),
        }
    }

    /// Feeds the messages of one chunk to the matchmaker, in order.
    fn dispatch(&mut self, conn: ConnId, messages: &[String]) {
        for (i, message) in messages.iter().enumerate() {
            if !self.connections.contains_key(&conn) {
                debug!(
                    "{conn}: no longer in the lobby, dropping {} message(s)",
                    messages.len() - i
                );
                return;
            }
            debug!("{conn}: <{message}>");
            for action in self.matchmaker.handle_message(conn, message) {
                self.execute(action);
            }
        }
    }

    fn execute(&mut self, action: LobbyAction) {
        match action {
            LobbyAction::Send { to, message } => self.send(to, &message),
            LobbyAction::Handoff { asker, accepter } => self.handoff(asker, accepter),
        }
    }

    /// Queues `message` for `to` and writes what the socket accepts now.
    fn send(&mut self, to: ConnId, message: &ClientBound) {
        let Some(registration) = self.connections.get_mut(&to) else {
            debug!("{to}: not registered, skipping {message:?}");
            return;
        };
        registration
            .outbound
            .extend_from_slice(message.encode().as_bytes());
        self.flush(to);
    }

    fn flush(&mut self, conn: ConnId) {
        let Some(registration) = self.connections.get_mut(&conn) else {
            return;
        };
        let written = registration.flush();
        let backlog = registration.outbound.len();
        match written {
            Err(e) => self.close(conn, &format!("write failed: {e}")),
            Ok(()) if backlog > MAX_PENDING_OUTPUT => {
                self.close(conn, &format!("{backlog} bytes unread by the peer"));
            }
            Ok(()) => {}
        }
    }

    /// Deregisters `conn`, closes its socket, and forgets its directory entries.
    fn close(&mut self, conn: ConnId, reason: &str) {
        if self.connections.remove(&conn).is_some() {
            info!("{conn}: closed ({reason})");
        }
        self.matchmaker.connection_closed(conn);
    }

    // ── Handoff ───────────────────────────────────────────────────────────────

    fn handoff(&mut self, asker: ConnId, accepter: ConnId) {
        match (
            self.connections.remove(&asker),
            self.connections.remove(&accepter),
        ) {
            (Some(a), Some(b)) => self.start_session(asker, a, accepter, b),
            (a, b) => {
                warn!("handoff {asker} / {accepter} with a participant missing, cancelled");
                for (conn, registration) in [(asker, a), (accepter, b)] {
                    if let Some(registration) = registration {
                        self.connections.insert(conn, registration);
                    }
                    self.matchmaker.leave_session(conn);
                }
            }
        }
    }

    fn start_session(
        &mut self,
        asker: ConnId,
        a: Registration,
        accepter: ConnId,
        b: Registration,
    ) {
        let streams = into_blocking(asker, a.stream).and_then(|a_stream| {
            into_blocking(accepter, b.stream).map(|b_stream| (a_stream, b_stream))
        });

        match streams {
            Ok((a_stream, b_stream)) => {
                info!("handing {asker} and {accepter} to a session");
                self.relay.start_session(Session {
                    asker: SessionParticipant::new(asker, a_stream).with_unsent(a.outbound),
                    accepter: SessionParticipant::new(accepter, b_stream).with_unsent(b.outbound),
                    cleanup: SessionCleanup::new(asker, accepter, self.commands_tx.clone()),
                });
            }
            Err(e) => {
                error!("handoff {asker} / {accepter} failed, closing both: {e}");
                self.matchmaker.release_session(asker, accepter);
            }
        }
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    fn on_command(&mut self, cmd: LobbyCommand) {
        match cmd {
            LobbyCommand::ReleaseSession { asker, accepter } => {
                debug!("releasing session {asker} / {accepter}");
                self.matchmaker.release_session(asker, accepter);
            }
            LobbyCommand::Snapshot(reply) => {
                // The requester may have given up; nothing to do then.
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> LobbySnapshot {
        let directory = self.matchmaker.directory();
        LobbySnapshot {
            players: directory.players().cloned().collect(),
            nickname_count: directory.nickname_count(),
            code_count: directory.code_count(),
            in_session: self.matchmaker.session_count(),
            registered: self.connections.len(),
        }
    }
}

/// Completes with every registered connection that is ready, at least one.
/// Never completes when there are no connections.
fn ready_connections(
    connections: &HashMap<ConnId, Registration>,
) -> impl Future<Output = Vec<(ConnId, io::Result<Ready>)>> + '_ {
    async move {
        if connections.is_empty() {
            return std::future::pending().await;
        }
        let waiters = connections.iter().map(|(&conn, registration)| {
            let interest = registration.interest();
            Box::pin(async move { (conn, registration.stream.ready(interest).await) })
        });
        let (first, _, rest) = select_all(waiters).await;

        let mut ready = vec![first];
        ready.extend(rest.into_iter().filter_map(|waiter| waiter.now_or_never()));
        ready
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::handoff::MockSessionRelay;
    use checkers_core::decode_chunk;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    /// Reads until at least `n` messages have arrived.
    async fn read_messages(stream: &mut TcpStream, n: usize) -> Vec<String> {
        let mut messages = Vec::new();
        let mut buf = [0u8; 1024];
        while messages.len() < n {
            let len = timeout(WAIT, stream.read(&mut buf))
                .await
                .expect("timed out waiting for lobby")
                .expect("read");
            assert!(len > 0, "lobby closed the connection");
            let text = String::from_utf8_lossy(&buf[..len]).into_owned();
            messages.extend(decode_chunk(&text).into_iter().map(str::to_string));
        }
        messages
    }

    async fn connect(addr: SocketAddr) -> TcpStream {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        assert_eq!(read_messages(&mut stream, 1).await, vec!["checkers:Hello"]);
        stream
    }

    async fn configure(stream: &mut TcpStream, nick: &str) -> String {
        stream
            .write_all(format!("checkers:config {nick} aW1n!").as_bytes())
            .await
            .unwrap();
        let reply = read_messages(stream, 1).await.remove(0);
        reply
            .strip_prefix("checkers:confOk ")
            .unwrap_or_else(|| panic!("expected confOk, got {reply}"))
            .to_string()
    }

    async fn start(relay: MockSessionRelay) -> (SocketAddr, LobbyHandle, Arc<AtomicBool>) {
        let lobby = Lobby::bind("127.0.0.1:0".parse().unwrap(), Box::new(relay))
            .await
            .expect("bind");
        let addr = lobby.local_addr();
        let handle = lobby.handle();
        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(lobby.run(Arc::clone(&running)));
        (addr, handle, running)
    }

    #[tokio::test]
    async fn test_accepted_connection_is_greeted_and_registered() {
        // Arrange
        let mut relay = MockSessionRelay::new();
        relay.expect_start_session().never();
        let (addr, handle, running) = start(relay).await;

        // Act
        let _client = connect(addr).await;
        let snapshot = handle.snapshot().await.unwrap();

        // Assert
        assert_eq!(snapshot.registered, 1);
        assert!(snapshot.players.is_empty());
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_closed_connection_is_removed_from_directory() {
        // Arrange
        let mut relay = MockSessionRelay::new();
        relay.expect_start_session().never();
        let (addr, handle, running) = start(relay).await;
        let mut alice = connect(addr).await;
        configure(&mut alice, "YWxpY2U=").await;
        assert_eq!(handle.snapshot().await.unwrap().players.len(), 1);

        // Act
        drop(alice);
        let mut snapshot = handle.snapshot().await.unwrap();
        for _ in 0..50 {
            if snapshot.registered == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            snapshot = handle.snapshot().await.unwrap();
        }

        // Assert
        assert_eq!(snapshot.registered, 0);
        assert_eq!(snapshot.nickname_count, 0);
        assert_eq!(snapshot.code_count, 0);
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_accepted_invite_hands_both_connections_to_the_relay() {
        // Arrange
        let (session_tx, mut session_rx) = mpsc::unbounded_channel();
        let mut relay = MockSessionRelay::new();
        relay
            .expect_start_session()
            .times(1)
            .returning(move |session| {
                let _ = session_tx.send(session);
            });
        let (addr, handle, running) = start(relay).await;

        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;
        let alice_code = configure(&mut alice, "YWxpY2U=").await;
        let bob_code = configure(&mut bob, "Ym9i").await;

        // Act
        bob.write_all(format!("checkers:inviteAsk {alice_code}!").as_bytes())
            .await
            .unwrap();
        let proposal = read_messages(&mut alice, 1).await;
        alice
            .write_all(format!("checkers:inviteOk {bob_code}!").as_bytes())
            .await
            .unwrap();
        let accepted = read_messages(&mut bob, 1).await;
        let session = timeout(WAIT, session_rx.recv())
            .await
            .expect("relay was never called")
            .expect("session");

        // Assert
        assert_eq!(proposal, vec![format!("checkers:inviteAsk Ym9i aW1n {bob_code}")]);
        assert_eq!(accepted, vec![format!("checkers:inviteOk {bob_code}")]);
        assert_eq!(session.asker.peer, Some(bob.local_addr().unwrap()));
        assert_eq!(session.accepter.peer, Some(alice.local_addr().unwrap()));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.registered, 0);
        assert_eq!(snapshot.in_session, 2);
        assert_eq!(snapshot.players.len(), 2, "players stay listed until cleanup");

        // Act: ending the session releases both players.
        session.cleanup.release();
        let snapshot = handle.snapshot().await.unwrap();

        // Assert
        assert_eq!(snapshot.in_session, 0);
        assert!(snapshot.players.is_empty());
        assert_eq!(snapshot.code_count, 0);
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_release_through_handle_is_accepted() {
        let mut relay = MockSessionRelay::new();
        relay.expect_start_session().never();
        let (_addr, handle, running) = start(relay).await;

        handle.release_session(ConnId(0), ConnId(1)).unwrap();

        assert_eq!(handle.snapshot().await.unwrap().in_session, 0);
        running.store(false, Ordering::Relaxed);
    }

    #[tokio::test]
    async fn test_lobby_stops_when_flag_is_cleared() {
        // Arrange
        let relay = Box::new(MockSessionRelay::new());
        let lobby = Lobby::bind("127.0.0.1:0".parse().unwrap(), relay)
            .await
            .unwrap();
        let handle = lobby.handle();
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(lobby.run(Arc::clone(&running)));

        // Act
        running.store(false, Ordering::Relaxed);

        // Assert
        timeout(WAIT, task).await.expect("lobby did not stop").unwrap();
        assert!(matches!(handle.snapshot().await, Err(LobbyError::Stopped)));
    }

    #[tokio::test]
    async fn test_bind_reports_address_in_use() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let result = Lobby::bind(addr, Box::new(MockSessionRelay::new())).await;

        assert!(matches!(result, Err(LobbyError::Bind { addr: a, .. }) if a == addr));
    }
}
