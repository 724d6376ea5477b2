// ===============================
// src/connection.rs
// ===============================
//
// Sisi backend. Satu Connection per akun, empat loop independen:
//   tick | symbol | order -> decode record -> sink
//   cmd                   -> tulis baris perintah -> baca balasan -> sink
// Mask "idle" di-claim sebelum open; bit "disconnected" baru dilepas setelah
// pipe terbuka dan loop-nya jalan, lalu dipasang lagi saat loop selesai.
//
use std::io;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use crate::command::RemoteCommand;
use crate::discovery::ChannelRegistry;
use crate::domain::{AccountKey, SymbolInfo, Tick};
use crate::ipc::{connect, Namespace, PipeStream};
use crate::metrics::{CHANNEL_OPENS, MSGS_RECV, MSGS_SENT};
use crate::naming::{AtomicKindSet, ChannelKind, KindSet};
use crate::order::Order;
use crate::shutdown::{Shutdown, TaskGroup};
use crate::wire::WireRecord;

/// Receiver of everything one adapter publishes.
pub trait TraderSink: Send + Sync {
    fn on_register_symbol(&self, symbol: &str);
    fn on_unregister_symbol(&self, symbol: &str);

    fn on_tick(&self, tick: &Tick);
    fn on_symbol(&self, info: &SymbolInfo);
    fn on_order(&self, order: &Order);
    fn on_cmd_result(&self, output: &str);
}

trait Deliver: WireRecord {
    fn deliver(&self, sink: &dyn TraderSink);
}

impl Deliver for Tick {
    fn deliver(&self, sink: &dyn TraderSink) {
        sink.on_tick(self);
    }
}

impl Deliver for SymbolInfo {
    fn deliver(&self, sink: &dyn TraderSink) {
        sink.on_symbol(self);
    }
}

impl Deliver for Order {
    fn deliver(&self, sink: &dyn TraderSink) {
        sink.on_order(self);
    }
}

pub struct Connection {
    key: AccountKey,
    sink: Weak<dyn TraderSink>,
    // kinds nobody is opening or running
    idle: AtomicKindSet,
    disconnected: AtomicKindSet,
    cmd_tx: mpsc::UnboundedSender<RemoteCommand>,
    // hanya satu loop cmd yang hidup; perintah menunggu di sini sampai channel terbuka
    cmd_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<RemoteCommand>>>,
}

impl Connection {
    pub fn new(key: AccountKey, sink: Weak<dyn TraderSink>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            key,
            sink,
            idle: AtomicKindSet::new(KindSet::ALL),
            disconnected: AtomicKindSet::new(KindSet::ALL),
            cmd_tx,
            cmd_rx: Arc::new(AsyncMutex::new(cmd_rx)),
        }
    }

    pub fn key(&self) -> AccountKey {
        self.key
    }

    /// All four kinds open.
    pub fn is_connected(&self) -> bool {
        self.disconnected.load().is_empty()
    }

    pub fn is_channel_connected(&self, kind: ChannelKind) -> bool {
        !self.disconnected.load().contains(kind)
    }

    /// Queued until the command channel is (re)opened.
    pub fn send_command(&self, cmd: RemoteCommand) {
        debug!(key = %self.key, %cmd, "command queued for adapter");
        if self.cmd_tx.send(cmd).is_err() {
            warn!(key = %self.key, "command queue closed, command dropped");
        }
    }

    /// Takes `kind` for opening; false if it is already connected or being opened.
    fn claim(&self, kind: ChannelKind) -> bool {
        self.idle.claim(kind)
    }

    /// Pipe is open and its loop owns it.
    fn mark_connected(&self, kind: ChannelKind) {
        self.disconnected.claim(kind);
    }

    fn release(&self, kind: ChannelKind) {
        self.disconnected.release(kind);
        self.idle.release(kind);
    }

    fn run_channel_loop(self: &Arc<Self>, kind: ChannelKind, stream: PipeStream, tasks: &TaskGroup) {
        // sebelum spawn: loop yang langsung selesai tetap meninggalkan bit terpasang
        self.mark_connected(kind);
        let conn = Arc::clone(self);
        match kind {
            ChannelKind::Tick => tasks.spawn(move |sd| record_loop::<Tick>(conn, kind, stream, sd)),
            ChannelKind::Symbol => tasks.spawn(move |sd| record_loop::<SymbolInfo>(conn, kind, stream, sd)),
            ChannelKind::Order => tasks.spawn(move |sd| record_loop::<Order>(conn, kind, stream, sd)),
            ChannelKind::Command => tasks.spawn(move |sd| cmd_loop(conn, stream, sd)),
        }
    }
}

async fn record_loop<T: Deliver>(
    conn: Arc<Connection>,
    kind: ChannelKind,
    mut stream: PipeStream,
    mut shutdown: Shutdown,
) {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = stream.read_message() => msg,
        };
        let bytes = match msg {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                debug!(?e, %kind, "read failed");
                break;
            }
        };
        MSGS_RECV.with_label_values(&[kind.label()]).inc();
        match T::decode(&bytes) {
            Ok(item) => {
                let Some(sink) = conn.sink.upgrade() else { break };
                item.deliver(sink.as_ref());
            }
            Err(e) => warn!(%e, %kind, "bad record skipped"),
        }
    }
    conn.release(kind);
    info!(key = %conn.key, %kind, "channel disconnected");
}

async fn cmd_loop(conn: Arc<Connection>, stream: PipeStream, mut shutdown: Shutdown) {
    let kind = ChannelKind::Command;
    let mut queue = Arc::clone(&conn.cmd_rx).lock_owned().await;
    let (mut reader, mut writer) = stream.split();
    loop {
        // saat idle reader tetap diawasi, supaya adapter yang hilang langsung terdeteksi
        let cmd = tokio::select! {
            _ = shutdown.cancelled() => break,
            cmd = queue.recv() => match cmd {
                Some(cmd) => cmd,
                None => break,
            },
            msg = reader.read_message() => match msg {
                Ok(Some(_)) => {
                    debug!("unsolicited reply ignored");
                    continue;
                }
                _ => break,
            },
        };

        let line = cmd.to_string();
        match writer.write_message(line.as_bytes()).await {
            Ok(()) => {}
            // tidak ada byte yang terkirim; channel tetap utuh
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                warn!(%e, op = %cmd.operation(), "command does not fit one message, dropped");
                continue;
            }
            Err(e) => {
                warn!(?e, %line, "command write failed, command lost");
                break;
            }
        }
        MSGS_SENT.with_label_values(&[kind.label()]).inc();

        let reply = tokio::select! {
            _ = shutdown.cancelled() => break,
            reply = reader.read_message() => reply,
        };
        match reply {
            Ok(Some(bytes)) => {
                MSGS_RECV.with_label_values(&[kind.label()]).inc();
                let Some(sink) = conn.sink.upgrade() else { break };
                sink.on_cmd_result(&String::from_utf8_lossy(&bytes));
            }
            _ => {
                warn!(%line, "command result lost");
                break;
            }
        }
    }
    drop(queue);
    conn.release(kind);
    info!(key = %conn.key, %kind, "channel disconnected");
}

/// One pass over the kinds of a connection that are not open yet.
pub struct Connector<'a> {
    ns: &'a Namespace,
    registry: &'a ChannelRegistry,
    connection: &'a Arc<Connection>,
    tasks: &'a TaskGroup,
}

impl<'a> Connector<'a> {
    pub fn new(
        ns: &'a Namespace,
        registry: &'a ChannelRegistry,
        connection: &'a Arc<Connection>,
        tasks: &'a TaskGroup,
    ) -> Self {
        Self { ns, registry, connection, tasks }
    }

    pub async fn run(&self) {
        for kind in ChannelKind::ALL {
            self.connect_channel(kind).await;
        }
    }

    async fn connect_channel(&self, kind: ChannelKind) {
        if !self.connection.claim(kind) {
            return;
        }
        match self.find_pipe(kind).await {
            Some(stream) => {
                CHANNEL_OPENS.with_label_values(&[kind.label()]).inc();
                self.connection.run_channel_loop(kind, stream, self.tasks);
            }
            None => self.connection.release(kind),
        }
    }

    // index tertinggi dulu: paling mungkin baru di-bind dan sedang menunggu
    async fn find_pipe(&self, kind: ChannelKind) -> Option<PipeStream> {
        let key = self.connection.key();
        for ci in self.registry.get(key, kind) {
            match connect(self.ns, &ci.path).await {
                Ok(stream) => {
                    info!(%key, path = %ci.path, "channel opened");
                    return Some(stream);
                }
                Err(e) => debug!(?e, path = %ci.path, "open failed"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl TraderSink for NullSink {
        fn on_register_symbol(&self, _: &str) {}
        fn on_unregister_symbol(&self, _: &str) {}
        fn on_tick(&self, _: &Tick) {}
        fn on_symbol(&self, _: &SymbolInfo) {}
        fn on_order(&self, _: &Order) {}
        fn on_cmd_result(&self, _: &str) {}
    }

    #[test]
    fn claim_marks_kind_taken_until_released() {
        let sink: Arc<dyn TraderSink> = Arc::new(NullSink);
        let conn = Connection::new(AccountKey::from_raw(1), Arc::downgrade(&sink));
        assert!(!conn.is_connected());

        // opening is not connected
        for kind in ChannelKind::ALL {
            assert!(conn.claim(kind));
            assert!(!conn.claim(kind));
            assert!(!conn.is_channel_connected(kind));
        }
        assert!(!conn.is_connected());

        // open failed: back to idle, still disconnected
        conn.release(ChannelKind::Symbol);
        assert!(conn.claim(ChannelKind::Symbol));

        for (n, kind) in ChannelKind::ALL.into_iter().enumerate() {
            conn.mark_connected(kind);
            assert_eq!(conn.is_connected(), n == ChannelKind::ALL.len() - 1);
        }

        conn.release(ChannelKind::Order);
        assert!(!conn.is_connected());
        assert!(!conn.is_channel_connected(ChannelKind::Order));
        assert!(conn.is_channel_connected(ChannelKind::Tick));
        // a running kind cannot be claimed again
        assert!(!conn.claim(ChannelKind::Tick));
        assert!(conn.claim(ChannelKind::Order));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn connected_only_once_every_pipe_is_open() {
        use crate::discovery::ChannelDiscovery;
        use crate::ipc::{PipeLister, PipeServer};
        use crate::naming::channel_path;
        use crate::accounts::AccountManager;
        use crate::domain::AccountInfo;

        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path());
        let account = AccountInfo::new("ib", 555);
        let accounts = Arc::new(AccountManager::new());
        let lister: Arc<dyn PipeLister> = Arc::new(ns.clone());
        let registry = ChannelRegistry::new(Arc::clone(&accounts), ChannelDiscovery::new(lister));
        let tasks = TaskGroup::new();

        // only three of four kinds are served
        let mut servers = Vec::new();
        for kind in [ChannelKind::Tick, ChannelKind::Symbol, ChannelKind::Order] {
            servers.push(PipeServer::bind(&ns, &channel_path(&account, kind, 0)).unwrap());
        }
        let keys = registry.detect();
        assert_eq!(keys.len(), 1);

        let sink: Arc<dyn TraderSink> = Arc::new(NullSink);
        let conn = Arc::new(Connection::new(keys[0], Arc::downgrade(&sink)));
        Connector::new(&ns, &registry, &conn, &tasks).run().await;
        assert!(conn.is_channel_connected(ChannelKind::Tick));
        assert!(!conn.is_channel_connected(ChannelKind::Command));
        assert!(!conn.is_connected());

        let _cmd = PipeServer::bind(&ns, &channel_path(&account, ChannelKind::Command, 0)).unwrap();
        registry.detect();
        Connector::new(&ns, &registry, &conn, &tasks).run().await;
        assert!(conn.is_connected());

        tasks.shutdown().await;
        assert!(!conn.is_connected());
        drop(servers);
    }

    #[derive(Default)]
    struct ResultSink(std::sync::Mutex<Vec<String>>);

    impl TraderSink for ResultSink {
        fn on_register_symbol(&self, _: &str) {}
        fn on_unregister_symbol(&self, _: &str) {}
        fn on_tick(&self, _: &Tick) {}
        fn on_symbol(&self, _: &SymbolInfo) {}
        fn on_order(&self, _: &Order) {}
        fn on_cmd_result(&self, output: &str) {
            self.0.lock().unwrap().push(output.to_string());
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn oversized_command_is_dropped_without_closing_the_channel() {
        use crate::consts::{MAX_CMD_TICKET_COUNT, NAMED_PIPE_BUFFER_SIZE};
        use crate::ipc::PipeServer;

        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path());
        let path = r"\\.\pipe\fxcolt\ib\555\cmd\0";
        let mut adapter_side = PipeServer::bind(&ns, path).unwrap();
        let tasks = TaskGroup::new();

        let sink = Arc::new(ResultSink::default());
        let weak: Weak<dyn TraderSink> = Arc::downgrade(&(Arc::clone(&sink) as Arc<dyn TraderSink>));
        let conn = Arc::new(Connection::new(AccountKey::from_raw(0), weak));
        let (stream, accepted) = tokio::join!(connect(&ns, path), adapter_side.accept());
        let mut adapter = accepted.unwrap();
        conn.run_channel_loop(ChannelKind::Command, stream.unwrap(), &tasks);

        let huge = RemoteCommand::Close(vec![i32::MAX; MAX_CMD_TICKET_COUNT]);
        assert!(huge.to_string().len() > NAMED_PIPE_BUFFER_SIZE);
        conn.send_command(huge);
        conn.send_command(RemoteCommand::Close(vec![100]));

        let line = adapter.read_message().await.unwrap().unwrap();
        assert_eq!(line, b"close 100");
        adapter.write_message(b"ok").await.unwrap();
        for _ in 0..100 {
            if !sink.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(*sink.0.lock().unwrap(), vec!["ok".to_string()]);
        assert!(conn.is_channel_connected(ChannelKind::Command));

        tasks.shutdown().await;
    }
}
