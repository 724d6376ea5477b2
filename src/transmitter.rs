// ===============================
// src/transmitter.rs
// ===============================
//
// Sisi adapter. Tiap kind punya loop sendiri:
//   bind index N -> tunggu backend -> layani sampai putus -> index N+1
// Bind gagal: tidur backoff lalu coba index yang sama.
// write() tidak pernah menunggu backend.
//
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::command::{Command, RemoteCommand};
use crate::consts::{CMD_SEND_SUCCESS, MAX_CMD_ARG_LEN};
use crate::domain::AccountInfo;
use crate::ipc::{send_datagram, Namespace, PipeServer, PipeStream};
use crate::metrics::{CHANNEL_BINDS, CMDS_QUEUED, CMDS_REJECTED, MSGS_RECV, MSGS_SENT};
use crate::naming::{channel_path, note_mailbox_path, ChannelKind};
use crate::parser::{parse_trader_command, ParseError};
use crate::shutdown::{Shutdown, TaskGroup};
use crate::wire::WireRecord;

enum Served {
    PeerGone,
    Stopped,
}

/// Successive server instances of one (account, kind).
struct Rotation {
    ns: Namespace,
    account: AccountInfo,
    kind: ChannelKind,
    index: u32,
    backoff: Duration,
}

impl Rotation {
    fn new(ns: Namespace, account: AccountInfo, kind: ChannelKind, backoff: Duration) -> Self {
        Self { ns, account, kind, index: 0, backoff }
    }

    /// Waits for the next backend peer; `None` once shutdown was requested.
    async fn next_peer(&mut self, shutdown: &mut Shutdown) -> Option<PipeStream> {
        loop {
            let path = channel_path(&self.account, self.kind, self.index);
            let mut server = match PipeServer::bind(&self.ns, &path) {
                Ok(server) => server,
                Err(e) => {
                    warn!(?e, %path, "bind failed, retrying same index");
                    tokio::select! {
                        _ = shutdown.cancelled() => return None,
                        _ = sleep(self.backoff) => continue,
                    }
                }
            };
            CHANNEL_BINDS.with_label_values(&[self.kind.label()]).inc();
            debug!(%path, "waiting for backend");

            let accepted = tokio::select! {
                _ = shutdown.cancelled() => return None,
                res = server.accept() => res,
            };
            // instance ini sudah terpakai (atau rusak): berikutnya index+1
            self.index += 1;
            match accepted {
                Ok(stream) => {
                    info!(%path, "backend connected");
                    return Some(stream);
                }
                Err(e) => warn!(?e, %path, "accept failed"),
            }
        }
    }
}

/// Outgoing queue of one data kind (tick, symbol or order).
pub struct Transmitter<T: WireRecord> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: WireRecord> Transmitter<T> {
    pub fn start(
        ns: Namespace,
        account: AccountInfo,
        kind: ChannelKind,
        backoff: Duration,
        tasks: &TaskGroup,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rotation = Rotation::new(ns, account, kind, backoff);
        tasks.spawn(move |shutdown| transmission_loop(rotation, rx, shutdown));
        Self { tx }
    }

    /// Never blocks on the channel; items queue up until a backend shows up.
    pub fn write(&self, item: T) {
        if self.tx.send(item).is_err() {
            debug!("transmitter stopped, item dropped");
        }
    }
}

async fn transmission_loop<T: WireRecord>(
    mut rotation: Rotation,
    mut rx: mpsc::UnboundedReceiver<T>,
    mut shutdown: Shutdown,
) {
    let kind = rotation.kind;
    while let Some(stream) = rotation.next_peer(&mut shutdown).await {
        match serve_records(stream, kind, &mut rx, &mut shutdown).await {
            Served::PeerGone => info!(%kind, "backend disconnected"),
            Served::Stopped => break,
        }
    }
    debug!(%kind, "transmission loop stopped");
}

async fn serve_records<T: WireRecord>(
    stream: PipeStream,
    kind: ChannelKind,
    rx: &mut mpsc::UnboundedReceiver<T>,
    shutdown: &mut Shutdown,
) -> Served {
    let (mut reader, mut writer) = stream.split();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Served::Stopped,
            item = rx.recv() => {
                let Some(item) = item else { return Served::Stopped };
                // item yang gagal ditulis hilang bersama channel-nya
                if let Err(e) = writer.write_message(&item.encode()).await {
                    debug!(?e, %kind, "write failed");
                    return Served::PeerGone;
                }
                MSGS_SENT.with_label_values(&[kind.label()]).inc();
            }
            // backend tidak pernah menulis di channel data; ini hanya deteksi putus
            msg = reader.read_message() => match msg {
                Ok(Some(_)) => debug!(%kind, "unexpected inbound frame ignored"),
                Ok(None) => return Served::PeerGone,
                Err(e) => {
                    debug!(?e, %kind, "read failed");
                    return Served::PeerGone;
                }
            }
        }
    }
}

/// Server loop of the command channel: one text line in, one reply out.
pub struct CommandReceiver;

impl CommandReceiver {
    pub fn start(
        ns: Namespace,
        account: AccountInfo,
        backoff: Duration,
        queue: mpsc::UnboundedSender<RemoteCommand>,
        tasks: &TaskGroup,
    ) {
        let rotation = Rotation::new(ns, account, ChannelKind::Command, backoff);
        tasks.spawn(move |shutdown| command_loop(rotation, queue, shutdown));
    }
}

async fn command_loop(
    mut rotation: Rotation,
    queue: mpsc::UnboundedSender<RemoteCommand>,
    mut shutdown: Shutdown,
) {
    while let Some(stream) = rotation.next_peer(&mut shutdown).await {
        match serve_commands(stream, &queue, &mut shutdown).await {
            Served::PeerGone => info!("command channel disconnected"),
            Served::Stopped => break,
        }
    }
    debug!("command loop stopped");
}

async fn serve_commands(
    mut stream: PipeStream,
    queue: &mpsc::UnboundedSender<RemoteCommand>,
    shutdown: &mut Shutdown,
) -> Served {
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => return Served::Stopped,
            msg = stream.read_message() => msg,
        };
        let bytes = match msg {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Served::PeerGone,
            Err(e) => {
                debug!(?e, "command read failed");
                return Served::PeerGone;
            }
        };
        MSGS_RECV.with_label_values(&[ChannelKind::Command.label()]).inc();
        let reply = accept_command_line(&String::from_utf8_lossy(&bytes), queue);
        if let Err(e) = stream.write_message(reply.as_bytes()).await {
            debug!(?e, "command reply failed");
            return Served::PeerGone;
        }
    }
}

/// Parses and queues one line. The reply only acknowledges the enqueue.
pub fn accept_command_line(line: &str, queue: &mpsc::UnboundedSender<RemoteCommand>) -> String {
    match parse_trader_command(line) {
        Ok(Command::Remote(cmd)) => {
            // argumen yang dirender (mis. harga 1e300) harus muat di slot host
            if let Some(arg) = cmd.args().into_iter().find(|a| a.len() > MAX_CMD_ARG_LEN) {
                CMDS_REJECTED.inc();
                return ParseError::ArgumentTooLong { token: arg, max: MAX_CMD_ARG_LEN }.to_string();
            }
            info!(%cmd, "command queued");
            if queue.send(cmd).is_err() {
                CMDS_REJECTED.inc();
                return "command queue closed".to_string();
            }
            CMDS_QUEUED.inc();
            CMD_SEND_SUCCESS.to_string()
        }
        Ok(Command::Local(cmd)) => {
            CMDS_REJECTED.inc();
            format!("{} is not a remote command", cmd.name())
        }
        Err(e) => {
            CMDS_REJECTED.inc();
            debug!(%line, error = %e, "command rejected");
            e.to_string()
        }
    }
}

/// Fire-and-forget sender of packed notes to the backend mailbox.
pub struct NoteTransmitter {
    tx: mpsc::UnboundedSender<String>,
}

impl NoteTransmitter {
    pub fn start(ns: Namespace, tasks: &TaskGroup) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tasks.spawn(move |shutdown| note_loop(ns, rx, shutdown));
        Self { tx }
    }

    pub fn write(&self, packed: String) {
        if self.tx.send(packed).is_err() {
            debug!("note transmitter stopped, note dropped");
        }
    }
}

async fn note_loop(ns: Namespace, mut rx: mpsc::UnboundedReceiver<String>, mut shutdown: Shutdown) {
    let path = note_mailbox_path();
    loop {
        // note yang sudah antri tetap dikirim sebelum berhenti
        let note = tokio::select! {
            biased;
            note = rx.recv() => note,
            _ = shutdown.cancelled() => None,
        };
        let Some(note) = note else { break };
        match send_datagram(&ns, &path, note.as_bytes()).await {
            Ok(()) => debug!(%note, "note sent"),
            Err(e) => debug!(?e, %note, "note dropped, no backend listening"),
        }
    }
}
