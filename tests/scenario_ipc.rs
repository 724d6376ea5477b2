// ===============================
// tests/scenario_ipc.rs
// ===============================
//
// Adapter-side loops against raw sockets playing the backend.
//
#![cfg(unix)]

use std::time::Duration;
use tokio::sync::mpsc;

use fxcolt::command::RemoteCommand;
use fxcolt::consts::{APP_TAG, CMD_SEND_SUCCESS};
use fxcolt::domain::{AccountInfo, Tick};
use fxcolt::ipc::{connect, MailboxReceiver, Namespace, PipeLister};
use fxcolt::naming::{channel_path, note_mailbox_path, ChannelKind};
use fxcolt::note::{NoteKind, SymbolNote};
use fxcolt::shutdown::TaskGroup;
use fxcolt::transmitter::{CommandReceiver, NoteTransmitter, Transmitter};
use fxcolt::wire::WireRecord;

const BACKOFF: Duration = Duration::from_millis(20);

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..250 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

fn listed(ns: &Namespace, path: &str) -> bool {
    ns.list_pipes(APP_TAG).map(|p| p.iter().any(|x| x == path)).unwrap_or(false)
}

#[tokio::test]
async fn transmitter_rebinds_next_index_after_backend_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let ns = Namespace::new(dir.path());
    let account = AccountInfo::new("Fake Broker", 42);
    let tasks = TaskGroup::new();
    let ticks: Transmitter<Tick> =
        Transmitter::start(ns.clone(), account.clone(), ChannelKind::Tick, BACKOFF, &tasks);

    // queued before anyone listens, delivered to the first backend
    ticks.write(Tick::new("EURUSD", 1, 1.0, 1.1, 1.05));

    let first = channel_path(&account, ChannelKind::Tick, 0);
    assert!(eventually(|| listed(&ns, &first)).await);
    let mut backend = connect(&ns, &first).await.unwrap();
    let got = Tick::decode(&backend.read_message().await.unwrap().unwrap()).unwrap();
    assert_eq!(got, Tick::new("EURUSD", 1, 1.0, 1.1, 1.05));
    drop(backend);

    let second = channel_path(&account, ChannelKind::Tick, 1);
    assert!(eventually(|| listed(&ns, &second)).await);
    assert!(!listed(&ns, &first));

    let mut backend = connect(&ns, &second).await.unwrap();
    ticks.write(Tick::new("EURUSD", 2, 1.2, 1.3, 1.25));
    let got = Tick::decode(&backend.read_message().await.unwrap().unwrap()).unwrap();
    assert_eq!(got.time, 2);

    tasks.shutdown().await;
    assert_eq!(backend.read_message().await.unwrap(), None);
}

#[tokio::test]
async fn command_channel_acknowledges_and_queues() {
    let dir = tempfile::tempdir().unwrap();
    let ns = Namespace::new(dir.path());
    let account = AccountInfo::new("ib", 555);
    let tasks = TaskGroup::new();
    let (queue_tx, mut queue_rx) = mpsc::unbounded_channel();
    CommandReceiver::start(ns.clone(), account.clone(), BACKOFF, queue_tx, &tasks);

    let path = channel_path(&account, ChannelKind::Command, 0);
    assert!(eventually(|| listed(&ns, &path)).await);
    let mut backend = connect(&ns, &path).await.unwrap();

    backend.write_message(b"close 100 101").await.unwrap();
    assert_eq!(backend.read_message().await.unwrap().as_deref(), Some(CMD_SEND_SUCCESS.as_bytes()));
    let cmd = queue_rx.recv().await.unwrap();
    assert_eq!(cmd, RemoteCommand::Close(vec![100, 101]));
    assert_eq!(cmd.to_string(), "close 100 101");

    // rejected lines are answered but never queued
    backend.write_message(b"gs").await.unwrap();
    assert_eq!(
        backend.read_message().await.unwrap().as_deref(),
        Some(&b"get_symbols is not a remote command"[..])
    );
    backend.write_message(b"c 1 12x").await.unwrap();
    let reply = String::from_utf8(backend.read_message().await.unwrap().unwrap()).unwrap();
    assert!(reply.starts_with("incorrect ticket: '12x'"), "{reply}");
    assert!(queue_rx.try_recv().is_err());

    tasks.shutdown().await;
}

#[tokio::test]
async fn notes_reach_the_mailbox_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let ns = Namespace::new(dir.path());
    let account = AccountInfo::new("Fake Broker", 7);
    let tasks = TaskGroup::new();

    let mut mailbox = MailboxReceiver::bind(&ns, &note_mailbox_path()).unwrap();
    let notes = NoteTransmitter::start(ns.clone(), &tasks);
    notes.write(SymbolNote::new(NoteKind::RegisterSymbol, account.clone(), "EURPLN").pack());
    notes.write(SymbolNote::new(NoteKind::UnregisterSymbol, account.clone(), "EURPLN").pack());

    let first = String::from_utf8(mailbox.recv().await.unwrap()).unwrap();
    let second = String::from_utf8(mailbox.recv().await.unwrap()).unwrap();
    assert_eq!(
        SymbolNote::unpack(&first),
        Some(SymbolNote::new(NoteKind::RegisterSymbol, account.clone(), "EURPLN"))
    );
    let second = SymbolNote::unpack(&second).unwrap();
    assert_eq!(second.kind, NoteKind::UnregisterSymbol);
    assert_eq!(second.account.broker(), "Fake_Broker");

    tasks.shutdown().await;
}
