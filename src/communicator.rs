// ===============================
// src/communicator.rs
// ===============================
//
// Backend: discovery + koneksi per akun + pemroses note dari mailbox.
// Sweep periodik menjalankan ulang detect & connector untuk akun yang
// belum tersambung penuh (adapter restart -> channel index baru).
//
use ahash::AHashMap as HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::discovery::ChannelRegistry;
use crate::domain::AccountKey;
use crate::connection::{Connection, Connector, TraderSink};
use crate::ipc::{MailboxReceiver, Namespace};
use crate::metrics::{ACCOUNTS, NOTES_RECV};
use crate::naming::note_mailbox_path;
use crate::note::{NoteKind, SymbolNote};
use crate::shutdown::{Shutdown, TaskGroup};

pub trait CommunicatorObserver: Send + Sync {
    fn on_new_account_detected(&self, key: AccountKey);
    fn on_symbol_note(&self, key: AccountKey, kind: NoteKind, symbol: &str);
}

pub struct Communicator {
    ns: Namespace,
    registry: ChannelRegistry,
    connections: RwLock<HashMap<AccountKey, Arc<Connection>>>,
    tasks: Arc<TaskGroup>,
    scan_interval: Duration,
}

impl Communicator {
    pub fn new(ns: Namespace, registry: ChannelRegistry, tasks: Arc<TaskGroup>, scan_interval: Duration) -> Self {
        Self { ns, registry, connections: RwLock::new(HashMap::new()), tasks, scan_interval }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Creates the connection of `key` and starts opening its channels.
    pub fn connect(self: &Arc<Self>, key: AccountKey, sink: Weak<dyn TraderSink>) -> Arc<Connection> {
        let connection = Arc::new(Connection::new(key, sink));
        let previous = self
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&connection));
        if previous.is_some() {
            warn!(%key, "connection replaced");
        }

        let this = Arc::clone(self);
        let conn = Arc::clone(&connection);
        self.tasks.spawn(move |_| async move {
            Connector::new(&this.ns, &this.registry, &conn, &this.tasks).run().await;
        });
        connection
    }

    pub fn connection(&self, key: AccountKey) -> Option<Arc<Connection>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner).get(&key).cloned()
    }

    fn is_connected(&self, key: AccountKey) -> bool {
        self.connection(key).is_some_and(|c| c.is_connected())
    }

    /// Fresh scan; the observer hears about every account seen for the first time.
    pub fn detect_channels(&self, observer: &dyn CommunicatorObserver) -> bool {
        let newly_found = self.registry.detect();
        ACCOUNTS.set(self.registry.accounts().keys().len() as i64);
        for key in &newly_found {
            info!(%key, "new account detected");
            observer.on_new_account_detected(*key);
        }
        !newly_found.is_empty()
    }

    /// Initial detect, then the note processor and the reconnect sweep.
    pub fn run(self: &Arc<Self>, observer: Arc<dyn CommunicatorObserver>) {
        self.detect_channels(observer.as_ref());

        let this = Arc::clone(self);
        let obs = Arc::clone(&observer);
        self.tasks.spawn(move |sd| this.note_loop(obs, sd));

        let this = Arc::clone(self);
        self.tasks.spawn(move |sd| this.sweep_loop(observer, sd));
    }

    async fn note_loop(self: Arc<Self>, observer: Arc<dyn CommunicatorObserver>, mut shutdown: Shutdown) {
        let path = note_mailbox_path();
        let mut mailbox = loop {
            match MailboxReceiver::bind(&self.ns, &path) {
                Ok(mailbox) => break mailbox,
                Err(e) => {
                    warn!(?e, %path, "note mailbox bind failed, retrying");
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = sleep(self.scan_interval) => {}
                    }
                }
            }
        };
        info!(%path, "listening for notes");

        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = mailbox.recv() => msg,
            };
            match msg {
                Ok(bytes) => self.process_note(&String::from_utf8_lossy(&bytes), observer.as_ref()),
                Err(e) => {
                    warn!(?e, "note mailbox read failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(self.scan_interval) => {}
                    }
                }
            }
        }
        debug!("note loop stopped");
    }

    /// Unknown or not fully connected account: one extra detect before giving up.
    pub fn process_note(&self, packed: &str, observer: &dyn CommunicatorObserver) {
        debug!(%packed, "note received");
        let Some(note) = SymbolNote::unpack(packed) else {
            debug!(%packed, "malformed note dropped");
            return;
        };
        NOTES_RECV.with_label_values(&[note.kind.label()]).inc();

        let accounts = self.registry.accounts();
        let mut key = accounts.get_key(&note.account);
        if !key.is_some_and(|k| self.is_connected(k)) && self.detect_channels(observer) {
            key = accounts.get_key(&note.account);
        }
        match key {
            Some(key) => observer.on_symbol_note(key, note.kind, &note.symbol),
            None => debug!(account = %note.account, "note for unknown account dropped"),
        }
    }

    async fn sweep_loop(self: Arc<Self>, observer: Arc<dyn CommunicatorObserver>, mut shutdown: Shutdown) {
        let mut tick = interval(self.scan_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // tick pertama langsung; detect awal sudah jalan di run()
        tick.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {}
            }
            self.detect_channels(observer.as_ref());
            self.reconnect().await;
        }
        debug!("sweep loop stopped");
    }

    async fn reconnect(&self) {
        let pending: Vec<Arc<Connection>> = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|c| !c.is_connected())
            .cloned()
            .collect();
        for conn in pending {
            Connector::new(&self.ns, &self.registry, &conn, &self.tasks).run().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountManager;
    use crate::discovery::ChannelDiscovery;
    use crate::domain::AccountInfo;
    use crate::ipc::PipeLister;
    use crate::naming::{channel_path, ChannelKind};
    use std::io;
    use std::sync::Mutex;

    struct FixedLister(Vec<String>);

    impl PipeLister for FixedLister {
        fn list_pipes(&self, _tag: &str) -> io::Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Seen {
        accounts: Mutex<Vec<AccountKey>>,
        notes: Mutex<Vec<(AccountKey, NoteKind, String)>>,
    }

    impl CommunicatorObserver for Seen {
        fn on_new_account_detected(&self, key: AccountKey) {
            self.accounts.lock().unwrap().push(key);
        }

        fn on_symbol_note(&self, key: AccountKey, kind: NoteKind, symbol: &str) {
            self.notes.lock().unwrap().push((key, kind, symbol.to_string()));
        }
    }

    fn communicator(paths: Vec<String>) -> Communicator {
        let accounts = Arc::new(AccountManager::new());
        let registry = ChannelRegistry::new(accounts, ChannelDiscovery::new(Arc::new(FixedLister(paths))));
        Communicator::new(Namespace::new("/nonexistent"), registry, Arc::new(TaskGroup::new()), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn note_for_fresh_account_triggers_detect() {
        let ib = AccountInfo::new("ib", 555);
        let comm = communicator(vec![channel_path(&ib, ChannelKind::Tick, 0)]);
        let seen = Seen::default();

        let note = SymbolNote::new(NoteKind::RegisterSymbol, ib.clone(), "EURUSD").pack();
        comm.process_note(&note, &seen);

        let accounts = seen.accounts.lock().unwrap().clone();
        assert_eq!(accounts.len(), 1);
        assert_eq!(
            *seen.notes.lock().unwrap(),
            vec![(accounts[0], NoteKind::RegisterSymbol, "EURUSD".to_string())]
        );

        // already known, no second "new account"
        comm.process_note(&SymbolNote::new(NoteKind::UnregisterSymbol, ib, "EURUSD").pack(), &seen);
        assert_eq!(seen.accounts.lock().unwrap().len(), 1);
        assert_eq!(seen.notes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_and_unknown_notes_are_dropped() {
        let comm = communicator(Vec::new());
        let seen = Seen::default();

        comm.process_note("garbage", &seen);
        let stranger = SymbolNote::new(NoteKind::RegisterSymbol, AccountInfo::new("x", 1), "S").pack();
        comm.process_note(&stranger, &seen);

        assert!(seen.accounts.lock().unwrap().is_empty());
        assert!(seen.notes.lock().unwrap().is_empty());
    }
}
