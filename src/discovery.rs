// ===============================
// src/discovery.rs
// ===============================
//
// Scan namespace -> parse path -> kelompokkan per akun & kind.
// Index dibangun ulang penuh setiap detect() (tidak incremental).
//
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::accounts::AccountManager;
use crate::consts::APP_TAG;
use crate::domain::AccountKey;
use crate::ipc::PipeLister;
use crate::naming::{parse_channel_path, ChannelInfo, ChannelKind};

pub struct ChannelDiscovery {
    lister: Arc<dyn PipeLister>,
}

impl ChannelDiscovery {
    pub fn new(lister: Arc<dyn PipeLister>) -> Self {
        Self { lister }
    }

    /// Channels currently visible. Unrelated pipes are skipped; an
    /// enumeration failure counts as "nothing found".
    pub fn scan(&self) -> Vec<ChannelInfo> {
        let pipes = match self.lister.list_pipes(APP_TAG) {
            Ok(pipes) => pipes,
            Err(e) => {
                warn!(?e, "pipe enumeration failed");
                return Vec::new();
            }
        };
        pipes
            .iter()
            .filter_map(|p| {
                let parsed = parse_channel_path(p);
                if parsed.is_none() {
                    debug!(path = %p, "ignoring foreign pipe");
                }
                parsed
            })
            .collect()
    }
}

pub struct ChannelRegistry {
    accounts: Arc<AccountManager>,
    discovery: ChannelDiscovery,
    index: RwLock<BTreeMap<AccountKey, BTreeSet<ChannelInfo>>>,
}

impl ChannelRegistry {
    pub fn new(accounts: Arc<AccountManager>, discovery: ChannelDiscovery) -> Self {
        Self { accounts, discovery, index: RwLock::new(BTreeMap::new()) }
    }

    /// Rebuilds the index from a fresh scan; returns keys seen for the first time.
    pub fn detect(&self) -> Vec<AccountKey> {
        let mut rebuilt: BTreeMap<AccountKey, BTreeSet<ChannelInfo>> = BTreeMap::new();
        let mut newly_found = Vec::new();
        for ci in self.discovery.scan() {
            let (key, is_new) = self.accounts.get_or_add(&ci.account);
            if is_new {
                newly_found.push(key);
            }
            rebuilt.entry(key).or_default().insert(ci);
        }
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = rebuilt;
        newly_found
    }

    /// Channels of one (account, kind), highest instance index first.
    pub fn get(&self, key: AccountKey, kind: ChannelKind) -> Vec<ChannelInfo> {
        let index = self.index.read().unwrap_or_else(PoisonError::into_inner);
        let mut channels: Vec<ChannelInfo> = index
            .get(&key)
            .map(|set| set.iter().filter(|ci| ci.kind == kind).cloned().collect())
            .unwrap_or_default();
        channels.sort_by(|a, b| b.index.cmp(&a.index));
        channels
    }

    pub fn accounts(&self) -> &Arc<AccountManager> {
        &self.accounts
    }
}
