// ===============================
// src/accounts.rs
// ===============================
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::{AccountInfo, AccountKey};
use crate::naming::{is_addressable_login, is_normalized_broker};

#[derive(Default)]
struct Registry {
    next: i32,
    by_key: BTreeMap<AccountKey, AccountInfo>,
    by_info: BTreeMap<AccountInfo, AccountKey>,
}

/// Two-way map between accounts and their in-process keys.
/// Keys are handed out monotonically from 0 and never reused.
#[derive(Default)]
pub struct AccountManager {
    inner: RwLock<Registry>,
}

impl AccountManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for `info`, creating it if needed; the flag tells whether it is new.
    pub fn get_or_add(&self, info: &AccountInfo) -> (AccountKey, bool) {
        debug_assert!(is_normalized_broker(info.broker()));
        debug_assert!(is_addressable_login(info.login()));
        let mut reg = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = reg.by_info.get(info) {
            return (*key, false);
        }
        let key = AccountKey::from_raw(reg.next);
        reg.next += 1;
        reg.by_key.insert(key, info.clone());
        reg.by_info.insert(info.clone(), key);
        (key, true)
    }

    /// Idempotent: an already known account keeps its key.
    pub fn add(&self, info: &AccountInfo) -> AccountKey {
        self.get_or_add(info).0
    }

    pub fn get_key(&self, info: &AccountInfo) -> Option<AccountKey> {
        debug_assert!(is_normalized_broker(info.broker()));
        let reg = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        reg.by_info.get(info).copied()
    }

    pub fn get(&self, key: AccountKey) -> Option<AccountInfo> {
        let reg = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        reg.by_key.get(&key).cloned()
    }

    pub fn exists(&self, key: AccountKey) -> bool {
        let reg = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        reg.by_key.contains_key(&key)
    }

    /// All keys, ascending.
    pub fn keys(&self) -> Vec<AccountKey> {
        let reg = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        reg.by_key.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_stable_and_monotonic() {
        let am = AccountManager::new();
        let a = AccountInfo::new("ib", 555);
        let b = AccountInfo::new("xtb", 1);

        assert_eq!(am.get_key(&a), None);
        let (ka, new_a) = am.get_or_add(&a);
        assert!(new_a);
        assert_eq!(ka, AccountKey::from_raw(0));
        let kb = am.add(&b);
        assert_eq!(kb, AccountKey::from_raw(1));

        for _ in 0..3 {
            assert_eq!(am.get_key(&a), Some(ka));
            assert_eq!(am.add(&a), ka);
        }
        assert_eq!(am.get_or_add(&a), (ka, false));
        assert_eq!(am.keys(), vec![ka, kb]);
        assert_eq!(am.get(kb), Some(b));
        assert!(am.exists(ka));
        assert!(!am.exists(AccountKey::NULL));
        assert_eq!(am.get(AccountKey::from_raw(7)), None);
    }

    #[test]
    fn same_broker_spelled_differently_is_one_account() {
        let am = AccountManager::new();
        let k1 = am.add(&AccountInfo::new("Fake Broker", 9));
        let k2 = am.add(&AccountInfo::new("Fake_Broker", 9));
        assert_eq!(k1, k2);
        assert_eq!(am.keys().len(), 1);
    }
}
