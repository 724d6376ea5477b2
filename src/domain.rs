// ===============================
// src/domain.rs
// ===============================
use serde::{Serialize, Serializer};
use std::fmt;
use tracing::warn;

use crate::consts::MAX_SYMBOL_NAME_LEN;
use crate::naming::normalize_broker;

pub type AccountLogin = i64;
pub type Ticket = i32;
pub type DateTime = i64;

/// Fixed-width, NUL-padded symbol name as it travels inside binary records.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SymbolName([u8; MAX_SYMBOL_NAME_LEN]);

impl SymbolName {
    /// Nama yang terlalu panjang dipotong di batas karakter UTF-8.
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(MAX_SYMBOL_NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        if end < name.len() {
            warn!(%name, max = MAX_SYMBOL_NAME_LEN, "symbol name truncated");
        }
        let mut raw = [0u8; MAX_SYMBOL_NAME_LEN];
        raw[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self(raw)
    }

    /// Rebuilds a name received off the wire; `None` if the bytes are not UTF-8.
    pub fn from_raw(raw: [u8; MAX_SYMBOL_NAME_LEN]) -> Option<Self> {
        let len = raw.iter().position(|b| *b == 0).unwrap_or(MAX_SYMBOL_NAME_LEN);
        std::str::from_utf8(&raw[..len]).ok()?;
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; MAX_SYMBOL_NAME_LEN] {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(MAX_SYMBOL_NAME_LEN);
        // konstruktor sudah menjamin UTF-8 valid
        std::str::from_utf8(&self.0[..len]).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Display for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl Serialize for SymbolName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Account identity as reported by the host. The broker is always stored
/// normalized, so two spellings of the same broker map to one registry entry.
///
/// Ordering is by login first, then broker.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountInfo {
    login: AccountLogin,
    broker: String,
}

impl AccountInfo {
    pub fn new(raw_broker: &str, login: AccountLogin) -> Self {
        Self { login, broker: normalize_broker(raw_broker) }
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn login(&self) -> AccountLogin {
        self.login
    }
}

impl fmt::Display for AccountInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.broker, self.login)
    }
}

/// Opaque in-process handle of a discovered account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AccountKey(i32);

impl AccountKey {
    pub const NULL: AccountKey = AccountKey(i32::MIN);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Tick {
    pub symbol: SymbolName,
    pub time: DateTime,
    pub ask: f64,
    pub bid: f64,
    pub last: f64,
}

impl Tick {
    pub fn new(symbol: &str, time: DateTime, bid: f64, ask: f64, last: f64) -> Self {
        Self { symbol: SymbolName::new(symbol), time, ask, bid, last }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SymbolInfo {
    pub name: SymbolName,
}

impl SymbolInfo {
    pub fn new(name: &str) -> Self {
        Self { name: SymbolName::new(name) }
    }
}
