// ===============================
// src/naming.rs
// ===============================
//
// Path convention untuk semua channel:
//   \\.\pipe\fxcolt\<broker>\<login>\<tick|symbol|order|cmd>\<index>
//   \\.\mailslot\fxcolt\note
//
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering as AtomicOrdering};

use crate::consts::{
    APP_TAG, CMD_PIPE_NAME, MAILSLOT_PREFIX, NOTE_SLOT_NAME, ORDER_PIPE_NAME, PIPE_PREFIX,
    SYMBOL_PIPE_NAME, TICK_PIPE_NAME,
};
use crate::domain::{AccountInfo, AccountLogin};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Medium {
    Pipe,
    Mailslot,
}

impl Medium {
    pub fn prefix(self) -> &'static str {
        match self {
            Medium::Pipe => PIPE_PREFIX,
            Medium::Mailslot => MAILSLOT_PREFIX,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChannelKind {
    Tick,
    Symbol,
    Order,
    Command,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Tick,
        ChannelKind::Symbol,
        ChannelKind::Order,
        ChannelKind::Command,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ChannelKind::Tick => TICK_PIPE_NAME,
            ChannelKind::Symbol => SYMBOL_PIPE_NAME,
            ChannelKind::Order => ORDER_PIPE_NAME,
            ChannelKind::Command => CMD_PIPE_NAME,
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        ChannelKind::ALL.into_iter().find(|k| k.label() == label)
    }

    fn bit(self) -> u8 {
        match self {
            ChannelKind::Tick => 0x1,
            ChannelKind::Symbol => 0x2,
            ChannelKind::Order => 0x4,
            ChannelKind::Command => 0x8,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Small set of channel kinds.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct KindSet(u8);

impl KindSet {
    pub const EMPTY: KindSet = KindSet(0);
    pub const ALL: KindSet = KindSet(0xF);

    pub fn contains(self, kind: ChannelKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn with(self, kind: ChannelKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn without(self, kind: ChannelKind) -> Self {
        Self(self.0 & !kind.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = ChannelKind> {
        ChannelKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl fmt::Debug for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Atomic [`KindSet`], shared between the connector and the per-kind loops.
#[derive(Debug)]
pub struct AtomicKindSet(AtomicU8);

impl AtomicKindSet {
    pub fn new(initial: KindSet) -> Self {
        Self(AtomicU8::new(initial.0))
    }

    pub fn load(&self) -> KindSet {
        KindSet(self.0.load(AtomicOrdering::Acquire))
    }

    pub fn release(&self, kind: ChannelKind) {
        self.0.fetch_or(kind.bit(), AtomicOrdering::AcqRel);
    }

    /// Removes `kind`; returns true if it was present. Only one of several
    /// racing callers can win for the same kind.
    pub fn claim(&self, kind: ChannelKind) -> bool {
        let previous = self.0.fetch_and(!kind.bit(), AtomicOrdering::AcqRel);
        previous & kind.bit() != 0
    }
}

/// Every char that is not ASCII alphanumeric (nor one of `extra`) becomes `_`.
fn sanitize(raw: &str, extra: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || extra.contains(c) { c } else { '_' })
        .collect()
}

pub fn normalize_broker(raw: &str) -> String {
    sanitize(raw, "")
}

pub fn is_normalized_broker(broker: &str) -> bool {
    broker == normalize_broker(broker)
}

fn normalize_path(raw: &str) -> String {
    sanitize(raw, "\\/:.")
}

/// Non-empty run of ASCII digits.
pub fn is_integer(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Logins that survive a channel path or a note; a `-` would be sanitized away.
pub fn is_addressable_login(login: AccountLogin) -> bool {
    login >= 0
}

/// `\\.\{medium}\fxcolt[\broker\login\tag[\index]]`, sanitized.
pub fn build_path(
    medium: Medium,
    account: Option<&AccountInfo>,
    tag: Option<&str>,
    index: Option<u32>,
) -> String {
    let mut path = format!("\\\\.\\{}\\{}", medium.prefix(), APP_TAG);
    if let Some(account) = account {
        path.push_str(&format!("\\{}\\{}", account.broker(), account.login()));
    }
    if let Some(tag) = tag {
        path.push('\\');
        path.push_str(tag);
    }
    if let Some(index) = index {
        path.push_str(&format!("\\{index}"));
    }
    normalize_path(&path)
}

pub fn channel_path(account: &AccountInfo, kind: ChannelKind, index: u32) -> String {
    build_path(Medium::Pipe, Some(account), Some(kind.label()), Some(index))
}

pub fn note_mailbox_path() -> String {
    build_path(Medium::Mailslot, None, Some(NOTE_SLOT_NAME), None)
}

/// One discovered per-kind channel. Identity and ordering follow the path.
#[derive(Clone, Debug)]
pub struct ChannelInfo {
    pub account: AccountInfo,
    pub kind: ChannelKind,
    pub index: u32,
    pub path: String,
}

impl PartialEq for ChannelInfo {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ChannelInfo {}

impl PartialOrd for ChannelInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChannelInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

/// Recovers the channel tuple from an enumerated pipe path. Paths that do not
/// follow the convention yield `None`; the namespace holds unrelated pipes too.
pub fn parse_channel_path(path: &str) -> Option<ChannelInfo> {
    let tokens: Vec<&str> = path.split('\\').collect();
    let [empty0, empty1, dot, prefix, tag, broker, login, label, index] = tokens.as_slice() else {
        return None;
    };
    let well_formed = empty0.is_empty()
        && empty1.is_empty()
        && *dot == "."
        && *prefix == PIPE_PREFIX
        && *tag == APP_TAG
        && !broker.is_empty()
        && is_integer(login)
        && is_integer(index);
    if !well_formed {
        return None;
    }
    let kind = ChannelKind::from_label(label)?;
    let login: AccountLogin = login.parse().ok()?;
    let index: u32 = index.parse().ok()?;
    Some(ChannelInfo {
        account: AccountInfo::new(broker, login),
        kind,
        index,
        path: path.to_string(),
    })
}
