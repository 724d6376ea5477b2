// ===============================
// src/note.rs
// ===============================
//
// Note = notifikasi kecil lewat mailbox: "<kind>@#%&@<broker>@#%&@<login>@#%&@<symbol>@#%&@"
// Paket yang rusak dibuang diam-diam.
//
use crate::domain::{AccountInfo, AccountLogin};
use crate::naming::is_integer;

pub const NOTE_SEPARATOR: &str = "@#%&@";
pub const NOTE_TOKEN_COUNT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteKind {
    RegisterSymbol,
    UnregisterSymbol,
}

impl NoteKind {
    pub fn label(self) -> &'static str {
        match self {
            NoteKind::RegisterSymbol => "reg_symbol",
            NoteKind::UnregisterSymbol => "unreg_symbol",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "reg_symbol" => Some(NoteKind::RegisterSymbol),
            "unreg_symbol" => Some(NoteKind::UnregisterSymbol),
            _ => None,
        }
    }
}

/// Every token is followed by the separator, the last one included.
pub fn pack(tokens: &[&str]) -> String {
    let mut packed = String::new();
    for token in tokens {
        packed.push_str(token);
        packed.push_str(NOTE_SEPARATOR);
    }
    packed
}

/// Splits a packed note; an unterminated tail is not a token. `None` on arity mismatch.
pub fn unpack(packed: &str, expected: usize) -> Option<Vec<String>> {
    let mut tokens: Vec<String> = packed.split(NOTE_SEPARATOR).map(str::to_string).collect();
    // split selalu menyisakan satu elemen setelah separator terakhir
    tokens.pop();
    (tokens.len() == expected).then_some(tokens)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolNote {
    pub kind: NoteKind,
    pub account: AccountInfo,
    pub symbol: String,
}

impl SymbolNote {
    pub fn new(kind: NoteKind, account: AccountInfo, symbol: impl Into<String>) -> Self {
        Self { kind, account, symbol: symbol.into() }
    }

    pub fn pack(&self) -> String {
        let login = self.account.login().to_string();
        pack(&[self.kind.label(), self.account.broker(), &login, &self.symbol])
    }

    pub fn unpack(packed: &str) -> Option<SymbolNote> {
        let tokens = unpack(packed, NOTE_TOKEN_COUNT)?;
        let [kind, broker, login, symbol] = tokens.as_slice() else {
            return None;
        };
        let kind = NoteKind::from_label(kind)?;
        if !is_integer(login) {
            return None;
        }
        let login: AccountLogin = login.parse().ok()?;
        Some(SymbolNote::new(kind, AccountInfo::new(broker, login), symbol.clone()))
    }
}
