// ===============================
// src/consts.rs
// ===============================

/// Tag embedded in every pipe/mailslot path owned by this bridge.
pub const APP_TAG: &str = "fxcolt";
pub const NOTE_SLOT_NAME: &str = "note";

pub const PIPE_PREFIX: &str = "pipe";
pub const MAILSLOT_PREFIX: &str = "mailslot";

pub const TICK_PIPE_NAME: &str = "tick";
pub const SYMBOL_PIPE_NAME: &str = "symbol";
pub const ORDER_PIPE_NAME: &str = "order";
pub const CMD_PIPE_NAME: &str = "cmd";

pub const MAX_SYMBOL_NAME_LEN: usize = 16;
pub const MAX_MAILSLOT_MSG_LEN: usize = 512;
pub const NAMED_PIPE_BUFFER_SIZE: usize = 256 * 1024;

// batas buffer yang disiapkan host (MQL) untuk GetCommand
pub const MAX_CMD_ARG_COUNT: usize = 16;
pub const MAX_CMD_ARG_LEN: usize = 128;
pub const MAX_CMD_TICKET_COUNT: usize = 32 * 1024;

/// Reply written back on the command channel once a command is queued.
pub const CMD_SEND_SUCCESS: &str = "cmd sent successfully";
pub const CMD_EXIT: &str = "exit";
