// ===============================
// src/adapter.rs
// ===============================
//
// Konteks adapter di sisi host. Host memanggil entry point secara sinkron
// dari thread-nya sendiri; semua kerja IPC ada di task tokio.
//
// Adapter dibuat sekali, saat register_symbol pertama (akun pertama yang terlihat).
//
use once_cell::sync::OnceCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::RemoteCommand;
use crate::config::Settings;
use crate::consts::{MAX_CMD_ARG_COUNT, MAX_CMD_ARG_LEN, MAX_CMD_TICKET_COUNT};
use crate::domain::{AccountInfo, AccountLogin, DateTime, SymbolInfo, Tick, Ticket};
use crate::metrics::CMDS_COMPLETED;
use crate::naming::{is_addressable_login, ChannelKind};
use crate::note::{NoteKind, SymbolNote};
use crate::order::Order;
use crate::shutdown::TaskGroup;
use crate::transmitter::{CommandReceiver, NoteTransmitter, Transmitter};

/// Caller-owned buffers a command is copied into, sized by the host.
#[derive(Debug)]
pub struct CommandSlot {
    name: String,
    args: Vec<String>,
    tickets: Vec<Ticket>,
    max_args: usize,
    max_len: usize,
    max_tickets: usize,
}

impl CommandSlot {
    pub fn with_capacity(max_args: usize, max_len: usize, max_tickets: usize) -> Self {
        Self {
            name: String::with_capacity(max_len),
            args: Vec::with_capacity(max_args),
            tickets: Vec::with_capacity(max_tickets),
            max_args,
            max_len,
            max_tickets,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    // Kapasitas dijamin oleh kontrak host; pelanggaran = bug, bukan kondisi runtime.
    fn fill(&mut self, cmd: &RemoteCommand) {
        let args = cmd.args();
        let tickets = cmd.tickets();
        assert!(args.len() <= self.max_args, "command has {} args, slot holds {}", args.len(), self.max_args);
        assert!(
            args.iter().all(|a| a.len() <= self.max_len),
            "command argument longer than {}",
            self.max_len
        );
        assert!(
            tickets.len() <= self.max_tickets,
            "command has {} tickets, slot holds {}",
            tickets.len(),
            self.max_tickets
        );
        self.name.clear();
        self.name.push_str(cmd.name());
        self.args.clear();
        self.args.extend(args);
        self.tickets.clear();
        self.tickets.extend_from_slice(tickets);
    }
}

impl Default for CommandSlot {
    fn default() -> Self {
        Self::with_capacity(MAX_CMD_ARG_COUNT, MAX_CMD_ARG_LEN, MAX_CMD_TICKET_COUNT)
    }
}

/// Queue of accepted commands plus the single in-flight guard.
pub struct CommandManager {
    queue: Mutex<mpsc::UnboundedReceiver<RemoteCommand>>,
    execution_pending: AtomicBool,
}

impl CommandManager {
    pub fn new(queue: mpsc::UnboundedReceiver<RemoteCommand>) -> Self {
        Self { queue: Mutex::new(queue), execution_pending: AtomicBool::new(false) }
    }

    /// Hands out the next command unless one is still executing on the host.
    pub fn get_command(&self, slot: &mut CommandSlot) -> bool {
        if self
            .execution_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let next = self.queue.lock().unwrap_or_else(PoisonError::into_inner).try_recv();
        match next {
            Ok(cmd) => {
                slot.fill(&cmd);
                info!(%cmd, "command handed to host");
                true
            }
            Err(_) => {
                self.execution_pending.store(false, Ordering::Release);
                false
            }
        }
    }

    pub fn on_command_completed(&self, result: &str) {
        info!(%result, "command completed");
        CMDS_COMPLETED.inc();
        self.execution_pending.store(false, Ordering::Release);
    }

    pub fn is_execution_pending(&self) -> bool {
        self.execution_pending.load(Ordering::Acquire)
    }
}

pub struct Adapter {
    account: AccountInfo,
    symbols: Mutex<BTreeSet<String>>,
    notes: NoteTransmitter,
    ticks: Transmitter<Tick>,
    symbol_infos: Transmitter<SymbolInfo>,
    orders: Transmitter<Order>,
    commands: CommandManager,
    tasks: TaskGroup,
}

impl Adapter {
    /// Starts every loop of `account` on `runtime`.
    pub fn start(settings: &Settings, account: AccountInfo, runtime: Handle) -> Self {
        let tasks = TaskGroup::with_runtime(runtime);
        let ns = settings.namespace();
        let backoff = settings.bind_backoff;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        CommandReceiver::start(ns.clone(), account.clone(), backoff, cmd_tx, &tasks);

        Self {
            notes: NoteTransmitter::start(ns.clone(), &tasks),
            ticks: Transmitter::start(ns.clone(), account.clone(), ChannelKind::Tick, backoff, &tasks),
            symbol_infos: Transmitter::start(ns.clone(), account.clone(), ChannelKind::Symbol, backoff, &tasks),
            orders: Transmitter::start(ns, account.clone(), ChannelKind::Order, backoff, &tasks),
            commands: CommandManager::new(cmd_rx),
            symbols: Mutex::new(BTreeSet::new()),
            account,
            tasks,
        }
    }

    pub fn account(&self) -> &AccountInfo {
        &self.account
    }

    pub fn register_symbol(&self, symbol: &str) {
        self.symbols.lock().unwrap_or_else(PoisonError::into_inner).insert(symbol.to_string());
        self.send_note(NoteKind::RegisterSymbol, symbol);
    }

    pub fn unregister_symbol(&self, symbol: &str) {
        self.send_note(NoteKind::UnregisterSymbol, symbol);
        self.symbols.lock().unwrap_or_else(PoisonError::into_inner).remove(symbol);
    }

    pub fn symbols(&self) -> Vec<String> {
        self.symbols.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }

    fn send_note(&self, kind: NoteKind, symbol: &str) {
        let packed = SymbolNote::new(kind, self.account.clone(), symbol).pack();
        debug!(%packed, "note queued");
        self.notes.write(packed);
    }

    pub fn send_tick(&self, tick: Tick) {
        self.ticks.write(tick);
    }

    pub fn dump_symbol(&self, info: SymbolInfo) {
        self.symbol_infos.write(info);
    }

    pub fn dump_order(&self, order: Order) {
        self.orders.write(order);
    }

    pub fn commands(&self) -> &CommandManager {
        &self.commands
    }

    pub async fn shutdown(&self) {
        self.tasks.shutdown().await;
    }
}

/// Entry points the trading host calls.
pub struct AdapterHost {
    settings: Settings,
    runtime: Handle,
    adapter: OnceCell<Adapter>,
}

impl AdapterHost {
    pub fn new(settings: Settings, runtime: Handle) -> Self {
        Self { settings, runtime, adapter: OnceCell::new() }
    }

    fn adapter(&self, call: &'static str) -> Option<&Adapter> {
        let adapter = self.adapter.get();
        if adapter.is_none() {
            warn!(call, "adapter not initialised yet, call ignored");
        }
        adapter
    }

    pub fn account(&self) -> Option<&AccountInfo> {
        self.adapter.get().map(Adapter::account)
    }

    /// First call fixes the account for the life of the host.
    pub fn register_symbol(&self, broker: &str, login: AccountLogin, symbol: &str) {
        // backend tidak akan pernah menemukan channel-nya
        if !is_addressable_login(login) {
            warn!(broker, login, symbol, "negative login cannot be published, call ignored");
            return;
        }
        let account = AccountInfo::new(broker, login);
        let adapter = self.adapter.get_or_init(|| {
            info!(%account, "adapter initialised");
            Adapter::start(&self.settings, account.clone(), self.runtime.clone())
        });
        if adapter.account() != &account {
            warn!(%account, bound = %adapter.account(), "adapter already bound to another account");
        }
        adapter.register_symbol(symbol);
    }

    pub fn unregister_symbol(&self, symbol: &str) {
        if let Some(adapter) = self.adapter("unregister_symbol") {
            adapter.unregister_symbol(symbol);
        }
    }

    pub fn dump_tick(&self, symbol: &str, time: DateTime, bid: f64, ask: f64, last: f64) {
        if let Some(adapter) = self.adapter("dump_tick") {
            adapter.send_tick(Tick::new(symbol, time, bid, ask, last));
        }
    }

    pub fn dump_symbol(&self, name: &str) {
        if let Some(adapter) = self.adapter("dump_symbol") {
            adapter.dump_symbol(SymbolInfo::new(name));
        }
    }

    pub fn dump_order(&self, order: Order) {
        if let Some(adapter) = self.adapter("dump_order") {
            adapter.dump_order(order);
        }
    }

    pub fn get_command(&self, slot: &mut CommandSlot) -> bool {
        match self.adapter("get_command") {
            Some(adapter) => adapter.commands().get_command(slot),
            None => false,
        }
    }

    pub fn on_command_completed(&self, result: &str) {
        if let Some(adapter) = self.adapter("on_command_completed") {
            adapter.commands().on_command_completed(result);
        }
    }

    pub fn max_cmd_arg_count(&self) -> usize {
        MAX_CMD_ARG_COUNT
    }

    pub fn max_cmd_string_len(&self) -> usize {
        MAX_CMD_ARG_LEN
    }

    pub fn max_cmd_ticket_count(&self) -> usize {
        MAX_CMD_TICKET_COUNT
    }

    pub async fn shutdown(&self) {
        if let Some(adapter) = self.adapter.get() {
            adapter.shutdown().await;
        }
    }
}
