// ===============================
// src/trader.rs
// ===============================
//
// State per akun di backend: symbol terdaftar, order terakhir per ticket,
// toggle echo tick, dan strategi per symbol.
//
use ahash::AHashMap as HashMap;
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::command::{Command, LocalCommand};
use crate::communicator::{Communicator, CommunicatorObserver};
use crate::connection::{Connection, TraderSink};
use crate::console::Console;
use crate::domain::{AccountKey, SymbolInfo, Tick, Ticket};
use crate::note::NoteKind;
use crate::order::Order;
use crate::recorder::{Event, EventKind, Recorder};
use crate::strategy::{StrategyError, TradingStrategy};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TraderError {
    #[error("account {0} has no connection yet")]
    NotConnected(AccountKey),
    #[error("no strategy attached to {0}")]
    NoStrategy(String),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
}

#[derive(Default)]
struct TraderState {
    symbols: BTreeSet<String>,
    orders: BTreeMap<Ticket, Order>,
    show_ticks: bool,
    strategies: HashMap<String, Box<dyn TradingStrategy>>,
}

pub struct Trader {
    key: AccountKey,
    console: Console,
    recorder: Recorder,
    connection: OnceCell<Arc<Connection>>,
    state: Mutex<TraderState>,
}

impl Trader {
    pub fn new(key: AccountKey, console: Console, recorder: Recorder) -> Self {
        Self {
            key,
            console,
            recorder,
            connection: OnceCell::new(),
            state: Mutex::new(TraderState::default()),
        }
    }

    pub fn key(&self) -> AccountKey {
        self.key
    }

    fn state(&self) -> MutexGuard<'_, TraderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_connection(&self, connection: Arc<Connection>) {
        if self.connection.set(connection).is_err() {
            warn!(key = %self.key, "connection already set");
        }
    }

    /// Local commands run here; remote ones go to the adapter.
    pub fn execute_command(&self, command: Command) -> Result<(), TraderError> {
        match command {
            Command::Local(cmd) => {
                self.execute_local(cmd);
                Ok(())
            }
            Command::Remote(cmd) => {
                let conn = self.connection.get().ok_or(TraderError::NotConnected(self.key))?;
                conn.send_command(cmd);
                Ok(())
            }
        }
    }

    fn execute_local(&self, cmd: LocalCommand) {
        match cmd {
            LocalCommand::GetSymbols => {
                let symbols: Vec<String> = self.state().symbols.iter().cloned().collect();
                for symbol in symbols {
                    self.console.print_line(symbol);
                }
            }
            LocalCommand::ShowTicks => self.show_ticks(true),
            LocalCommand::HideTicks => self.show_ticks(false),
        }
    }

    pub fn show_ticks(&self, show: bool) {
        self.state().show_ticks = show;
    }

    pub fn symbols(&self) -> Vec<String> {
        self.state().symbols.iter().cloned().collect()
    }

    pub fn order(&self, ticket: Ticket) -> Option<Order> {
        self.state().orders.get(&ticket).copied()
    }

    /// Name of the strategy attached to `symbol`, if any.
    pub fn strategy(&self, symbol: &str) -> Option<String> {
        self.state().strategies.get(symbol).map(|s| s.name().to_string())
    }

    pub fn set_strategy(&self, symbol: &str, strategy: Box<dyn TradingStrategy>) {
        debug!(key = %self.key, %symbol, strategy = strategy.name(), "strategy attached");
        let previous = self.state().strategies.insert(symbol.to_string(), strategy);
        if let Some(previous) = previous {
            warn!(%symbol, replaced = previous.name(), "strategy replaced without detach");
        }
    }

    pub fn remove_strategy(&self, symbol: &str) {
        if let Some(previous) = self.state().strategies.remove(symbol) {
            debug!(key = %self.key, %symbol, strategy = previous.name(), "strategy detached");
        }
    }

    pub fn execute_strategy_command(&self, symbol: &str, args: &[String]) -> Result<(), TraderError> {
        let mut state = self.state();
        let strategy = state
            .strategies
            .get_mut(symbol)
            .ok_or_else(|| TraderError::NoStrategy(symbol.to_string()))?;
        strategy.execute_command(args)?;
        Ok(())
    }
}

impl TraderSink for Trader {
    fn on_register_symbol(&self, symbol: &str) {
        self.console.print_line(format!("onRegisterSymbol {symbol}"));
        self.state().symbols.insert(symbol.to_string());
        self.recorder.record(Event::now(
            self.key,
            EventKind::Note { note: NoteKind::RegisterSymbol.label(), symbol: symbol.to_string() },
        ));
    }

    fn on_unregister_symbol(&self, symbol: &str) {
        self.console.print_line(format!("onUnregisterSymbol {symbol}"));
        self.state().symbols.remove(symbol);
        self.recorder.record(Event::now(
            self.key,
            EventKind::Note { note: NoteKind::UnregisterSymbol.label(), symbol: symbol.to_string() },
        ));
    }

    fn on_tick(&self, tick: &Tick) {
        let mut state = self.state();
        if state.show_ticks {
            self.console.print_line(format!(
                "onTick {} {} {} {} {}",
                tick.symbol, tick.ask, tick.bid, tick.last, tick.time
            ));
        }
        if let Some(strategy) = state.strategies.get_mut(tick.symbol.as_str()) {
            strategy.on_tick(tick);
        }
        drop(state);
        self.recorder.record(Event::now(self.key, EventKind::Tick(*tick)));
    }

    fn on_symbol(&self, info: &SymbolInfo) {
        self.console.print_line(format!("onSymbol {}", info.name));
        self.recorder.record(Event::now(self.key, EventKind::Symbol(*info)));
    }

    fn on_order(&self, order: &Order) {
        self.console.print_line(format!("onOrder {}", order.serialize()));
        let mut state = self.state();
        if let Some(strategy) = state.strategies.get_mut(order.symbol.as_str()) {
            strategy.on_order(order);
        }
        state.orders.insert(order.ticket, *order);
        drop(state);
        self.recorder.record(Event::order(self.key, order));
    }

    fn on_cmd_result(&self, output: &str) {
        self.console.print_line(format!("onCmdResult {output}"));
        self.recorder.record(Event::now(self.key, EventKind::CmdResult { text: output.to_string() }));
    }
}

/// Owns one Trader per discovered account.
pub struct TradeManager {
    communicator: Arc<Communicator>,
    console: Console,
    recorder: Recorder,
    traders: RwLock<HashMap<AccountKey, Arc<Trader>>>,
}

impl TradeManager {
    pub fn new(communicator: Arc<Communicator>, console: Console, recorder: Recorder) -> Self {
        Self { communicator, console, recorder, traders: RwLock::new(HashMap::new()) }
    }

    pub fn trader(&self, key: AccountKey) -> Option<Arc<Trader>> {
        self.traders.read().unwrap_or_else(PoisonError::into_inner).get(&key).cloned()
    }
}

impl CommunicatorObserver for TradeManager {
    fn on_new_account_detected(&self, key: AccountKey) {
        let trader = {
            let mut traders = self.traders.write().unwrap_or_else(PoisonError::into_inner);
            if traders.contains_key(&key) {
                warn!(%key, "trader already exists");
                return;
            }
            let trader = Arc::new(Trader::new(key, self.console.clone(), self.recorder.clone()));
            traders.insert(key, Arc::clone(&trader));
            trader
        };
        let sink: Arc<dyn TraderSink> = trader.clone();
        let connection = self.communicator.connect(key, Arc::downgrade(&sink));
        trader.set_connection(connection);
    }

    fn on_symbol_note(&self, key: AccountKey, kind: NoteKind, symbol: &str) {
        let Some(trader) = self.trader(key) else {
            warn!(%key, %symbol, "note for account without trader");
            return;
        };
        match kind {
            NoteKind::RegisterSymbol => trader.on_register_symbol(symbol),
            NoteKind::UnregisterSymbol => trader.on_unregister_symbol(symbol),
        }
    }
}
