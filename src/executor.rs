// ===============================
// src/executor.rs
// ===============================
//
// Pipeline REPL backend:
//   baris -> parse_general -> { executor | trader | strategy } -> Trader
// Semua error dikonversi jadi satu String di batas publik.
//
use ahash::AHashMap as HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::accounts::AccountManager;
use crate::command::{Command, Operation};
use crate::console::Console;
use crate::consts::CMD_EXIT;
use crate::domain::AccountKey;
use crate::naming::is_integer;
use crate::parser::{parse_number, CommandParser, ParseError};
use crate::strategy::{StrategyError, StrategyFactory};
use crate::trader::{TradeManager, Trader, TraderError};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Trader(#[from] TraderError),
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    #[error("no trader for account {0}")]
    MissingTrader(AccountKey),
}

/// Commands of the executor itself; they never touch a trader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorCommand {
    ListAccounts,
    Select(AccountKey),
    Help,
}

const EXECUTOR_COMMANDS: [(&str, &str); 3] = [("accounts", "la"), ("select", "sel"), ("help", "h")];

fn resolve_executor_command(token: &str) -> Option<&'static str> {
    EXECUTOR_COMMANDS
        .iter()
        .find(|(name, alias)| *alias == token || *name == token)
        .map(|(name, _)| *name)
}

#[derive(Clone, Debug, PartialEq)]
pub enum GeneralCommand {
    Executor(ExecutorCommand),
    Trader { key: AccountKey, command: Command },
    Strategy { key: AccountKey, strategy: String, symbol: String, args: Vec<String> },
}

/// What the general parser needs to know about the running backend.
pub trait GeneralParserContext {
    fn default_account(&self) -> AccountKey;
    fn account_exists(&self, key: AccountKey) -> bool;
    fn is_strategy(&self, name: &str) -> bool;
}

/// `[key] verb args...`, where verb is an executor, trading or strategy command.
pub fn parse_general(line: &str, ctx: &dyn GeneralParserContext) -> Result<GeneralCommand, ParseError> {
    let mut parser = CommandParser::new(line);
    let mut token = parser.next_token()?;

    let explicit = if is_integer(token) {
        let key = AccountKey::from_raw(parse_number(token, "account key")?);
        token = parser.next_token()?;
        Some(key)
    } else {
        None
    };

    if let Some(name) = resolve_executor_command(token) {
        let cmd = match name {
            "accounts" => ExecutorCommand::ListAccounts,
            "select" => ExecutorCommand::Select(parser.parse_account_key()?),
            _ => ExecutorCommand::Help,
        };
        return Ok(GeneralCommand::Executor(cmd));
    }

    let key = explicit.unwrap_or_else(|| ctx.default_account());
    if !ctx.account_exists(key) {
        return Err(if key.is_null() {
            ParseError::NoAccountSelected
        } else {
            ParseError::UnknownAccount(key.raw())
        });
    }

    if let Some(op) = Operation::resolve(token) {
        let command = parser.parse_trader_command(op)?;
        return Ok(GeneralCommand::Trader { key, command });
    }
    if ctx.is_strategy(token) {
        let symbol = parser.next_token()?.to_string();
        let args = parser.remaining()?;
        return Ok(GeneralCommand::Strategy { key, strategy: token.to_string(), symbol, args });
    }
    Err(ParseError::UnknownCommand(token.to_string()))
}

/// `command (alias)` table, each group sorted by alias, `exit` last.
pub fn help_text() -> String {
    let mut out = String::from("command (alias)\n---------------\n");

    let mut executor: Vec<(&str, &str)> = EXECUTOR_COMMANDS.to_vec();
    executor.sort_by_key(|(_, alias)| *alias);
    let mut trading: Vec<(&str, &str)> = Operation::ALL.iter().map(|op| (op.name(), op.alias())).collect();
    trading.sort_by_key(|(_, alias)| *alias);

    for (name, alias) in executor.into_iter().chain(trading) {
        out.push_str(&format!("{name} ({alias})\n"));
    }
    out.push_str(CMD_EXIT);
    out
}

pub struct Executor {
    console: Console,
    accounts: Arc<AccountManager>,
    traders: Arc<TradeManager>,
    factories: HashMap<String, Arc<dyn StrategyFactory>>,
    selected: AccountKey,
}

impl GeneralParserContext for Executor {
    fn default_account(&self) -> AccountKey {
        self.selected
    }

    fn account_exists(&self, key: AccountKey) -> bool {
        self.accounts.exists(key)
    }

    fn is_strategy(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Executor {
    pub fn new(console: Console, accounts: Arc<AccountManager>, traders: Arc<TradeManager>) -> Self {
        Self { console, accounts, traders, factories: HashMap::new(), selected: AccountKey::NULL }
    }

    pub fn selected(&self) -> AccountKey {
        self.selected
    }

    /// Every name the factory serves becomes a strategy verb.
    pub fn register_strategy(&mut self, factory: Arc<dyn StrategyFactory>) -> Result<(), StrategyError> {
        let names = factory.names();
        if let Some(dup) = names.iter().find(|n| self.factories.contains_key(**n)) {
            return Err(StrategyError::Duplicate(dup.to_string()));
        }
        for name in names {
            info!(strategy = name, "strategy registered");
            self.factories.insert(name.to_string(), Arc::clone(&factory));
        }
        Ok(())
    }

    /// Runs an already parsed command against the trader of `key`.
    pub fn execute_command(&self, key: AccountKey, command: Command) -> Result<(), String> {
        self.trader(key)
            .and_then(|t| t.execute_command(command).map_err(ExecError::from))
            .map_err(|e| e.to_string())
    }

    /// Full text pipeline for one REPL line.
    pub fn execute_line(&mut self, line: &str) -> Result<(), String> {
        self.run_line(line).map_err(|e| {
            debug!(%line, error = %e, "command failed");
            e.to_string()
        })
    }

    fn run_line(&mut self, line: &str) -> Result<(), ExecError> {
        match parse_general(line, &*self)? {
            GeneralCommand::Executor(cmd) => self.execute_executor_command(cmd),
            GeneralCommand::Trader { key, command } => {
                self.trader(key)?.execute_command(command)?;
                Ok(())
            }
            GeneralCommand::Strategy { key, strategy, symbol, args } => {
                let trader = self.trader(key)?;
                self.ensure_strategy(&trader, &symbol, &strategy)?;
                trader.execute_strategy_command(&symbol, &args)?;
                Ok(())
            }
        }
    }

    fn execute_executor_command(&mut self, cmd: ExecutorCommand) -> Result<(), ExecError> {
        match cmd {
            ExecutorCommand::ListAccounts => {
                let keys = self.accounts.keys();
                if keys.is_empty() {
                    self.console.print_line("no account connected");
                }
                for key in keys {
                    self.print_account(key);
                }
            }
            ExecutorCommand::Select(key) => {
                if !self.accounts.exists(key) {
                    return Err(ParseError::UnknownAccount(key.raw()).into());
                }
                self.selected = key;
                self.print_account(key);
            }
            ExecutorCommand::Help => self.console.print_line(help_text()),
        }
        Ok(())
    }

    fn print_account(&self, key: AccountKey) {
        if let Some(info) = self.accounts.get(key) {
            self.console.print_line(format!("{key} {info}"));
        }
    }

    fn trader(&self, key: AccountKey) -> Result<Arc<Trader>, ExecError> {
        self.traders.trader(key).ok_or(ExecError::MissingTrader(key))
    }

    /// Attaches `name` to `symbol` unless it is already there.
    pub fn ensure_strategy(&self, trader: &Trader, symbol: &str, name: &str) -> Result<(), ExecError> {
        if trader.strategy(symbol).as_deref() == Some(name) {
            return Ok(());
        }
        let factory = self.factories.get(name).ok_or_else(|| StrategyError::Unknown(name.to_string()))?;
        let strategy = factory.create(name)?;
        trader.remove_strategy(symbol);
        trader.set_strategy(symbol, strategy);
        Ok(())
    }
}
