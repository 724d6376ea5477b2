// ===============================
// src/command.rs
// ===============================
use std::fmt;

use crate::domain::Ticket;
use crate::order::{format_price, ModifyOrder, NewOrder};

/// Every operation a trader understands, with its name and alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ListSymbols,
    Get,
    Open,
    Close,
    CloseAll,
    Modify,
    SetStopLoss,
    SetTakeProfit,
    GetSymbols,
    ShowTicks,
    HideTicks,
}

const OPERATIONS: [(Operation, &str, &str); 11] = [
    (Operation::ListSymbols, "list_symbols", "ls"),
    (Operation::Get, "get", "g"),
    (Operation::Open, "open", "o"),
    (Operation::Close, "close", "c"),
    (Operation::CloseAll, "close_all", "ca"),
    (Operation::Modify, "modify", "m"),
    (Operation::SetStopLoss, "set_stop_loss", "sl"),
    (Operation::SetTakeProfit, "set_take_profit", "tp"),
    (Operation::GetSymbols, "get_symbols", "gs"),
    (Operation::ShowTicks, "show_ticks", "st"),
    (Operation::HideTicks, "hide_ticks", "ht"),
];

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::ListSymbols,
        Operation::Get,
        Operation::Open,
        Operation::Close,
        Operation::CloseAll,
        Operation::Modify,
        Operation::SetStopLoss,
        Operation::SetTakeProfit,
        Operation::GetSymbols,
        Operation::ShowTicks,
        Operation::HideTicks,
    ];

    fn entry(self) -> (&'static str, &'static str) {
        OPERATIONS
            .iter()
            .find(|(op, _, _)| *op == self)
            .map(|(_, name, alias)| (*name, *alias))
            .unwrap_or(("", ""))
    }

    pub fn name(self) -> &'static str {
        self.entry().0
    }

    pub fn alias(self) -> &'static str {
        self.entry().1
    }

    /// Alias dulu, baru nama lengkap.
    pub fn resolve(token: &str) -> Option<Operation> {
        OPERATIONS
            .iter()
            .find(|(_, _, alias)| *alias == token)
            .or_else(|| OPERATIONS.iter().find(|(_, name, _)| *name == token))
            .map(|(op, _, _)| *op)
    }

    pub fn is_local(self) -> bool {
        matches!(self, Operation::GetSymbols | Operation::ShowTicks | Operation::HideTicks)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Commands that cross the connection and run on the host.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteCommand {
    ListSymbols,
    Get(Vec<Ticket>),
    Open(NewOrder),
    Close(Vec<Ticket>),
    CloseAll,
    Modify(ModifyOrder, Vec<Ticket>),
    SetStopLoss(f64, Vec<Ticket>),
    SetTakeProfit(f64, Vec<Ticket>),
}

impl RemoteCommand {
    pub fn operation(&self) -> Operation {
        match self {
            RemoteCommand::ListSymbols => Operation::ListSymbols,
            RemoteCommand::Get(_) => Operation::Get,
            RemoteCommand::Open(_) => Operation::Open,
            RemoteCommand::Close(_) => Operation::Close,
            RemoteCommand::CloseAll => Operation::CloseAll,
            RemoteCommand::Modify(..) => Operation::Modify,
            RemoteCommand::SetStopLoss(..) => Operation::SetStopLoss,
            RemoteCommand::SetTakeProfit(..) => Operation::SetTakeProfit,
        }
    }

    pub fn name(&self) -> &'static str {
        self.operation().name()
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            RemoteCommand::Open(o) => vec![
                o.symbol.clone(),
                o.order_type.name().to_string(),
                format!("{}", o.volume),
                format_price(o.price),
                format_price(o.stop_loss),
                format_price(o.take_profit),
                o.expiration.to_string(),
            ],
            RemoteCommand::Modify(m, _) => vec![
                format_price(m.price),
                format_price(m.stop_loss),
                format_price(m.take_profit),
                m.expiration.to_string(),
            ],
            RemoteCommand::SetStopLoss(price, _) | RemoteCommand::SetTakeProfit(price, _) => {
                vec![format_price(*price)]
            }
            RemoteCommand::ListSymbols
            | RemoteCommand::Get(_)
            | RemoteCommand::Close(_)
            | RemoteCommand::CloseAll => Vec::new(),
        }
    }

    pub fn tickets(&self) -> &[Ticket] {
        match self {
            RemoteCommand::Get(t)
            | RemoteCommand::Close(t)
            | RemoteCommand::Modify(_, t)
            | RemoteCommand::SetStopLoss(_, t)
            | RemoteCommand::SetTakeProfit(_, t) => t,
            RemoteCommand::ListSymbols | RemoteCommand::Open(_) | RemoteCommand::CloseAll => &[],
        }
    }
}

/// Wire line: `name arg* ticket*`.
impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        for ticket in self.tickets() {
            write!(f, " {ticket}")?;
        }
        Ok(())
    }
}

/// Commands answered by the trader itself, never sent to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalCommand {
    GetSymbols,
    ShowTicks,
    HideTicks,
}

impl LocalCommand {
    pub fn operation(self) -> Operation {
        match self {
            LocalCommand::GetSymbols => Operation::GetSymbols,
            LocalCommand::ShowTicks => Operation::ShowTicks,
            LocalCommand::HideTicks => Operation::HideTicks,
        }
    }

    pub fn name(self) -> &'static str {
        self.operation().name()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Remote(RemoteCommand),
    Local(LocalCommand),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Remote(c) => c.name(),
            Command::Local(c) => c.name(),
        }
    }
}

impl From<RemoteCommand> for Command {
    fn from(c: RemoteCommand) -> Self {
        Command::Remote(c)
    }
}

impl From<LocalCommand> for Command {
    fn from(c: LocalCommand) -> Self {
        Command::Local(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderType;

    #[test]
    fn resolve_prefers_alias_then_name() {
        assert_eq!(Operation::resolve("o"), Some(Operation::Open));
        assert_eq!(Operation::resolve("open"), Some(Operation::Open));
        assert_eq!(Operation::resolve("sl"), Some(Operation::SetStopLoss));
        assert_eq!(Operation::resolve("set_take_profit"), Some(Operation::SetTakeProfit));
        assert_eq!(Operation::resolve("Open"), None);
        assert_eq!(Operation::resolve("buy"), None);
        for op in Operation::ALL {
            assert_eq!(Operation::resolve(op.name()), Some(op));
            assert_eq!(Operation::resolve(op.alias()), Some(op));
        }
    }

    #[test]
    fn wire_lines() {
        assert_eq!(RemoteCommand::Close(vec![100, 101]).to_string(), "close 100 101");
        assert_eq!(RemoteCommand::CloseAll.to_string(), "close_all");
        assert_eq!(RemoteCommand::Get(vec![]).to_string(), "get");
        assert_eq!(
            RemoteCommand::SetStopLoss(1.1, vec![7]).to_string(),
            "set_stop_loss 1.1 7"
        );

        let open = RemoteCommand::Open(NewOrder {
            symbol: "EURUSD".into(),
            order_type: OrderType::BuyLimit,
            volume: 0.5,
            price: 1.07,
            stop_loss: 0.0,
            take_profit: 1.2,
            expiration: 0,
        });
        assert_eq!(open.args().len(), 7);
        assert!(open.tickets().is_empty());
        assert_eq!(open.to_string(), "open EURUSD BuyLimit 0.5 1.07 0 1.2 0");

        let modify = RemoteCommand::Modify(
            ModifyOrder { price: 1.0, stop_loss: 0.9, take_profit: 1e-9, expiration: 5 },
            vec![3, 4],
        );
        assert_eq!(modify.to_string(), "modify 1 0.9 0 5 3 4");
    }

    #[test]
    fn local_split() {
        assert!(Operation::GetSymbols.is_local());
        assert!(!Operation::CloseAll.is_local());
        assert_eq!(Command::from(LocalCommand::ShowTicks).name(), "show_ticks");
    }
}
