// ===============================
// src/parser.rs
// ===============================
//
// Recursive-descent parser atas token yang dipisah whitespace.
// Dipakai di dua sisi: adapter (baris dari channel cmd) dan backend (REPL).
//
use std::fmt::Display;
use std::str::{FromStr, SplitWhitespace};
use thiserror::Error;

use crate::command::{Command, LocalCommand, Operation, RemoteCommand};
use crate::consts::{MAX_CMD_ARG_LEN, MAX_CMD_TICKET_COUNT, MAX_SYMBOL_NAME_LEN, NAMED_PIPE_BUFFER_SIZE};
use crate::domain::{AccountKey, DateTime, Ticket};
use crate::order::{ModifyOrder, NewOrder, OrderType};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("too few arguments")]
    MissingArgument,
    #[error("incorrect {label}: '{token}': {reason}")]
    InvalidNumericLiteral { label: &'static str, token: String, reason: String },
    #[error("incorrect order type: {0}")]
    InvalidOrderType(String),
    #[error("not enough arguments, order tickets are obligatory")]
    MissingTickets,
    #[error("too many tickets, at most {0} allowed")]
    TooManyTickets(usize),
    #[error("argument too long: '{token}', at most {max} characters allowed")]
    ArgumentTooLong { token: String, max: usize },
    #[error("command too long: {len} bytes, at most {max} fit in one message")]
    CommandTooLong { len: usize, max: usize },
    #[error("unknown command {0}")]
    UnknownCommand(String),
    #[error("incorrect account key {0}")]
    UnknownAccount(i32),
    #[error("default account not selected, please run 'select' command")]
    NoAccountSelected,
}

/// Whole token must convert; `12x` is an error, never `12`.
pub fn parse_number<T>(token: &str, label: &'static str) -> Result<T, ParseError>
where
    T: FromStr,
    T::Err: Display,
{
    token.parse::<T>().map_err(|e| ParseError::InvalidNumericLiteral {
        label,
        token: token.to_string(),
        reason: e.to_string(),
    })
}

pub struct CommandParser<'a> {
    tokens: SplitWhitespace<'a>,
}

impl<'a> CommandParser<'a> {
    pub fn new(line: &'a str) -> Self {
        Self { tokens: line.split_whitespace() }
    }

    /// Next token if any. Tokens longer than a host argument slot are rejected.
    pub fn try_next_token(&mut self) -> Result<Option<&'a str>, ParseError> {
        match self.tokens.next() {
            Some(token) if token.len() > MAX_CMD_ARG_LEN => Err(ParseError::ArgumentTooLong {
                token: token.to_string(),
                max: MAX_CMD_ARG_LEN,
            }),
            other => Ok(other),
        }
    }

    pub fn next_token(&mut self) -> Result<&'a str, ParseError> {
        self.try_next_token()?.ok_or(ParseError::MissingArgument)
    }

    pub fn next_token_or(&mut self, default: &'a str) -> Result<&'a str, ParseError> {
        Ok(self.try_next_token()?.unwrap_or(default))
    }

    /// Everything not consumed yet, e.g. the free arguments of a strategy command.
    pub fn remaining(&mut self) -> Result<Vec<String>, ParseError> {
        let mut rest = Vec::new();
        while let Some(token) = self.try_next_token()? {
            rest.push(token.to_string());
        }
        Ok(rest)
    }

    pub fn parse_account_key(&mut self) -> Result<AccountKey, ParseError> {
        let token = self.next_token()?;
        parse_number::<i32>(token, "account key").map(AccountKey::from_raw)
    }

    pub fn parse_operation(&mut self) -> Result<Operation, ParseError> {
        let name = self.try_next_token()?.unwrap_or_default();
        Operation::resolve(name).ok_or_else(|| ParseError::UnknownCommand(name.to_string()))
    }

    pub fn parse_order_type(&mut self) -> Result<OrderType, ParseError> {
        let token = self.next_token()?;
        match OrderType::parse(token) {
            Some(t) if t != OrderType::None => Ok(t),
            _ => Err(ParseError::InvalidOrderType(token.to_string())),
        }
    }

    pub fn parse_volume(&mut self) -> Result<f64, ParseError> {
        parse_number(self.next_token()?, "volume")
    }

    pub fn parse_price(&mut self, required: bool) -> Result<f64, ParseError> {
        let token = if required { self.next_token()? } else { self.next_token_or("0")? };
        parse_number(token, "price")
    }

    pub fn parse_datetime(&mut self, required: bool) -> Result<DateTime, ParseError> {
        let token = if required { self.next_token()? } else { self.next_token_or("0")? };
        parse_number(token, "datetime")
    }

    /// Consumes every remaining token as a ticket.
    pub fn parse_tickets(&mut self, required: bool) -> Result<Vec<Ticket>, ParseError> {
        let mut tickets = Vec::new();
        while let Some(token) = self.try_next_token()? {
            if tickets.len() == MAX_CMD_TICKET_COUNT {
                return Err(ParseError::TooManyTickets(MAX_CMD_TICKET_COUNT));
            }
            tickets.push(parse_number(token, "ticket")?);
        }
        if required && tickets.is_empty() {
            return Err(ParseError::MissingTickets);
        }
        Ok(tickets)
    }

    pub fn parse_new_order(&mut self) -> Result<NewOrder, ParseError> {
        let symbol = self.next_token()?;
        if symbol.len() > MAX_SYMBOL_NAME_LEN {
            return Err(ParseError::ArgumentTooLong {
                token: symbol.to_string(),
                max: MAX_SYMBOL_NAME_LEN,
            });
        }
        Ok(NewOrder {
            symbol: symbol.to_string(),
            order_type: self.parse_order_type()?,
            volume: self.parse_volume()?,
            price: self.parse_price(true)?,
            stop_loss: self.parse_price(false)?,
            take_profit: self.parse_price(false)?,
            expiration: self.parse_datetime(false)?,
        })
    }

    pub fn parse_modify_order(&mut self) -> Result<ModifyOrder, ParseError> {
        Ok(ModifyOrder {
            price: self.parse_price(true)?,
            stop_loss: self.parse_price(false)?,
            take_profit: self.parse_price(false)?,
            expiration: self.parse_datetime(false)?,
        })
    }

    /// Builds the command for an already resolved operation.
    pub fn parse_trader_command(&mut self, op: Operation) -> Result<Command, ParseError> {
        let command = match op {
            Operation::ListSymbols => RemoteCommand::ListSymbols.into(),
            Operation::Get => RemoteCommand::Get(self.parse_tickets(false)?).into(),
            Operation::Open => RemoteCommand::Open(self.parse_new_order()?).into(),
            Operation::Close => RemoteCommand::Close(self.parse_tickets(true)?).into(),
            Operation::CloseAll => RemoteCommand::CloseAll.into(),
            Operation::Modify => {
                let modify = self.parse_modify_order()?;
                RemoteCommand::Modify(modify, self.parse_tickets(true)?).into()
            }
            Operation::SetStopLoss => {
                let price = self.parse_price(true)?;
                RemoteCommand::SetStopLoss(price, self.parse_tickets(true)?).into()
            }
            Operation::SetTakeProfit => {
                let price = self.parse_price(true)?;
                RemoteCommand::SetTakeProfit(price, self.parse_tickets(true)?).into()
            }
            Operation::GetSymbols => LocalCommand::GetSymbols.into(),
            Operation::ShowTicks => LocalCommand::ShowTicks.into(),
            Operation::HideTicks => LocalCommand::HideTicks.into(),
        };
        // baris perintah harus muat dalam satu frame channel cmd
        if let Command::Remote(remote) = &command {
            let len = remote.to_string().len();
            if len > NAMED_PIPE_BUFFER_SIZE {
                return Err(ParseError::CommandTooLong { len, max: NAMED_PIPE_BUFFER_SIZE });
            }
        }
        Ok(command)
    }
}

/// Parses a complete trader line such as `close 100 101`.
pub fn parse_trader_command(line: &str) -> Result<Command, ParseError> {
    let mut parser = CommandParser::new(line);
    let op = parser.parse_operation()?;
    parser.parse_trader_command(op)
}
