// ===============================
// src/order.rs
// ===============================
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::consts::MAX_SYMBOL_NAME_LEN;
use crate::domain::{DateTime, SymbolName, Ticket};

/// Numeric values follow the host platform's own enumeration; never renumber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum OrderType {
    Buy = 0,
    Sell = 1,
    BuyLimit = 2,
    SellLimit = 3,
    BuyStop = 4,
    SellStop = 5,
    None = 6,
}

const ORDER_TYPES: [(OrderType, &str, &str); 6] = [
    (OrderType::Buy, "Buy", "b"),
    (OrderType::Sell, "Sell", "s"),
    (OrderType::BuyLimit, "BuyLimit", "bl"),
    (OrderType::SellLimit, "SellLimit", "sl"),
    (OrderType::BuyStop, "BuyStop", "bs"),
    (OrderType::SellStop, "SellStop", "ss"),
];

impl OrderType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(OrderType::Buy),
            1 => Some(OrderType::Sell),
            2 => Some(OrderType::BuyLimit),
            3 => Some(OrderType::SellLimit),
            4 => Some(OrderType::BuyStop),
            5 => Some(OrderType::SellStop),
            6 => Some(OrderType::None),
            _ => None,
        }
    }

    pub fn raw(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        ORDER_TYPES
            .iter()
            .find(|(t, _, _)| *t == self)
            .map(|(_, name, _)| *name)
            .unwrap_or("None")
    }

    /// Accepts the full name or the short alias (`b`, `sl`, ...).
    pub fn parse(token: &str) -> Option<Self> {
        if token == "None" {
            return Some(OrderType::None);
        }
        ORDER_TYPES
            .iter()
            .find(|(_, name, alias)| *name == token || *alias == token)
            .map(|(t, _, _)| *t)
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self,
            OrderType::BuyLimit | OrderType::SellLimit | OrderType::BuyStop | OrderType::SellStop
        )
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OrderStatus {
    Unknown,
    Pending,
    Open,
    Closed,
}

impl OrderStatus {
    pub fn name(self) -> &'static str {
        match self {
            OrderStatus::Unknown => "Unknown",
            OrderStatus::Pending => "Pending",
            OrderStatus::Open => "Open",
            OrderStatus::Closed => "Closed",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unknown" => Ok(OrderStatus::Unknown),
            "Pending" => Ok(OrderStatus::Pending),
            "Open" => Ok(OrderStatus::Open),
            "Closed" => Ok(OrderStatus::Closed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Order {
    pub symbol: SymbolName,
    pub ticket: Ticket,
    pub order_type: OrderType,
    pub lots: f64,
    pub open_price: f64,
    pub close_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub open_time: DateTime,
    pub expiration_time: DateTime,
    pub close_time: DateTime,
    pub commission: f64,
    pub swap: f64,
    pub profit: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum OrderTextError {
    #[error("order text has {0} fields, expected 15")]
    FieldCount(usize),
    #[error("incorrect order field {field}: '{token}'")]
    Field { field: &'static str, token: String },
    #[error("order status {found} does not match derived status {derived}")]
    StatusMismatch { found: OrderStatus, derived: OrderStatus },
}

// simbol kosong tetap harus jadi satu token
const EMPTY_SYMBOL: &str = "-";

fn field<T: FromStr>(field: &'static str, token: &str) -> Result<T, OrderTextError> {
    token
        .parse()
        .map_err(|_| OrderTextError::Field { field, token: token.to_string() })
}

impl Order {
    /// Status is never stored; it follows from type and close time.
    pub fn status(&self) -> OrderStatus {
        if self.close_time != 0 {
            OrderStatus::Closed
        } else if matches!(self.order_type, OrderType::Buy | OrderType::Sell) {
            OrderStatus::Open
        } else if self.order_type.is_pending() {
            OrderStatus::Pending
        } else {
            OrderStatus::Unknown
        }
    }

    pub fn serialize(&self) -> String {
        format!(
            "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            if self.symbol.as_str().is_empty() { EMPTY_SYMBOL } else { self.symbol.as_str() },
            self.ticket,
            self.status(),
            self.order_type,
            self.lots,
            self.open_price,
            self.close_price,
            self.stop_loss,
            self.take_profit,
            self.open_time,
            self.expiration_time,
            self.close_time,
            self.commission,
            self.swap,
            self.profit,
        )
    }

    pub fn deserialize(text: &str) -> Result<Order, OrderTextError> {
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let [symbol, ticket, status, order_type, lots, open_price, close_price, stop_loss, take_profit, open_time, expiration_time, close_time, commission, swap, profit] =
            tokens.as_slice()
        else {
            return Err(OrderTextError::FieldCount(tokens.len()));
        };

        if symbol.len() > MAX_SYMBOL_NAME_LEN {
            return Err(OrderTextError::Field { field: "symbol", token: symbol.to_string() });
        }
        let found: OrderStatus = field("status", status)?;
        let symbol = if *symbol == EMPTY_SYMBOL { "" } else { *symbol };
        let order = Order {
            symbol: SymbolName::new(symbol),
            ticket: field("ticket", ticket)?,
            order_type: OrderType::parse(order_type).ok_or_else(|| OrderTextError::Field {
                field: "type",
                token: order_type.to_string(),
            })?,
            lots: field("lots", lots)?,
            open_price: field("open price", open_price)?,
            close_price: field("close price", close_price)?,
            stop_loss: field("stop loss", stop_loss)?,
            take_profit: field("take profit", take_profit)?,
            open_time: field("open time", open_time)?,
            expiration_time: field("expiration", expiration_time)?,
            close_time: field("close time", close_time)?,
            commission: field("commission", commission)?,
            swap: field("swap", swap)?,
            profit: field("profit", profit)?,
        };
        let derived = order.status();
        if found != derived {
            return Err(OrderTextError::StatusMismatch { found, derived });
        }
        Ok(order)
    }
}

/// Arguments of an `open` command.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    pub symbol: String,
    pub order_type: OrderType,
    pub volume: f64,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub expiration: DateTime,
}

/// Arguments of a `modify` command.
#[derive(Clone, Debug, PartialEq)]
pub struct ModifyOrder {
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub expiration: DateTime,
}

/// Harga sangat kecil ditulis "0" supaya host tidak menerima 1e-12.
pub fn format_price(value: f64) -> String {
    if value.abs() < 1e-6 {
        "0".to_string()
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(order_type: OrderType, close_time: DateTime) -> Order {
        Order {
            symbol: SymbolName::new("EURUSD"),
            ticket: 42,
            order_type,
            lots: 0.1,
            open_price: 1.08123,
            close_price: 0.0,
            stop_loss: 1.07,
            take_profit: 1.0 / 3.0,
            open_time: 1_700_000_000,
            expiration_time: 0,
            close_time,
            commission: -0.7,
            swap: 0.0,
            profit: 12.5,
        }
    }

    #[test]
    fn status_is_derived_from_type_and_close_time() {
        assert_eq!(order(OrderType::Buy, 0).status(), OrderStatus::Open);
        assert_eq!(order(OrderType::Sell, 0).status(), OrderStatus::Open);
        for t in [OrderType::BuyLimit, OrderType::SellLimit, OrderType::BuyStop, OrderType::SellStop] {
            assert_eq!(order(t, 0).status(), OrderStatus::Pending);
            assert_eq!(order(t, 5).status(), OrderStatus::Closed);
        }
        assert_eq!(order(OrderType::Buy, 1).status(), OrderStatus::Closed);
        assert_eq!(order(OrderType::None, 0).status(), OrderStatus::Unknown);
    }

    #[test]
    fn text_round_trip_keeps_every_bit() {
        for (t, close) in [(OrderType::Buy, 0), (OrderType::SellStop, 0), (OrderType::Sell, 1_700_000_500)] {
            let o = order(t, close);
            let text = o.serialize();
            let back = Order::deserialize(&text).expect("round trip");
            assert_eq!(back, o);
            assert_eq!(back.take_profit.to_bits(), o.take_profit.to_bits());
            assert_eq!(back.status(), o.status());
        }
    }

    #[test]
    fn empty_symbol_keeps_its_field() {
        let o = Order { symbol: SymbolName::default(), ..order(OrderType::BuyLimit, 0) };
        let text = o.serialize();
        assert!(text.starts_with("- 42 Pending BuyLimit "), "{text}");
        assert_eq!(text.split_whitespace().count(), 15);
        let back = Order::deserialize(&text).unwrap();
        assert_eq!(back.symbol.as_str(), "");
        assert_eq!(back, o);
    }

    #[test]
    fn serialized_field_order() {
        let text = order(OrderType::Buy, 0).serialize();
        assert_eq!(
            text,
            "EURUSD 42 Open Buy 0.1 1.08123 0 1.07 0.3333333333333333 1700000000 0 0 -0.7 0 12.5"
        );
    }

    #[test]
    fn deserialize_rejects_bad_text() {
        assert_eq!(Order::deserialize("EURUSD 42"), Err(OrderTextError::FieldCount(2)));

        let text = order(OrderType::Buy, 0).serialize().replace(" Open ", " Pending ");
        assert!(matches!(
            Order::deserialize(&text),
            Err(OrderTextError::StatusMismatch { found: OrderStatus::Pending, derived: OrderStatus::Open })
        ));

        let text = order(OrderType::Buy, 0).serialize().replace(" 42 ", " 4x2 ");
        assert!(matches!(Order::deserialize(&text), Err(OrderTextError::Field { field: "ticket", .. })));
    }

    #[test]
    fn order_type_names_and_aliases() {
        assert_eq!(OrderType::parse("b"), Some(OrderType::Buy));
        assert_eq!(OrderType::parse("SellLimit"), Some(OrderType::SellLimit));
        assert_eq!(OrderType::parse("ss"), Some(OrderType::SellStop));
        assert_eq!(OrderType::parse("buy"), None);
        assert_eq!(OrderType::from_raw(4), Some(OrderType::BuyStop));
        assert_eq!(OrderType::from_raw(7), None);
        assert_eq!(OrderType::None.name(), "None");
    }

    #[test]
    fn price_formatting() {
        assert_eq!(format_price(0.0), "0");
        assert_eq!(format_price(1e-9), "0");
        assert_eq!(format_price(-1e-7), "0");
        assert_eq!(format_price(1.2345), "1.2345");
    }
}
