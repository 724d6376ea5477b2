// ===============================
// src/strategy.rs
// ===============================
//
// Strategi = handler per symbol untuk tick/order dan perintah teks bebas.
// Dipasang lewat executor: `<nama> <symbol> <args...>`.
//
// Disediakan 1 strategi:
// - climber -> placeholder, semua callback no-op
//
use thiserror::Error;

use crate::domain::Tick;
use crate::order::Order;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("unknown strategy {0}")]
    Unknown(String),
    #[error("strategy {0} already registered")]
    Duplicate(String),
    #[error("strategy {strategy}: {reason}")]
    Command { strategy: String, reason: String },
}

pub trait TradingStrategy: Send {
    fn name(&self) -> &str;

    fn on_tick(&mut self, tick: &Tick);
    fn on_order(&mut self, order: &Order);

    /// Free arguments that follow `<strategy> <symbol>` on the command line.
    fn execute_command(&mut self, args: &[String]) -> Result<(), StrategyError>;
}

pub trait StrategyFactory: Send + Sync {
    fn names(&self) -> Vec<&'static str>;
    fn create(&self, name: &str) -> Result<Box<dyn TradingStrategy>, StrategyError>;
}

// -----------------------------------------------------------------------------
// CLIMBER
//    Placeholder strategi tangga; logika perdagangan belum ada.
// -----------------------------------------------------------------------------
pub const CLIMBER: &str = "climber";

#[derive(Debug, Default)]
pub struct Climber;

impl TradingStrategy for Climber {
    fn name(&self) -> &str {
        CLIMBER
    }

    fn on_tick(&mut self, _tick: &Tick) {}

    fn on_order(&mut self, _order: &Order) {}

    fn execute_command(&mut self, _args: &[String]) -> Result<(), StrategyError> {
        Ok(())
    }
}

pub struct ClimberFactory;

impl StrategyFactory for ClimberFactory {
    fn names(&self) -> Vec<&'static str> {
        vec![CLIMBER]
    }

    fn create(&self, name: &str) -> Result<Box<dyn TradingStrategy>, StrategyError> {
        match name {
            CLIMBER => Ok(Box::new(Climber)),
            other => Err(StrategyError::Unknown(other.to_string())),
        }
    }
}
