// ===============================
// src/wire.rs
// ===============================
//
// Record biner ukuran tetap (little-endian), satu record per message:
//   Tick       48 byte
//   SymbolInfo 16 byte
//   Order     112 byte (status tidak dikirim, diturunkan saat decode)
//
use thiserror::Error;

use crate::consts::MAX_SYMBOL_NAME_LEN;
use crate::domain::{SymbolInfo, SymbolName, Tick};
use crate::order::{Order, OrderType};

#[derive(Debug, Error, PartialEq)]
pub enum WireError {
    #[error("record size mismatch: expected {expected} bytes, got {actual}")]
    Size { expected: usize, actual: usize },
    #[error("unknown order type {0}")]
    OrderType(i32),
    #[error("symbol name is not valid UTF-8")]
    Symbol,
}

pub trait WireRecord: Sized + Send + 'static {
    const SIZE: usize;

    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Result<Self, WireError>;
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new<T: WireRecord>(buf: &'a [u8]) -> Result<Self, WireError> {
        if buf.len() != T::SIZE {
            return Err(WireError::Size { expected: T::SIZE, actual: buf.len() });
        }
        Ok(Self { buf })
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        // ukuran sudah divalidasi di `new`
        let (head, rest) = self.buf.split_at(N);
        self.buf = rest;
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        out
    }

    fn symbol(&mut self) -> Result<SymbolName, WireError> {
        SymbolName::from_raw(self.take::<MAX_SYMBOL_NAME_LEN>()).ok_or(WireError::Symbol)
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.take())
    }

    fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.take())
    }
}

impl WireRecord for Tick {
    const SIZE: usize = MAX_SYMBOL_NAME_LEN + 8 * 4;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(self.symbol.as_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.ask.to_le_bytes());
        out.extend_from_slice(&self.bid.to_le_bytes());
        out.extend_from_slice(&self.last.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new::<Self>(bytes)?;
        Ok(Tick {
            symbol: r.symbol()?,
            time: r.i64(),
            ask: r.f64(),
            bid: r.f64(),
            last: r.f64(),
        })
    }
}

impl WireRecord for SymbolInfo {
    const SIZE: usize = MAX_SYMBOL_NAME_LEN;

    fn encode(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new::<Self>(bytes)?;
        Ok(SymbolInfo { name: r.symbol()? })
    }
}

impl WireRecord for Order {
    const SIZE: usize = MAX_SYMBOL_NAME_LEN + 4 * 2 + 8 * 11;

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(self.symbol.as_bytes());
        out.extend_from_slice(&self.ticket.to_le_bytes());
        out.extend_from_slice(&self.order_type.raw().to_le_bytes());
        for v in [self.lots, self.open_price, self.close_price, self.stop_loss, self.take_profit] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for t in [self.open_time, self.expiration_time, self.close_time] {
            out.extend_from_slice(&t.to_le_bytes());
        }
        for v in [self.commission, self.swap, self.profit] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new::<Self>(bytes)?;
        let symbol = r.symbol()?;
        let ticket = r.i32();
        let raw_type = r.i32();
        let order_type = OrderType::from_raw(raw_type).ok_or(WireError::OrderType(raw_type))?;
        Ok(Order {
            symbol,
            ticket,
            order_type,
            lots: r.f64(),
            open_price: r.f64(),
            close_price: r.f64(),
            stop_loss: r.f64(),
            take_profit: r.f64(),
            open_time: r.i64(),
            expiration_time: r.i64(),
            close_time: r.i64(),
            commission: r.f64(),
            swap: r.f64(),
            profit: r.f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderStatus;

    #[test]
    fn record_sizes() {
        assert_eq!(Tick::SIZE, 48);
        assert_eq!(SymbolInfo::SIZE, 16);
        assert_eq!(Order::SIZE, 112);
    }

    #[test]
    fn tick_layout_is_little_endian() {
        let tick = Tick::new("EURPLN", 7, 4.24, 4.25, 4.245);
        let bytes = tick.encode();
        assert_eq!(bytes.len(), Tick::SIZE);
        assert_eq!(&bytes[..6], b"EURPLN");
        assert_eq!(&bytes[16..24], &7i64.to_le_bytes());
        // ask sebelum bid
        assert_eq!(&bytes[24..32], &4.25f64.to_le_bytes());
        assert_eq!(Tick::decode(&bytes).unwrap(), tick);
    }

    #[test]
    fn order_decode_derives_status() {
        let order = Order {
            symbol: SymbolName::new("GBPUSD"),
            ticket: 9,
            order_type: OrderType::BuyLimit,
            lots: 1.0,
            open_price: 1.25,
            close_price: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            open_time: 1,
            expiration_time: 2,
            close_time: 0,
            commission: 0.0,
            swap: 0.0,
            profit: 0.0,
        };
        let back = Order::decode(&order.encode()).unwrap();
        assert_eq!(back, order);
        assert_eq!(back.status(), OrderStatus::Pending);
    }

    #[test]
    fn decode_rejects_wrong_size_and_bad_fields() {
        assert_eq!(
            Tick::decode(&[0u8; 47]),
            Err(WireError::Size { expected: 48, actual: 47 })
        );

        let mut bytes = SymbolInfo::new("X").encode();
        bytes[0] = 0xfe;
        assert_eq!(SymbolInfo::decode(&bytes), Err(WireError::Symbol));

        let mut bytes = vec![0u8; Order::SIZE];
        bytes[20..24].copy_from_slice(&99i32.to_le_bytes());
        assert_eq!(Order::decode(&bytes), Err(WireError::OrderType(99)));
    }
}
