pub mod trade_date;

pub use trade_date::{is_weekend, next_trade_date, previous_trade_date};
