use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fractional digits kept for the base (token) leg
pub const BASE_PRECISION: u32 = 6;

/// Fractional digits kept for the quote leg
pub const QUOTE_PRECISION: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl From<Direction> for &'static str {
    fn from(dir: Direction) -> &'static str {
        match dir {
            Direction::Buy => "Buy",
            Direction::Sell => "Sell",
        }
    }
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Buy" => Some(Direction::Buy),
            "Sell" => Some(Direction::Sell),
            _ => None,
        }
    }
}

/// One token-balance snapshot entry from a transaction's metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBalance {
    pub account_index: u8,
    pub owner: Option<String>,
    pub mint: String,
    /// Human-unit amount as delivered by the node, e.g. "105.25"
    pub amount: String,
}

/// Transaction detail as fetched from the upstream source
#[derive(Debug, Clone, Default)]
pub struct RawTransaction {
    pub failed: bool,
    pub block_time: Option<i64>,
    pub pre_balances: Vec<TokenBalance>,
    pub post_balances: Vec<TokenBalance>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTransaction {
    pub signature: String,
    pub timestamp: i64,
    pub date: String,
    pub direction: Direction,
    pub base_amount: Decimal,
    pub quote_amount: Decimal,
}

impl ClassifiedTransaction {
    /// Columns in ledger order: Date, Timestamp, Type, base, quote, Txn
    pub fn row(&self) -> [String; 6] {
        [
            self.date.clone(),
            self.timestamp.to_string(),
            <&str>::from(self.direction).to_string(),
            format!("{:.6}", self.base_amount),
            format!("{:.9}", self.quote_amount),
            self.signature.clone(),
        ]
    }
}

/// Ledger header for the given symbols
pub fn ledger_header(base_symbol: &str, quote_symbol: &str) -> [String; 6] {
    [
        "Date".to_string(),
        "Timestamp".to_string(),
        "Type".to_string(),
        base_symbol.to_string(),
        quote_symbol.to_string(),
        "Txn".to_string(),
    ]
}

/// UTC rendering used for the `Date` column
pub fn render_date(timestamp: i64) -> Option<String> {
    DateTime::from_timestamp(timestamp, 0).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_render_date_utc() {
        assert_eq!(render_date(1700000000).as_deref(), Some("2023-11-14 22:13:20"));
        assert_eq!(render_date(0).as_deref(), Some("1970-01-01 00:00:00"));
    }

    #[test]
    fn test_row_fixed_precision() {
        let tx = ClassifiedTransaction {
            signature: "sig1".to_string(),
            timestamp: 1700000000,
            date: "2023-11-14 22:13:20".to_string(),
            direction: Direction::Sell,
            base_amount: Decimal::from_str("5").unwrap(),
            quote_amount: Decimal::from_str("0.25").unwrap(),
        };

        let row = tx.row();
        assert_eq!(row[2], "Sell");
        assert_eq!(row[3], "5.000000");
        assert_eq!(row[4], "0.250000000");
        assert_eq!(row[5], "sig1");
    }

    #[test]
    fn test_direction_round_trip_labels() {
        assert_eq!(Direction::parse(<&str>::from(Direction::Buy)), Some(Direction::Buy));
        assert_eq!(Direction::parse("BUY"), None);
    }
}
