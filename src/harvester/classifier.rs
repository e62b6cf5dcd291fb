use crate::harvester::errors::SkipReason;
use crate::harvester::types::{
    render_date, ClassifiedTransaction, Direction, RawTransaction, TokenBalance, BASE_PRECISION,
    QUOTE_PRECISION,
};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Net balance movement of the router for one mint
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RouterDelta {
    pub quote: Decimal,
    pub base: Decimal,
}

/// Amount strings that fail to parse count as zero
pub fn parse_amount(amount: &str) -> Decimal {
    Decimal::from_str(amount.trim()).unwrap_or(Decimal::ZERO)
}

/// Magnitude truncated toward zero, never overstating the amount
pub fn truncate_magnitude(value: Decimal, digits: u32) -> Decimal {
    value
        .abs()
        .round_dp_with_strategy(digits, RoundingStrategy::ToZero)
        .normalize()
}

fn matching_post<'a>(pre: &TokenBalance, post: &'a [TokenBalance]) -> Option<&'a TokenBalance> {
    let same_holding = |p: &&TokenBalance| p.owner == pre.owner && p.mint == pre.mint;

    post.iter()
        .filter(same_holding)
        .find(|p| p.account_index == pre.account_index)
        .or_else(|| post.iter().find(same_holding))
}

/// Signed change of the router's quote and base holdings across the transaction
pub fn router_delta(raw: &RawTransaction, quote_mint: &str, base_mint: &str, router: &str) -> RouterDelta {
    let mut delta = RouterDelta::default();

    for pre in raw
        .pre_balances
        .iter()
        .filter(|b| b.owner.as_deref() == Some(router))
    {
        let post = match matching_post(pre, &raw.post_balances) {
            Some(post) => post,
            None => continue,
        };

        let change = parse_amount(&post.amount) - parse_amount(&pre.amount);

        if pre.mint == quote_mint {
            delta.quote += change;
        } else if pre.mint == base_mint {
            delta.base += change;
        }
    }

    delta
}

/// Classify one transaction against the router account.
///
/// The router's quote balance decides direction: quote flowing into the
/// router means the trader paid quote for base (Buy), quote flowing out
/// means the trader received quote (Sell). When only the base leg moved,
/// the base flow decides instead (base leaving the router is a Buy).
///
/// Amounts are truncated toward zero to 6 (base) and 9 (quote) digits.
pub fn classify(
    raw: &RawTransaction,
    signature: &str,
    quote_mint: &str,
    base_mint: &str,
    router: &str,
) -> Result<ClassifiedTransaction, SkipReason> {
    if raw.failed {
        return Err(SkipReason::ExecutionFailure);
    }

    let delta = router_delta(raw, quote_mint, base_mint, router);

    let quote_amount = truncate_magnitude(delta.quote, QUOTE_PRECISION);
    let base_amount = truncate_magnitude(delta.base, BASE_PRECISION);

    if quote_amount.is_zero() && base_amount.is_zero() {
        return Err(SkipReason::NoRelevantDelta);
    }

    let direction = if delta.quote > Decimal::ZERO {
        Direction::Buy
    } else if delta.quote < Decimal::ZERO {
        Direction::Sell
    } else if delta.base < Decimal::ZERO {
        Direction::Buy
    } else {
        Direction::Sell
    };

    let timestamp = raw.block_time.ok_or(SkipReason::MissingTimestamp)?;
    let date = render_date(timestamp).ok_or(SkipReason::MissingTimestamp)?;

    Ok(ClassifiedTransaction {
        signature: signature.to_string(),
        timestamp,
        date,
        direction,
        base_amount,
        quote_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE: &str = "So11111111111111111111111111111111111111112";
    const BASE: &str = "TokenMintABC123";
    const ROUTER: &str = "RouterAuthority111";

    fn balance(index: u8, owner: &str, mint: &str, amount: &str) -> TokenBalance {
        TokenBalance {
            account_index: index,
            owner: Some(owner.to_string()),
            mint: mint.to_string(),
            amount: amount.to_string(),
        }
    }

    fn swap(quote: (&str, &str), base: (&str, &str)) -> RawTransaction {
        RawTransaction {
            failed: false,
            block_time: Some(1700000000),
            pre_balances: vec![
                balance(1, ROUTER, QUOTE, quote.0),
                balance(2, ROUTER, BASE, base.0),
            ],
            post_balances: vec![
                balance(1, ROUTER, QUOTE, quote.1),
                balance(2, ROUTER, BASE, base.1),
            ],
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_buy_scenario() {
        let raw = swap(("100", "105"), ("50", "45"));
        let tx = classify(&raw, "sig1", QUOTE, BASE, ROUTER).unwrap();

        assert_eq!(tx.direction, Direction::Buy);
        assert_eq!(tx.quote_amount, dec("5"));
        assert_eq!(tx.base_amount, dec("5"));
        assert_eq!(tx.timestamp, 1700000000);
        assert_eq!(tx.date, "2023-11-14 22:13:20");

        let row = tx.row();
        assert_eq!(row[3], "5.000000");
        assert_eq!(row[4], "5.000000000");
    }

    #[test]
    fn test_sell_direction() {
        let raw = swap(("12.5", "10.25"), ("1000", "1300.5"));
        let tx = classify(&raw, "sig2", QUOTE, BASE, ROUTER).unwrap();

        assert_eq!(tx.direction, Direction::Sell);
        assert_eq!(tx.quote_amount, dec("2.25"));
        assert_eq!(tx.base_amount, dec("300.5"));
    }

    #[test]
    fn test_unchanged_balances_not_relevant() {
        let raw = swap(("100", "100"), ("50", "50.000"));
        assert_eq!(
            classify(&raw, "sig3", QUOTE, BASE, ROUTER),
            Err(SkipReason::NoRelevantDelta)
        );
    }

    #[test]
    fn test_truncates_not_rounds() {
        let raw = swap(("1", "1.0000000019"), ("2", "1.0000009"));
        let tx = classify(&raw, "sig4", QUOTE, BASE, ROUTER).unwrap();

        assert_eq!(tx.quote_amount, dec("0.000000001"));
        assert_eq!(tx.base_amount, dec("0.999999"));
    }

    #[test]
    fn test_truncation_idempotent() {
        for raw in ["1.23456789", "-0.0000019", "42", "0.999999999999"] {
            let once = truncate_magnitude(dec(raw), 6);
            assert_eq!(truncate_magnitude(once, 6), once);
            assert!(once >= Decimal::ZERO);
        }
    }

    #[test]
    fn test_other_owners_ignored() {
        let mut raw = swap(("100", "100"), ("50", "50"));
        raw.pre_balances.push(balance(5, "SomeTrader", QUOTE, "10"));
        raw.post_balances.push(balance(5, "SomeTrader", QUOTE, "3"));

        assert_eq!(
            classify(&raw, "sig5", QUOTE, BASE, ROUTER),
            Err(SkipReason::NoRelevantDelta)
        );
    }

    #[test]
    fn test_unparseable_amount_counts_as_zero() {
        let raw = swap(("garbage", "7"), ("50", "50"));
        let tx = classify(&raw, "sig6", QUOTE, BASE, ROUTER).unwrap();

        assert_eq!(tx.direction, Direction::Buy);
        assert_eq!(tx.quote_amount, dec("7"));
    }

    #[test]
    fn test_missing_timestamp_dropped() {
        let mut raw = swap(("100", "105"), ("50", "45"));
        raw.block_time = None;

        assert_eq!(
            classify(&raw, "sig7", QUOTE, BASE, ROUTER),
            Err(SkipReason::MissingTimestamp)
        );
    }

    #[test]
    fn test_failed_transaction_dropped() {
        let mut raw = swap(("100", "105"), ("50", "45"));
        raw.failed = true;

        assert_eq!(
            classify(&raw, "sig8", QUOTE, BASE, ROUTER),
            Err(SkipReason::ExecutionFailure)
        );
    }

    #[test]
    fn test_base_only_movement_uses_base_flow() {
        let raw = swap(("100", "100"), ("50", "40"));
        let tx = classify(&raw, "sig9", QUOTE, BASE, ROUTER).unwrap();

        assert_eq!(tx.direction, Direction::Buy);
        assert!(tx.quote_amount.is_zero());
        assert_eq!(tx.base_amount, dec("10"));
    }

    #[test]
    fn test_post_matched_by_account_index() {
        let raw = RawTransaction {
            failed: false,
            block_time: Some(1700000000),
            pre_balances: vec![
                balance(1, ROUTER, QUOTE, "100"),
                balance(3, ROUTER, QUOTE, "20"),
            ],
            post_balances: vec![
                balance(3, ROUTER, QUOTE, "20"),
                balance(1, ROUTER, QUOTE, "90"),
            ],
        };

        let tx = classify(&raw, "sig10", QUOTE, BASE, ROUTER).unwrap();
        assert_eq!(tx.direction, Direction::Sell);
        assert_eq!(tx.quote_amount, dec("10"));
    }
}
