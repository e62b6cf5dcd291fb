//! Swap ledger harvester
//!
//! Walks a token's signature history on a Solana node, classifies each swap
//! as a buy or sell by the router account's balance movement, and appends
//! the results to a resumable ledger (CSV or SQLite).

pub mod harvester;
