//! Bank accounts and the authoritative balance ledger.
//!
//! This module contains the `Account` model and its database functions, the
//! ledger operations that keep each account's balance equal to the sum of
//! its transaction amounts, and whole-account JSON snapshots.

mod core;
mod ledger;
mod snapshot;

pub use core::{
    Account, create_account, create_account_table, delete_account, get_account, get_all_accounts,
    map_account_row,
};
pub use ledger::{
    adjust_balance, apply_to_balance, get_balance, recalculate_balance, reverse_from_balance,
};
pub use snapshot::{AccountSnapshot, export_account, import_account};

pub(crate) use ledger::set_balance;
