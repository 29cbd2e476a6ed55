//! One-time transaction management.
//!
//! This module contains the `Transaction` model and `TransactionBuilder`,
//! plus the database functions for storing, querying and managing
//! transactions. Every mutation also updates the owning account's balance.

mod core;

pub use core::{
    Transaction, TransactionBuilder, TransactionUpdate, create_transaction,
    create_transaction_table, delete_transaction, get_account_transactions, get_transaction,
    map_transaction_row, update_transaction,
};

pub(crate) use core::{
    count_linked_transactions, get_linked_transactions, get_linked_transactions_after,
    insert_transaction, restore_transaction,
};
