//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;

/// The ID of a bank account.
pub type AccountId = DatabaseId;

/// The ID of a one-time transaction.
pub type TransactionId = DatabaseId;

/// The ID of a recurring template.
pub type TemplateId = DatabaseId;
