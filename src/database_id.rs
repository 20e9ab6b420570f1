//! Database ID type definitions.

/// Alias for the integer type used for mapping to database IDs.
pub type DatabaseId = i64;
pub type TransactionId = DatabaseId;
pub type RuleId = DatabaseId;
pub type CategoryId = DatabaseId;
pub type ProjectId = DatabaseId;
pub type IdeaId = DatabaseId;
