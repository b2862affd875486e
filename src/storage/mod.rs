mod error;
mod store;

pub use error::*;
pub use store::*;

/// SQL migration for balances and the mutation journal
pub const MIGRATION_001_BALANCES: &str = include_str!("migrations/001_balances.sql");
