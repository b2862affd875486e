pub mod export;

pub use export::{BalanceSnapshot, Exporter};
