pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod io;
pub mod logging;
pub mod rates;
pub mod storage;

pub use application::{LedgerError, LedgerService};
pub use domain::*;
pub use storage::BalanceStore;
