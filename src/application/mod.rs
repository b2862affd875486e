// Application layer: balance mutation, exchange orchestration and the public
// service facade. Handlers only ever talk to `LedgerService`.

pub mod error;
mod exchange;
mod mutator;
mod service;

pub use error::*;
pub use exchange::*;
pub use mutator::*;
pub use service::*;
