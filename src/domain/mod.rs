mod balance;
mod currency;
mod money;
mod mutation;
mod rate;

pub use balance::*;
pub use currency::*;
pub use money::*;
pub use mutation::*;
pub use rate::*;
