mod account;
mod coins;
mod integrity;
mod ledger;
mod tournament;

pub use account::*;
pub use coins::*;
pub use integrity::*;
pub use ledger::*;
pub use tournament::*;
