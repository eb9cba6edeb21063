// Thin re-export module: blocks, the ledger that chains them, and the
// link/fingerprint checks live in `blockchain/`.

pub mod block;
pub mod ledger;
pub mod validation;

pub use block::*;
pub use ledger::*;
pub use validation::*;
