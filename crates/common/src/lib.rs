//! Cancellation helpers shared across scalarweb crates.

pub mod interrupt;

pub use interrupt::{CancellationToken, Interrupted, check_interrupt, run_until_cancelled};
