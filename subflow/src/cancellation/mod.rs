//! Cooperative cancellation.
//!
//! Every subscription owns a [`CancellationToken`] derived from its runner's
//! token. Pump tasks race each suspension point against
//! [`CancellationToken::cancelled`].

mod token;

pub use token::{CancelCallback, CancellationToken};
