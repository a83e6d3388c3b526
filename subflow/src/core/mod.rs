//! Core domain model types for subflow.
//!
//! This module contains the fundamental types shared by every other module:
//! - The [`Message`] value that flows from source through stages to sink
//! - The [`TaskState`] lifecycle of a subscription's pump task

mod message;
mod status;

pub use message::Message;
pub use status::TaskState;
