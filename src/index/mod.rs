//! The two views of the subscription index.
//!
//! - [`ChannelIndex`]: channel id → `alias -> Subscription`
//! - [`ReverseIndex`]: [`ReverseKey`](crate::types::ReverseKey) → `channel id -> events`
//!
//! Each entry is one KV value. Neither view knows about the other; keeping
//! them consistent is the job of the [`SubscriptionManager`](crate::SubscriptionManager).

mod channel;
mod locks;
mod reverse;

pub use channel::ChannelIndex;
pub use locks::{KeyLocks, DEFAULT_STRIPES};
pub use reverse::ReverseIndex;
