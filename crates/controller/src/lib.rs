//! Event fan-out and the reconcile loop that feeds the change-revision resolver.

#![forbid(unsafe_code)]

pub mod broadcast;
mod controller;

pub use broadcast::{Broadcaster, DeliveryPolicy, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use controller::{Controller, ControllerStats, DEFAULT_RECONCILE_TIMEOUT};
