#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Converge EventBus
//!
//! A generic publish/subscribe bus built on `tokio::sync::broadcast`.
//!
//! ## Backpressure
//!
//! Publishing never blocks. Each subscriber has a bounded buffer of
//! `capacity` events; when a subscriber falls further behind than that, the
//! oldest events are dropped for that subscriber only and the loss is
//! reported through [`Subscription::lagged`] and a `warn!` event.
//!
//! ## Ordering
//!
//! Every subscriber sees events in the order they were published. Callers
//! that publish from several threads and need a per-key order must serialize
//! their own publishes for that key.
//!
//! ## History
//!
//! The bus can keep an append-only, optionally bounded log of everything it
//! published ([`EventBus::history`]) for inspection and snapshotting.

mod bus;
mod subscription;

pub use bus::EventBus;
pub use subscription::Subscription;
