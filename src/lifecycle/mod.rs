//! The order lifecycle manager.
//!
//! [`OrderLifecycleService`] runs as its own task and owns one active order at
//! a time. The presentation layer drives it through a [`LifecycleClient`] and
//! observes it through the snapshot channel returned by
//! [`LifecycleClient::subscribe`].

pub mod client;
pub mod error;
pub mod messages;
pub mod poller;
pub mod presentation;
pub mod service;

pub use client::LifecycleClient;
pub use presentation::StatusBanner;
pub use service::OrderLifecycleService;
