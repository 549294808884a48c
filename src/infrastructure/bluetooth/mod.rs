//! Bluetooth Module
//!
//! Keeps registered heart rate monitors connected and streaming.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                       Connector                          │
//! │  (Public API: register / unregister / start / stop)      │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ one mutex
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌────────────┐  ┌────────────┐  ┌────────────┐
//! │ Supervisor │  │  Registry  │  │ Connection │
//! │            │  │            │  │            │
//! │ - periodic │  │ - desired  │  │ - stages   │──▶ Protocol
//! │   retries  │  │ - live     │  │ - GATT ops │    (decoder)
//! └────────────┘  └────────────┘  └────────────┘
//!                                       ▲
//!                                       │ LinkEvent
//!                               ┌───────┴───────┐
//!                               │ GattTransport │
//!                               └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - GATT UUIDs and Heart Rate Measurement decoding
//! - [`transport`] - Radio stack boundary and link events
//! - [`connection`] - Per-link state machine
//! - [`registry`] - Desired and live sets
//! - [`supervisor`] - Periodic reconciliation
//! - [`service`] - Main connector
//! - [`simulator`] - In-process peripherals for the demo binary

pub mod connection;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod simulator;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

// Re-export main service for convenience
pub use service::{Connector, ConnectorConfig};
