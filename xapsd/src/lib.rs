//! # xapsd
//!
//! Push-notification relay daemon for mail servers.
//!
//! A mail-server plugin connects over a local Unix socket and speaks a
//! line-oriented REGISTER/NOTIFY protocol; the daemon keeps the registration
//! state on disk and forwards notifications to the push gateway over one
//! persistent TLS connection.
//!
//! ## Architecture
//!
//! ```text
//! mail plugin ──unix socket──► CommandServer ──► RegistrationStore (JSON file)
//!                                   │
//!                                   └──enqueue──► DeliveryPipeline ──TLS──► gateway
//! ```
//!
//! The pipeline owns a FIFO queue and a connection state machine: while
//! connected it flushes up to 25 queued notifications every tick; on any
//! transport error it reconnects with capped backoff and keeps flushing.
//! Delivery is fire-and-forget; NOTIFY always succeeds at the command layer.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
