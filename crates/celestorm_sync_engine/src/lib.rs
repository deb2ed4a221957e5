//! # Celestorm Sync Engine
//!
//! Package synchronisation engine for the Celestorm execution layer.
//!
//! This crate provides:
//! - Sync state machine (awaiting → validating → applying → committed / rolled back)
//! - Round cursor management and gap policies
//! - Signature checks on incoming packages
//! - Retry with exponential backoff for retry-safe store failures
//! - Transport abstraction with a scripted mock and an in-process broadcast channel
//!
//! ## Architecture
//!
//! The engine consumes a totally ordered stream of packages, one at a time:
//! 1. Discard rounds at or before the cursor
//! 2. Decode and authenticate the package
//! 3. Validate it against the current store state
//! 4. Apply it as a single atomic batch, or reject it untouched
//!
//! Every replica that processes the same stream from the same initial state
//! ends in the same state.
//!
//! ## Key Invariants
//!
//! - A package is applied entirely or not at all
//! - Rounds are processed in strictly increasing order
//! - Rejections never change object state
//! - A critical violation halts the engine; nothing is consumed afterwards

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod error;
mod outcome;
mod state;
mod transport;

pub use channel::{Broadcaster, ChannelTransport, Transmission, Transmitter, Wire};
pub use config::{EngineConfig, GapPolicy, RetryConfig};
pub use error::{SyncError, SyncResult, TransportError};
pub use outcome::{HaltReason, RoundOutcome};
pub use state::{EngineState, EngineStats, SyncEngine};
pub use transport::{Delivery, MockTransport, PackageTransport};
