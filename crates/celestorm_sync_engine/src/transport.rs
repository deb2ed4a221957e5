//! Transport layer abstraction for package delivery.

use crate::error::TransportError;
use bytes::Bytes;
use celestorm_core::{ObjectId, Package, Payload, Round};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// One item delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery<O, P> {
    /// A framed package the engine still has to decode.
    Encoded {
        /// Round the broadcast layer assigned to the package.
        round: Round,
        /// The frame.
        bytes: Bytes,
    },
    /// A package decoded by the transport itself.
    Decoded(Package<O, P>),
    /// No package will be delivered for any round before `resume_at`.
    Gap {
        /// First round that may still be delivered.
        resume_at: Round,
    },
}

impl<O: ObjectId, P: Payload> Delivery<O, P> {
    /// Round the delivery refers to.
    pub fn round(&self) -> Round {
        match self {
            Delivery::Encoded { round, .. } => *round,
            Delivery::Decoded(package) => package.round,
            Delivery::Gap { resume_at } => *resume_at,
        }
    }
}

/// An ordered source of packages.
///
/// Transports deliver packages in round order. `recv` blocks until the next
/// item is available; `Ok(None)` is a clean end of stream.
pub trait PackageTransport<O: ObjectId, P: Payload>: Send {
    /// Receives the next delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disconnected`] if the source is lost.
    fn recv(&mut self) -> Result<Option<Delivery<O, P>>, TransportError>;
}

type Script<O, P> = VecDeque<Result<Delivery<O, P>, TransportError>>;

/// A scripted transport for testing.
///
/// Clones share the same script, so a test can keep pushing deliveries
/// after handing a clone to the engine. An empty script reads as end of
/// stream.
pub struct MockTransport<O, P> {
    script: Arc<Mutex<Script<O, P>>>,
}

impl<O: ObjectId, P: Payload> MockTransport<O, P> {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queues a delivery.
    pub fn push(&self, delivery: Delivery<O, P>) {
        self.script.lock().push_back(Ok(delivery));
    }

    /// Queues a decoded package.
    pub fn push_package(&self, package: Package<O, P>) {
        self.push(Delivery::Decoded(package));
    }

    /// Queues a frame for `round`.
    pub fn push_encoded(&self, round: Round, bytes: impl Into<Bytes>) {
        self.push(Delivery::Encoded {
            round,
            bytes: bytes.into(),
        });
    }

    /// Queues a gap signal.
    pub fn push_gap(&self, resume_at: Round) {
        self.push(Delivery::Gap { resume_at });
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    /// Number of queued items.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

impl<O, P> Clone for MockTransport<O, P> {
    fn clone(&self) -> Self {
        Self {
            script: Arc::clone(&self.script),
        }
    }
}

impl<O: ObjectId, P: Payload> Default for MockTransport<O, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ObjectId, P: Payload> PackageTransport<O, P> for MockTransport<O, P> {
    fn recv(&mut self) -> Result<Option<Delivery<O, P>>, TransportError> {
        self.script.lock().pop_front().transpose()
    }
}
