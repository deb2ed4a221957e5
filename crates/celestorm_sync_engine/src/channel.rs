//! In-process broadcast channel.
//!
//! A [`Broadcaster`] stands in for the atomic broadcast layer: it assigns
//! rounds, seals packages into frames and fans them out to every
//! subscribed [`ChannelTransport`]. A [`Transmitter`] collects instructions
//! on the submitting side until they are broadcast as one package.

use crate::error::{SyncError, SyncResult, TransportError};
use crate::transport::{Delivery, PackageTransport};
use bytes::Bytes;
use celestorm_codec::{sign_package, PackageCodec, PackageSigner};
use celestorm_core::{Instruction, ObjectId, Package, Payload, Round};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

/// A message on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    /// A sealed package frame.
    Package {
        /// Round assigned by the broadcaster.
        round: Round,
        /// Encoded frame.
        bytes: Bytes,
    },
    /// No package will be sent for rounds before `resume_at`.
    Gap {
        /// Next round that may be sent.
        resume_at: Round,
    },
    /// The broadcaster dropped this subscriber.
    Disconnect(String),
}

struct Hub {
    next_round: Round,
    stride: u64,
    subscribers: Vec<UnboundedSender<Wire>>,
}

impl Hub {
    /// Sends to every live subscriber and forgets the closed ones.
    fn fan_out(&mut self, wire: &Wire) -> usize {
        self.subscribers.retain(|tx| tx.send(wire.clone()).is_ok());
        self.subscribers.len()
    }

    fn advance(&mut self) {
        self.next_round = Round::new(self.next_round.as_u64().saturating_add(self.stride));
    }
}

/// Assigns rounds and delivers sealed packages to every subscriber.
pub struct Broadcaster<O: ObjectId, P: Payload> {
    codec: Arc<dyn PackageCodec<O, P>>,
    signer: Option<Arc<dyn PackageSigner>>,
    hub: Mutex<Hub>,
}

impl<O: ObjectId, P: Payload> Broadcaster<O, P> {
    /// Creates a broadcaster whose first package gets `first_round`.
    ///
    /// Each following package lands `stride` rounds later; a stride of zero
    /// is treated as one.
    pub fn new(codec: Arc<dyn PackageCodec<O, P>>, first_round: Round, stride: u64) -> Self {
        Self {
            codec,
            signer: None,
            hub: Mutex::new(Hub {
                next_round: first_round,
                stride: stride.max(1),
                subscribers: Vec::new(),
            }),
        }
    }

    /// Signs every broadcast package with `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn PackageSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Opens a new subscription.
    ///
    /// A subscriber only sees packages broadcast after it subscribed.
    pub fn subscribe(&self) -> ChannelTransport<O, P> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut hub = self.hub.lock();
        hub.subscribers.push(tx);
        debug!(subscribers = hub.subscribers.len(), "subscriber added");
        ChannelTransport::new(rx)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut hub = self.hub.lock();
        hub.subscribers.retain(|tx| !tx.is_closed());
        hub.subscribers.len()
    }

    /// Round the next broadcast package will get.
    pub fn next_round(&self) -> Round {
        self.hub.lock().next_round
    }

    /// Seals `instructions` into the next round's package and delivers it.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the package cannot be encoded, or
    /// [`SyncError::ChannelClosed`] if no subscriber is left.
    pub fn broadcast(&self, instructions: Vec<Instruction<O, P>>) -> SyncResult<Round> {
        let mut hub = self.hub.lock();
        let round = hub.next_round;

        let mut package = Package::new(round, instructions);
        if let Some(signer) = &self.signer {
            package = sign_package(self.codec.as_ref(), signer.as_ref(), package)?;
        }
        let bytes = self.codec.encode(&package)?;

        debug!(%round, instructions = package.len(), len = bytes.len(), "broadcasting package");
        Self::deliver(&mut hub, Wire::Package { round, bytes })?;
        hub.advance();
        Ok(round)
    }

    /// Delivers a pre-encoded frame for the next round as is.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ChannelClosed`] if no subscriber is left.
    pub fn broadcast_frame(&self, bytes: impl Into<Bytes>) -> SyncResult<Round> {
        let mut hub = self.hub.lock();
        let round = hub.next_round;
        Self::deliver(
            &mut hub,
            Wire::Package {
                round,
                bytes: bytes.into(),
            },
        )?;
        hub.advance();
        Ok(round)
    }

    /// Skips ahead and tells subscribers where the stream resumes.
    ///
    /// A `resume_at` not after the next round only repeats the signal.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ChannelClosed`] if no subscriber is left.
    pub fn announce_gap(&self, resume_at: Round) -> SyncResult<()> {
        let mut hub = self.hub.lock();
        let resume_at = resume_at.max(hub.next_round);
        info!(%resume_at, "announcing round gap");
        Self::deliver(&mut hub, Wire::Gap { resume_at })?;
        hub.next_round = resume_at;
        Ok(())
    }

    /// Drops every subscriber with a disconnect notice.
    pub fn disconnect_all(&self, reason: &str) {
        let mut hub = self.hub.lock();
        warn!(subscribers = hub.subscribers.len(), reason, "disconnecting subscribers");
        hub.fan_out(&Wire::Disconnect(reason.to_string()));
        hub.subscribers.clear();
    }

    /// Ends the stream; subscribers see a clean end of stream.
    pub fn close(&self) {
        let mut hub = self.hub.lock();
        debug!(subscribers = hub.subscribers.len(), "closing broadcast");
        hub.subscribers.clear();
    }

    fn deliver(hub: &mut Hub, wire: Wire) -> SyncResult<()> {
        if hub.fan_out(&wire) == 0 {
            return Err(SyncError::ChannelClosed);
        }
        Ok(())
    }
}

impl<O: ObjectId, P: Payload> std::fmt::Debug for Broadcaster<O, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hub = self.hub.lock();
        f.debug_struct("Broadcaster")
            .field("next_round", &hub.next_round)
            .field("stride", &hub.stride)
            .field("subscribers", &hub.subscribers.len())
            .field("signed", &self.signer.is_some())
            .finish()
    }
}

/// Receiving end of a [`Broadcaster`] subscription.
///
/// `recv` blocks the calling thread, so it must not run inside an async
/// runtime.
pub struct ChannelTransport<O, P> {
    rx: UnboundedReceiver<Wire>,
    _marker: PhantomData<fn() -> (O, P)>,
}

impl<O, P> ChannelTransport<O, P> {
    fn new(rx: UnboundedReceiver<Wire>) -> Self {
        Self {
            rx,
            _marker: PhantomData,
        }
    }
}

impl<O: ObjectId, P: Payload> PackageTransport<O, P> for ChannelTransport<O, P> {
    fn recv(&mut self) -> Result<Option<Delivery<O, P>>, TransportError> {
        match self.rx.blocking_recv() {
            None => Ok(None),
            Some(Wire::Package { round, bytes }) => Ok(Some(Delivery::Encoded { round, bytes })),
            Some(Wire::Gap { resume_at }) => Ok(Some(Delivery::Gap { resume_at })),
            Some(Wire::Disconnect(reason)) => Err(TransportError::Disconnected(reason)),
        }
    }
}

/// Result of a successful [`Transmitter::transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmission {
    /// Round the package was broadcast in.
    pub round: Round,
    /// Number of instructions sent.
    pub sent: usize,
}

/// Collects instructions and submits them as one package.
pub struct Transmitter<O: ObjectId, P: Payload> {
    broadcaster: Arc<Broadcaster<O, P>>,
    pending: Mutex<Vec<Instruction<O, P>>>,
}

impl<O: ObjectId, P: Payload> Transmitter<O, P> {
    /// Creates a transmitter feeding `broadcaster`.
    pub fn new(broadcaster: Arc<Broadcaster<O, P>>) -> Self {
        Self {
            broadcaster,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Queues an instruction for the next transmission.
    pub fn push(&self, instruction: Instruction<O, P>) {
        self.pending.lock().push(instruction);
    }

    /// Number of queued instructions.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Broadcasts every queued instruction as one package.
    ///
    /// Returns `None` without broadcasting when nothing is queued. On error
    /// the instructions stay queued.
    ///
    /// # Errors
    ///
    /// Same as [`Broadcaster::broadcast`].
    pub fn transmit(&self) -> SyncResult<Option<Transmission>> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(None);
        }
        let sent = pending.len();
        let round = self.broadcaster.broadcast(pending.clone())?;
        pending.clear();
        Ok(Some(Transmission { round, sent }))
    }
}
