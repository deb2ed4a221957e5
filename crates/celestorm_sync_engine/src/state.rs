//! Sync engine state machine.

use crate::config::{EngineConfig, GapPolicy};
use crate::error::{SyncError, SyncResult, TransportError};
use crate::outcome::{HaltReason, RoundOutcome};
use crate::transport::{Delivery, PackageTransport};
use celestorm_codec::{PackageCodec, PackageVerifier};
use celestorm_core::{
    plan_batch, MalformedReason, ObjectId, ObjectStore, Package, Payload, Precondition,
    RejectReason, Round, StoreResult, Validator, Verdict,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// The current state of the sync engine.
///
/// `Committed` and `RolledBack` describe the last processed package and
/// last until the engine starts waiting for the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Waiting for the transport to deliver the next package.
    AwaitingPackage,
    /// Checking a package against the store.
    Validating,
    /// Submitting a package's batch to the store.
    Applying,
    /// The last package was applied.
    Committed,
    /// The last package was rejected without touching the store.
    RolledBack,
    /// Terminal: the engine consumes no further packages.
    Halted,
}

/// Statistics about processed packages.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    /// Packages delivered by the transport, duplicates included.
    pub packages_received: u64,
    /// Packages applied.
    pub packages_committed: u64,
    /// Packages rejected.
    pub packages_rejected: u64,
    /// Duplicate or replayed packages ignored.
    pub packages_discarded: u64,
    /// Instructions applied across all committed packages.
    pub instructions_applied: u64,
    /// Store retries after retry-safe failures.
    pub apply_retries: u64,
    /// Round of the last committed package.
    pub last_committed_round: Option<Round>,
    /// When the last package finished processing.
    pub last_processed_at: Option<Instant>,
    /// Last error or halt message.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    last: Round,
    resume_at: Option<Round>,
}

/// Consumes an ordered package stream and applies it to an object store.
///
/// Packages are processed strictly one at a time, even when several
/// threads drive the same engine. Each one is either
/// committed as a single batch, rejected without touching the store, or
/// halts the engine for good.
///
/// # Example
///
/// ```rust
/// use celestorm_core::{Instruction, MemoryStore, ObjectStore, Package, Round};
/// use celestorm_sync_engine::{EngineConfig, MockTransport, RoundOutcome, SyncEngine};
/// use std::sync::Arc;
///
/// let store = Arc::new(MemoryStore::<u32, String>::new());
/// let transport = MockTransport::new();
/// transport.push_package(Package::new(Round::new(5), vec![Instruction::create(1, "a".to_string())]));
///
/// let engine = SyncEngine::new(EngineConfig::default(), store.clone(), transport).unwrap();
/// let outcome = engine.step().unwrap().unwrap();
/// assert!(matches!(outcome, RoundOutcome::Committed { .. }));
/// assert_eq!(store.revision_of(&1).unwrap(), Some(Round::new(5)));
/// ```
pub struct SyncEngine<O: ObjectId, P: Payload> {
    config: EngineConfig,
    store: Arc<dyn ObjectStore<O, P>>,
    transport: Mutex<Box<dyn PackageTransport<O, P>>>,
    codec: Option<Arc<dyn PackageCodec<O, P>>>,
    verifier: Option<Arc<dyn PackageVerifier<O, P>>>,
    validator: Validator<O, P>,
    state: RwLock<EngineState>,
    cursor: RwLock<Cursor>,
    halt: RwLock<Option<HaltReason<O>>>,
    stats: RwLock<EngineStats>,
    cancelled: AtomicBool,
    /// Held from admission to cursor advance.
    processing: Mutex<()>,
}

impl<O: ObjectId, P: Payload> SyncEngine<O, P> {
    /// Creates an engine resuming from the store's persisted cursor.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cursor cannot be read.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn ObjectStore<O, P>>,
        transport: impl PackageTransport<O, P> + 'static,
    ) -> SyncResult<Self> {
        let last = store.last_round()?;
        info!(%last, "sync engine resuming");
        Ok(Self {
            config,
            store,
            transport: Mutex::new(Box::new(transport)),
            codec: None,
            verifier: None,
            validator: Validator::new(),
            state: RwLock::new(EngineState::AwaitingPackage),
            cursor: RwLock::new(Cursor {
                last,
                resume_at: None,
            }),
            halt: RwLock::new(None),
            stats: RwLock::new(EngineStats::default()),
            cancelled: AtomicBool::new(false),
            processing: Mutex::new(()),
        })
    }

    /// Sets the codec used for encoded deliveries.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn PackageCodec<O, P>>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Sets the signature verifier.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn PackageVerifier<O, P>>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Registers an application precondition.
    #[must_use]
    pub fn with_precondition(mut self, precondition: Arc<dyn Precondition<O, P>>) -> Self {
        self.validator.add_precondition(precondition);
        self
    }

    /// Gets the current state.
    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> EngineStats {
        self.stats.read().clone()
    }

    /// Gets the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The store this engine applies to.
    pub fn store(&self) -> &Arc<dyn ObjectStore<O, P>> {
        &self.store
    }

    /// Last round committed or rejected.
    pub fn last_round(&self) -> Round {
        self.cursor.read().last
    }

    /// Why the engine halted, if it did.
    pub fn halt_reason(&self) -> Option<HaltReason<O>> {
        self.halt.read().clone()
    }

    /// Returns true once the engine has halted.
    pub fn is_halted(&self) -> bool {
        self.halt.read().is_some()
    }

    /// Requests cancellation; honoured before the next receive.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancelled flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn check_halted(&self) -> SyncResult<()> {
        match &*self.halt.read() {
            Some(reason) => Err(SyncError::Halted(reason.to_string())),
            None => Ok(()),
        }
    }

    fn set_state(&self, state: EngineState) {
        *self.state.write() = state;
    }

    /// Receives and processes exactly one package.
    ///
    /// Gap signals are absorbed while waiting. Returns `Ok(None)` at a clean
    /// end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Halted`] if the engine halted earlier,
    /// [`SyncError::Cancelled`] if cancellation was requested, or the
    /// transport error if the transport disconnected.
    pub fn step(&self) -> SyncResult<Option<RoundOutcome<O>>> {
        loop {
            self.check_halted()?;
            self.check_cancelled()?;
            self.set_state(EngineState::AwaitingPackage);

            let received = self.transport.lock().recv();
            let delivery = match received {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    debug!("transport reached end of stream");
                    return Ok(None);
                }
                Err(err) => {
                    let _processing = self.processing.lock();
                    return self.on_transport_error(err).map(Some);
                }
            };

            let _processing = self.processing.lock();
            if let Some(outcome) = self.dispatch(delivery)? {
                return Ok(Some(outcome));
            }
        }
    }

    /// Processes packages until end of stream or halt.
    ///
    /// Returns the halt reason if the engine halted, `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::step`].
    pub fn run(&self) -> SyncResult<Option<HaltReason<O>>> {
        self.run_with(|_| {})
    }

    /// Like [`SyncEngine::run`], reporting every outcome to `on_outcome`.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::step`].
    pub fn run_with(
        &self,
        mut on_outcome: impl FnMut(&RoundOutcome<O>),
    ) -> SyncResult<Option<HaltReason<O>>> {
        while let Some(outcome) = self.step()? {
            on_outcome(&outcome);
            if let RoundOutcome::Halted(reason) = outcome {
                return Ok(Some(reason));
            }
        }
        Ok(None)
    }

    /// Processes a package handed over directly.
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::process_delivery`].
    pub fn process_package(&self, package: Package<O, P>) -> SyncResult<RoundOutcome<O>> {
        let round = package.round;
        self.process_delivery(Delivery::Decoded(package))?
            .ok_or_else(|| SyncError::Halted(format!("package for {round} produced no outcome")))
    }

    /// Processes one delivery without going through the transport.
    ///
    /// Returns `None` for gap signals, which only move the expected round.
    /// Concurrent callers are served one delivery at a time.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Halted`] if the engine halted earlier, or
    /// [`SyncError::NoCodec`] for a frame when no codec is configured.
    pub fn process_delivery(&self, delivery: Delivery<O, P>) -> SyncResult<Option<RoundOutcome<O>>> {
        let _processing = self.processing.lock();
        self.dispatch(delivery)
    }

    /// Processes one delivery; the caller holds `processing`.
    fn dispatch(&self, delivery: Delivery<O, P>) -> SyncResult<Option<RoundOutcome<O>>> {
        self.check_halted()?;

        let round = delivery.round();
        if let Delivery::Gap { resume_at } = delivery {
            self.note_gap(resume_at);
            return Ok(None);
        }

        self.stats.write().packages_received += 1;
        if let Some(outcome) = self.admit(round) {
            return Ok(Some(outcome));
        }

        let package = match delivery {
            Delivery::Encoded { bytes, .. } => {
                let codec = self.codec.as_ref().ok_or(SyncError::NoCodec)?;
                codec
                    .decode(round, &bytes)
                    .map_err(|e| MalformedReason::Undecodable(e.to_string()))
            }
            Delivery::Decoded(package) => Ok(package),
            Delivery::Gap { .. } => return Ok(None),
        };
        Ok(Some(self.process(round, package)))
    }

    fn note_gap(&self, resume_at: Round) {
        let mut cursor = self.cursor.write();
        if resume_at > cursor.last {
            debug!(%resume_at, last = %cursor.last, "transport signalled a round gap");
            cursor.resume_at = Some(resume_at);
        }
    }

    /// Decides whether a round may enter validation.
    fn admit(&self, round: Round) -> Option<RoundOutcome<O>> {
        let cursor = *self.cursor.read();
        if round <= cursor.last {
            debug!(%round, last = %cursor.last, "discarding replayed round");
            self.stats.write().packages_discarded += 1;
            return Some(RoundOutcome::Discarded { round });
        }

        if self.config.gap_policy == GapPolicy::RequireSignal {
            let expected = cursor.resume_at.unwrap_or_else(|| cursor.last.next());
            if round != expected {
                return Some(self.halt_with(HaltReason::GapViolation {
                    expected,
                    received: round,
                }));
            }
        }
        None
    }

    fn process(
        &self,
        round: Round,
        package: Result<Package<O, P>, MalformedReason>,
    ) -> RoundOutcome<O> {
        let package = match package {
            Ok(package) => package,
            Err(reason) => return self.malformed(round, reason, None),
        };

        if let Some(reason) = self.authenticate(&package) {
            return self.reject(round, RejectReason::AuthenticationFailure(reason), None);
        }

        self.set_state(EngineState::Validating);
        let verdict = match self.validator.validate(&package, self.store.as_ref()) {
            Ok(verdict) => verdict,
            Err(err) => {
                return self.halt_with(HaltReason::StoreFailure {
                    round,
                    message: err.to_string(),
                })
            }
        };

        match verdict {
            Verdict::Applicable(checked) => {
                self.set_state(EngineState::Applying);
                let batch = plan_batch(round, &checked);
                if let Err(err) = self.with_retry(round, || self.store.apply_batch(&batch)) {
                    return self.halt_with(HaltReason::StoreFailure {
                        round,
                        message: err.to_string(),
                    });
                }
                self.commit(round, package.oids())
            }
            Verdict::Rejected {
                reason: RejectReason::MalformedPackage(reason),
                index,
            } => self.malformed(round, reason, index),
            Verdict::Rejected { reason, index } => self.reject(round, reason, index),
            Verdict::CriticalViolation { reason, index } => {
                self.halt_with(HaltReason::Critical {
                    round,
                    index,
                    reason,
                })
            }
        }
    }

    /// Returns a failure message if the package does not authenticate.
    fn authenticate(&self, package: &Package<O, P>) -> Option<String> {
        match (&self.verifier, &package.signature) {
            (Some(verifier), Some(signature)) => {
                if verifier.verify(package, signature) {
                    None
                } else {
                    Some("signature does not verify against any trusted key".to_string())
                }
            }
            (Some(_), None) if self.config.require_signatures => {
                Some("package is not signed".to_string())
            }
            (None, _) if self.config.require_signatures => {
                Some("signatures are required but no verifier is configured".to_string())
            }
            _ => None,
        }
    }

    fn malformed(
        &self,
        round: Round,
        reason: MalformedReason,
        index: Option<usize>,
    ) -> RoundOutcome<O> {
        if self.config.malformed_is_fatal {
            return self.halt_with(HaltReason::MalformedInput { round, reason });
        }
        self.reject(round, RejectReason::MalformedPackage(reason), index)
    }

    fn reject(&self, round: Round, reason: RejectReason<O>, index: Option<usize>) -> RoundOutcome<O> {
        warn!(%round, ?index, %reason, "package rejected");

        if self.config.persist_rejected_rounds {
            if let Err(err) = self.with_retry(round, || self.store.mark_round(round)) {
                return self.halt_with(HaltReason::StoreFailure {
                    round,
                    message: err.to_string(),
                });
            }
        }

        self.advance(round);
        self.set_state(EngineState::RolledBack);
        {
            let mut stats = self.stats.write();
            stats.packages_rejected += 1;
            stats.last_processed_at = Some(Instant::now());
            stats.last_error = Some(reason.to_string());
        }
        RoundOutcome::Rejected {
            round,
            reason,
            index,
        }
    }

    fn commit(&self, round: Round, touched: Vec<O>) -> RoundOutcome<O> {
        self.advance(round);
        self.set_state(EngineState::Committed);
        {
            let mut stats = self.stats.write();
            stats.packages_committed += 1;
            stats.instructions_applied += touched.len() as u64;
            stats.last_committed_round = Some(round);
            stats.last_processed_at = Some(Instant::now());
        }
        debug!(%round, instructions = touched.len(), "package committed");
        RoundOutcome::Committed { round, touched }
    }

    fn advance(&self, round: Round) {
        let mut cursor = self.cursor.write();
        cursor.last = round;
        cursor.resume_at = None;
    }

    fn halt_with(&self, reason: HaltReason<O>) -> RoundOutcome<O> {
        error!(%reason, "sync engine halted");
        self.set_state(EngineState::Halted);
        *self.halt.write() = Some(reason.clone());
        {
            let mut stats = self.stats.write();
            stats.last_processed_at = Some(Instant::now());
            stats.last_error = Some(reason.to_string());
        }
        RoundOutcome::Halted(reason)
    }

    fn on_transport_error(&self, err: TransportError) -> SyncResult<RoundOutcome<O>> {
        self.stats.write().last_error = Some(err.to_string());
        if self.config.halt_on_disconnect {
            let TransportError::Disconnected(message) = err;
            return Ok(self.halt_with(HaltReason::Disconnected(message)));
        }
        warn!(error = %err, "transport disconnected");
        Err(err.into())
    }

    /// Runs a store write, retrying failures the backend declares retry-safe.
    fn with_retry(&self, round: Round, write: impl Fn() -> StoreResult<()>) -> StoreResult<()> {
        let retry = &self.config.apply_retry;
        let attempts = retry.attempts();
        let mut attempt = 0;
        loop {
            if attempt > 0 {
                std::thread::sleep(retry.delay_for_attempt(attempt));
                self.stats.write().apply_retries += 1;
            }
            match write() {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retry_safe() && attempt + 1 < attempts => {
                    warn!(%round, attempt, error = %err, "retrying store write");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<O: ObjectId, P: Payload> std::fmt::Debug for SyncEngine<O, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("state", &self.state())
            .field("last_round", &self.last_round())
            .field("halted", &self.is_halted())
            .finish_non_exhaustive()
    }
}
