use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use solana_instruction::Instruction;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use tokio::sync::watch;
use tracing::debug;

use crate::config::SendOptions;
use crate::error::{Result, TransactionError};
use crate::helper::{PrepareAndSendOptions, TransactionHelper};
use crate::message::BlockhashLifetime;
use crate::prepare::{PrepareRequest, PreparedTransaction};

/// Progress of an async operation.
#[derive(Debug, Clone, Default)]
pub enum AsyncState<T> {
    #[default]
    Idle,
    Loading,
    Success(T),
    Error(TransactionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncStatus {
    Idle,
    Loading,
    Success,
    Error,
}

impl<T> AsyncState<T> {
    pub fn status(&self) -> AsyncStatus {
        match self {
            Self::Idle => AsyncStatus::Idle,
            Self::Loading => AsyncStatus::Loading,
            Self::Success(_) => AsyncStatus::Success,
            Self::Error(_) => AsyncStatus::Error,
        }
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&TransactionError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}

/// A lifetime together with the moment it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifetimeSnapshot {
    pub value: BlockhashLifetime,
    pub updated_at: Instant,
}

impl LifetimeSnapshot {
    pub fn now(value: BlockhashLifetime) -> Self {
        Self {
            value,
            updated_at: Instant::now(),
        }
    }
}

/// Accumulates instructions and drives prepare and send through observable
/// async states.
///
/// Every slice of state lives in its own `watch` channel. Overlapping calls are
/// not serialized; the last write wins. A prepare or send that was started before
/// the instruction list changed does not record its outcome.
pub struct InstructionPoolController {
    helper: TransactionHelper,
    max_lifetime_age: Duration,
    instructions: watch::Sender<Vec<Instruction>>,
    cached_lifetime: watch::Sender<Option<LifetimeSnapshot>>,
    prepared: watch::Sender<Option<PreparedTransaction>>,
    prepare_state: watch::Sender<AsyncState<PreparedTransaction>>,
    send_state: watch::Sender<AsyncState<Signature>>,
    generation: AtomicU64,
}

impl InstructionPoolController {
    pub fn new(helper: TransactionHelper) -> Self {
        let max_lifetime_age = helper.config().lifetime_max_age();
        Self {
            helper,
            max_lifetime_age,
            instructions: watch::Sender::new(Vec::new()),
            cached_lifetime: watch::Sender::new(None),
            prepared: watch::Sender::new(None),
            prepare_state: watch::Sender::new(AsyncState::Idle),
            send_state: watch::Sender::new(AsyncState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_max_lifetime_age(mut self, max_lifetime_age: Duration) -> Self {
        self.max_lifetime_age = max_lifetime_age;
        self
    }

    pub fn helper(&self) -> &TransactionHelper {
        &self.helper
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.prepared.send_replace(None);
        self.prepare_state.send_replace(AsyncState::Idle);
        self.send_state.send_replace(AsyncState::Idle);
    }

    pub fn add(&self, instruction: Instruction) {
        self.instructions.send_modify(|list| list.push(instruction));
        self.invalidate();
    }

    pub fn add_many(&self, instructions: impl IntoIterator<Item = Instruction>) {
        self.instructions.send_modify(|list| list.extend(instructions));
        self.invalidate();
    }

    /// Removes the instruction at `index`. An out-of-range index leaves the pool
    /// untouched.
    pub fn remove(&self, index: usize) -> Option<Instruction> {
        let mut removed = None;
        self.instructions.send_if_modified(|list| {
            if index < list.len() {
                removed = Some(list.remove(index));
                true
            } else {
                false
            }
        });
        if removed.is_some() {
            self.invalidate();
        }
        removed
    }

    pub fn replace(&self, instructions: Vec<Instruction>) {
        self.instructions.send_replace(instructions);
        self.invalidate();
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    /// Clears the pool and forgets the cached lifetime.
    pub fn reset(&self) {
        self.cached_lifetime.send_replace(None);
        self.clear();
    }

    pub fn instructions(&self) -> Vec<Instruction> {
        self.instructions.borrow().clone()
    }

    pub fn prepared(&self) -> Option<PreparedTransaction> {
        self.prepared.borrow().clone()
    }

    pub fn prepare_state(&self) -> AsyncState<PreparedTransaction> {
        self.prepare_state.borrow().clone()
    }

    pub fn send_state(&self) -> AsyncState<Signature> {
        self.send_state.borrow().clone()
    }

    pub fn subscribe_instructions(&self) -> watch::Receiver<Vec<Instruction>> {
        self.instructions.subscribe()
    }

    pub fn subscribe_prepared(&self) -> watch::Receiver<Option<PreparedTransaction>> {
        self.prepared.subscribe()
    }

    pub fn subscribe_prepare_state(&self) -> watch::Receiver<AsyncState<PreparedTransaction>> {
        self.prepare_state.subscribe()
    }

    pub fn subscribe_send_state(&self) -> watch::Receiver<AsyncState<Signature>> {
        self.send_state.subscribe()
    }

    pub fn reset_prepare_state(&self) {
        self.prepare_state.send_replace(AsyncState::Idle);
    }

    pub fn reset_send_state(&self) {
        self.send_state.send_replace(AsyncState::Idle);
    }

    pub fn set_latest_lifetime(&self, snapshot: LifetimeSnapshot) {
        self.cached_lifetime.send_replace(Some(snapshot));
    }

    pub fn max_lifetime_age(&self) -> Duration {
        self.max_lifetime_age
    }

    /// The cached lifetime, if it is younger than the maximum age.
    pub fn cached_lifetime(&self) -> Option<BlockhashLifetime> {
        self.cached_lifetime_at(Instant::now())
    }

    fn cached_lifetime_at(&self, now: Instant) -> Option<BlockhashLifetime> {
        let snapshot = (*self.cached_lifetime.borrow())?;
        let age = now.saturating_duration_since(snapshot.updated_at);
        (age <= self.max_lifetime_age).then_some(snapshot.value)
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn with_pool_defaults(&self, mut request: PrepareRequest) -> Result<PrepareRequest> {
        if request.instructions.is_empty() {
            request.instructions = self.instructions();
        }
        if request.instructions.is_empty() {
            return Err(TransactionError::validation(
                "add at least one instruction before preparing a transaction",
            ));
        }
        if request.lifetime.is_none() {
            request.lifetime = self.cached_lifetime();
        }
        Ok(request)
    }

    fn prepared_or(
        &self,
        prepared: Option<&PreparedTransaction>,
        action: &str,
    ) -> Result<PreparedTransaction> {
        prepared
            .cloned()
            .or_else(|| self.prepared())
            .ok_or_else(|| {
                TransactionError::validation(format!("prepare a transaction before {action}"))
            })
    }

    pub async fn prepare(&self, request: PrepareRequest) -> Result<PreparedTransaction> {
        let request = match self.with_pool_defaults(request) {
            Ok(request) => request,
            Err(error) => {
                self.prepare_state
                    .send_replace(AsyncState::Error(error.clone()));
                return Err(error);
            }
        };
        let generation = self.generation();
        self.prepare_state.send_replace(AsyncState::Loading);
        let result = self.helper.prepare(request).await;
        if generation != self.generation() {
            debug!("instruction pool changed while preparing, discarding result");
            return result;
        }
        match result {
            Ok(prepared) => {
                self.prepared.send_replace(Some(prepared.clone()));
                self.prepare_state
                    .send_replace(AsyncState::Success(prepared.clone()));
                Ok(prepared)
            }
            Err(error) => {
                self.prepare_state
                    .send_replace(AsyncState::Error(error.clone()));
                Err(error)
            }
        }
    }

    pub async fn sign(
        &self,
        prepared: Option<&PreparedTransaction>,
        options: &SendOptions,
    ) -> Result<VersionedTransaction> {
        let prepared = self.prepared_or(prepared, "signing")?;
        self.helper.sign(&prepared, options).await
    }

    pub async fn to_wire(
        &self,
        prepared: Option<&PreparedTransaction>,
        options: &SendOptions,
    ) -> Result<String> {
        let prepared = self.prepared_or(prepared, "signing")?;
        self.helper.to_wire(&prepared, options).await
    }

    pub async fn send(
        &self,
        prepared: Option<&PreparedTransaction>,
        options: &SendOptions,
    ) -> Result<Signature> {
        let prepared = match self.prepared_or(prepared, "sending") {
            Ok(prepared) => prepared,
            Err(error) => {
                self.send_state.send_replace(AsyncState::Error(error.clone()));
                return Err(error);
            }
        };
        self.track_send(self.helper.send(&prepared, options)).await
    }

    pub async fn prepare_and_send(
        &self,
        request: PrepareRequest,
        options: PrepareAndSendOptions,
    ) -> Result<Signature> {
        let request = match self.with_pool_defaults(request) {
            Ok(request) => request,
            Err(error) => {
                self.send_state.send_replace(AsyncState::Error(error.clone()));
                return Err(error);
            }
        };
        self.track_send(self.helper.prepare_and_send(request, options))
            .await
    }

    async fn track_send(
        &self,
        operation: impl std::future::Future<Output = Result<Signature>>,
    ) -> Result<Signature> {
        let generation = self.generation();
        self.send_state.send_replace(AsyncState::Loading);
        let result = operation.await;
        if generation != self.generation() {
            debug!("instruction pool changed while sending, not recording result");
            return result;
        }
        match &result {
            Ok(signature) => {
                debug!(%signature, "pool transaction sent");
                self.send_state.send_replace(AsyncState::Success(*signature));
            }
            Err(error) => {
                self.send_state.send_replace(AsyncState::Error(error.clone()));
            }
        }
        result
    }
}
