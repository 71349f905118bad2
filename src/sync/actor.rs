//! Sync worker and its handle.
//!
//! The worker owns the queue and processes it head to tail with one remote
//! call in flight. Failed operations go to the tail with a backoff; acked
//! batches (undo/redo mirrors) report their outcome and are never retried.
//! Identity confirmations from an acked batch are only published once the
//! whole batch went through.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};

use crate::authority::ItemAuthority;
use crate::config::SyncConfig;
use crate::domain::{DomainError, DomainResult, ItemId, RemoteId};

use super::{MirrorRejection, Operation, SyncEvent, SyncState, SyncStatus};

// ============================================================================
// Commands (internal)
// ============================================================================

enum SyncCommand {
    Enqueue {
        operations: Vec<Operation>,
    },
    /// Run as one batch after everything queued so far; stop at the first failure
    Mirror {
        operations: Vec<Operation>,
        reply: oneshot::Sender<Result<(), MirrorRejection>>,
    },
    SyncNow,
    DiscardFailed {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

// ============================================================================
// SyncHandle (public API)
// ============================================================================

/// Cloneable handle to the sync worker
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
    status: Arc<watch::Sender<SyncStatus>>,
}

impl SyncHandle {
    /// Queue operations for best-effort delivery. Returns immediately.
    pub fn enqueue(&self, operations: Vec<Operation>) -> DomainResult<()> {
        if operations.is_empty() {
            return Ok(());
        }
        let count = operations.len();
        self.add_pending(count);
        self.tx
            .send(SyncCommand::Enqueue { operations })
            .map_err(|_| {
                self.remove_pending(count);
                DomainError::SyncShutdown
            })
    }

    /// Send operations and wait until the authority has accepted all of them.
    ///
    /// On failure the rejection lists the operations the authority already
    /// applied, so the caller can revert them.
    pub async fn mirror(&self, operations: Vec<Operation>) -> Result<(), MirrorRejection> {
        if operations.is_empty() {
            return Ok(());
        }
        let count = operations.len();
        let (reply, rx) = oneshot::channel();
        self.add_pending(count);
        if self.tx.send(SyncCommand::Mirror { operations, reply }).is_err() {
            self.remove_pending(count);
            return Err(MirrorRejection::new(DomainError::SyncShutdown));
        }
        rx.await
            .map_err(|_| MirrorRejection::new(DomainError::SyncShutdown))?
    }

    /// Retry failed operations now instead of waiting out their backoff
    pub fn sync_now(&self) -> DomainResult<()> {
        self.tx
            .send(SyncCommand::SyncNow)
            .map_err(|_| DomainError::SyncShutdown)
    }

    /// Drop every operation waiting for a retry. Returns how many were dropped.
    pub async fn discard_failed(&self) -> DomainResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SyncCommand::DiscardFailed { reply })
            .map_err(|_| DomainError::SyncShutdown)?;
        rx.await.map_err(|_| DomainError::SyncShutdown)
    }

    /// Stop the worker. Operations still queued are abandoned.
    pub fn shutdown(&self) {
        let _ = self.tx.send(SyncCommand::Shutdown);
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Wait until nothing is queued or in flight
    pub async fn wait_idle(&self) -> DomainResult<()> {
        let mut rx = self.status.subscribe();
        rx.wait_for(|status| status.pending == 0)
            .await
            .map_err(|_| DomainError::SyncShutdown)?;
        Ok(())
    }

    fn add_pending(&self, count: usize) {
        self.status.send_modify(|status| {
            status.pending += count;
            if status.state == SyncState::Idle {
                status.state = SyncState::Syncing;
            }
        });
    }

    fn remove_pending(&self, count: usize) {
        self.status.send_modify(|status| {
            status.pending = status.pending.saturating_sub(count);
            if status.pending == 0 {
                status.state = SyncState::Idle;
            }
        });
    }
}

// ============================================================================
// SyncWorker (internal, runs in a tokio task)
// ============================================================================

struct QueuedEntry {
    /// (sequence number, operation) in dispatch order
    operations: VecDeque<(u64, Operation)>,
    attempts: u32,
    retry_at: Option<Instant>,
    reply: Option<oneshot::Sender<Result<(), MirrorRejection>>>,
    /// Operations of an acked batch the authority accepted so far
    applied: Vec<Operation>,
    /// Confirmations held back until an acked batch completes
    resolved: Vec<SyncEvent>,
}

impl QueuedEntry {
    fn new(operations: VecDeque<(u64, Operation)>) -> Self {
        Self {
            operations,
            attempts: 0,
            retry_at: None,
            reply: None,
            applied: Vec::new(),
            resolved: Vec::new(),
        }
    }

    fn failed(&self) -> bool {
        self.attempts > 0
    }
}

enum Readiness {
    Ready,
    /// A create for this id is queued ahead in sequence but not done yet
    Blocked(ItemId),
    /// Pending id with no create left that could confirm it
    Unresolved(ItemId),
}

struct SyncWorker {
    authority: Arc<dyn ItemAuthority>,
    config: SyncConfig,
    queue: VecDeque<QueuedEntry>,
    next_seq: u64,
    /// id -> (sequence of the create that confirmed it, permanent id)
    resolutions: HashMap<ItemId, (u64, RemoteId)>,
    /// Ignore retry delays until the queue drains
    urgent: bool,
    status: Arc<watch::Sender<SyncStatus>>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SyncCommand>) {
        'worker: loop {
            while let Ok(command) = rx.try_recv() {
                if !self.handle_command(command) {
                    break 'worker;
                }
            }

            let Some(entry) = self.queue.pop_front() else {
                self.urgent = false;
                match rx.recv().await {
                    Some(command) => {
                        if self.handle_command(command) {
                            continue;
                        }
                        break;
                    }
                    None => break,
                }
            };

            let retry_at = entry.retry_at.filter(|_| !self.urgent);
            if let Some(retry_at) = retry_at.filter(|at| *at > Instant::now()) {
                self.queue.push_front(entry);
                tokio::select! {
                    _ = sleep_until(retry_at) => {}
                    command = rx.recv() => {
                        let running = match command {
                            Some(command) => self.handle_command(command),
                            None => false,
                        };
                        if !running {
                            break;
                        }
                    }
                }
                continue;
            }

            let retried = entry.failed();
            self.process(entry).await;
            if retried {
                tokio::task::yield_now().await;
            }
        }
        self.abandon();
        log::debug!("Sync worker shutting down");
    }

    fn handle_command(&mut self, command: SyncCommand) -> bool {
        match command {
            SyncCommand::Enqueue { operations } => {
                for operation in operations {
                    let seq = self.take_seq();
                    self.queue
                        .push_back(QueuedEntry::new(VecDeque::from([(seq, operation)])));
                }
            }
            SyncCommand::Mirror { operations, reply } => {
                let operations = operations
                    .into_iter()
                    .map(|operation| (self.take_seq(), operation))
                    .collect();
                self.queue.push_back(QueuedEntry {
                    reply: Some(reply),
                    ..QueuedEntry::new(operations)
                });
            }
            SyncCommand::SyncNow => {
                log::info!("Sync requested, waiving retry delays");
                self.urgent = true;
            }
            SyncCommand::DiscardFailed { reply } => {
                let discarded: usize = self
                    .queue
                    .iter()
                    .filter(|entry| entry.failed())
                    .map(|entry| entry.operations.len())
                    .sum();
                self.queue.retain(|entry| !entry.failed());
                if discarded > 0 {
                    log::warn!("Discarded {} failed operations", discarded);
                }
                self.publish(discarded);
                let _ = reply.send(discarded);
            }
            SyncCommand::Shutdown => return false,
        }
        true
    }

    async fn process(&mut self, mut entry: QueuedEntry) {
        while let Some((seq, operation)) = entry.operations.pop_front() {
            let outcome = match self.readiness(seq, &operation) {
                Readiness::Ready => self.execute(seq, &operation).await,
                Readiness::Blocked(id) if entry.reply.is_none() => {
                    log::debug!(
                        "Deferring {:?} of {} until {} is confirmed",
                        operation.kind(),
                        operation.subject(),
                        id
                    );
                    entry.operations.push_front((seq, operation));
                    self.queue.push_back(entry);
                    self.publish(0);
                    return;
                }
                Readiness::Blocked(id) => Err(DomainError::Authority(format!(
                    "item {} is not confirmed yet",
                    id
                ))),
                Readiness::Unresolved(id) => {
                    log::warn!(
                        "Dropping {:?} of {}: item {} was never confirmed",
                        operation.kind(),
                        operation.subject(),
                        id
                    );
                    if entry.reply.is_none() {
                        self.publish(1);
                        continue;
                    }
                    Err(DomainError::Authority(format!("item {} was never confirmed", id)))
                }
            };

            match outcome {
                Ok(resolved) => {
                    self.publish(1);
                    if entry.reply.is_some() {
                        entry.resolved.extend(resolved);
                        entry.applied.push(operation);
                    } else if let Some(event) = resolved {
                        let _ = self.events.send(event);
                    }
                }
                Err(error) => {
                    self.fail(entry, seq, operation, error);
                    return;
                }
            }
        }

        if let Some(reply) = entry.reply.take() {
            for event in entry.resolved.drain(..) {
                let _ = self.events.send(event);
            }
            let _ = reply.send(Ok(()));
        }
    }

    fn fail(&mut self, mut entry: QueuedEntry, seq: u64, operation: Operation, error: DomainError) {
        match entry.reply.take() {
            Some(reply) => {
                log::warn!(
                    "Mirrored {:?} of {} rejected: {}",
                    operation.kind(),
                    operation.subject(),
                    error
                );
                if !entry.resolved.is_empty() {
                    log::debug!(
                        "Withholding {} confirmations of the rejected batch",
                        entry.resolved.len()
                    );
                }
                let remaining = entry.operations.len() + 1;
                self.publish(remaining);
                let _ = reply.send(Err(MirrorRejection {
                    applied: std::mem::take(&mut entry.applied),
                    error,
                }));
            }
            None => {
                entry.attempts += 1;
                let delay = self.config.backoff(entry.attempts);
                log::warn!(
                    "{:?} of {} failed (attempt {}), retrying in {:?}: {}",
                    operation.kind(),
                    operation.subject(),
                    entry.attempts,
                    delay,
                    error
                );
                entry.retry_at = Some(Instant::now() + delay);
                entry.operations.push_front((seq, operation));
                self.queue.push_back(entry);
                self.publish(0);
            }
        }
    }

    fn readiness(&self, seq: u64, operation: &Operation) -> Readiness {
        for id in operation.references() {
            if self.has_earlier_create(seq, id) {
                return Readiness::Blocked(id);
            }
            if self.resolve(seq, id).is_none() {
                return Readiness::Unresolved(id);
            }
        }
        Readiness::Ready
    }

    fn has_earlier_create(&self, seq: u64, id: ItemId) -> bool {
        self.queue.iter().any(|entry| {
            entry
                .operations
                .iter()
                .any(|(queued, operation)| *queued < seq && operation.is_create_of(id))
        })
    }

    /// Permanent id as seen by the operation with sequence `seq`
    fn resolve(&self, seq: u64, id: ItemId) -> Option<RemoteId> {
        match self.resolutions.get(&id) {
            Some((created, remote)) if *created < seq => Some(*remote),
            _ => id.remote(),
        }
    }

    fn remote_id(&self, seq: u64, id: ItemId) -> DomainResult<RemoteId> {
        self.resolve(seq, id).ok_or(DomainError::NotFound(id))
    }

    /// Send one operation. A create returns the confirmation to publish.
    async fn execute(&mut self, seq: u64, operation: &Operation) -> DomainResult<Option<SyncEvent>> {
        match operation {
            Operation::Create { item } => {
                let parent = item
                    .parent_id
                    .map(|parent| self.remote_id(seq, parent))
                    .transpose()?;
                let created = self.authority.create(&item.to_draft(parent)).await?;
                let remote = created.id.remote().ok_or_else(|| {
                    DomainError::Authority(format!("authority returned unconfirmed id {}", created.id))
                })?;
                self.resolutions.insert(item.id, (seq, remote));
                log::info!("Item {} confirmed as {}", item.id, remote);
                return Ok(Some(SyncEvent::Resolved {
                    from: item.id,
                    to: ItemId::Confirmed(remote),
                }));
            }
            Operation::Update { id, patch } => {
                let remote = self.remote_id(seq, *id)?;
                self.authority.update(remote, patch).await?;
            }
            Operation::Delete { item } => {
                let remote = self.remote_id(seq, item.id)?;
                match self.authority.delete(remote).await {
                    // Already gone remotely, e.g. through an ancestor's cascade
                    Ok(()) | Err(DomainError::NotFound(_)) => {}
                    Err(error) => return Err(error),
                }
            }
            Operation::Move {
                id,
                parent_id,
                position,
            } => {
                let remote = self.remote_id(seq, *id)?;
                let parent = parent_id
                    .map(|parent| self.remote_id(seq, parent))
                    .transpose()?;
                self.authority.move_item(remote, parent, Some(*position)).await?;
            }
        }
        Ok(None)
    }

    fn take_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Account for `done` finished operations and recompute the state
    fn publish(&self, done: usize) {
        let failed = self.queue.iter().any(QueuedEntry::failed);
        self.status.send_modify(|status| {
            status.pending = status.pending.saturating_sub(done);
            status.state = if failed {
                SyncState::Error
            } else if status.pending > 0 {
                SyncState::Syncing
            } else {
                SyncState::Idle
            };
        });
    }

    fn abandon(&mut self) {
        let remaining: usize = self.queue.iter().map(|entry| entry.operations.len()).sum();
        if remaining > 0 {
            log::warn!("Sync worker stopped with {} unsent operations", remaining);
        }
        self.queue.clear();
        self.status.send_modify(|status| *status = SyncStatus::default());
    }
}

// ============================================================================
// Public spawn function
// ============================================================================

/// Spawn the sync worker on the current tokio runtime.
///
/// Returns the handle and the receiver for identity confirmations, which the
/// owner of the tree store must drain and apply.
pub fn spawn_sync(
    authority: Arc<dyn ItemAuthority>,
    config: SyncConfig,
) -> (SyncHandle, mpsc::UnboundedReceiver<SyncEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (status, _) = watch::channel(SyncStatus::default());
    let status = Arc::new(status);

    let worker = SyncWorker {
        authority,
        config,
        queue: VecDeque::new(),
        next_seq: 0,
        resolutions: HashMap::new(),
        urgent: false,
        status: Arc::clone(&status),
        events: events_tx,
    };
    tokio::spawn(worker.run(rx));

    (SyncHandle { tx, status }, events_rx)
}
