//! Command queue and the worker loop that drains it.
//!
//! The subscriber thread enqueues, the worker thread dequeues and executes.
//! Execution happens outside the queue lock, so enqueueing never waits on a
//! running command. Pending outer-loop cycles take priority over queued
//! commands.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use m1m3_common::state::AckCode;
use tracing::{debug, info, warn};

use super::{Command, CommandEnvelope};
use crate::cycle::CycleBarrier;
use crate::publisher::{Event, Publisher};
use crate::state::{Context, StateError};

/// Longest the idle worker sleeps before rechecking the running flag.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// FIFO of commands awaiting execution.
pub struct CommandController {
    queue: Mutex<VecDeque<CommandEnvelope>>,
    publisher: Arc<dyn Publisher>,
    barrier: Arc<CycleBarrier>,
}

impl CommandController {
    pub fn new(publisher: Arc<dyn Publisher>, barrier: Arc<CycleBarrier>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            publisher,
            barrier,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<CommandEnvelope>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a command and wake the worker.
    pub fn enqueue(&self, envelope: CommandEnvelope) {
        debug!(id = envelope.id, command = envelope.command.name(), "Command queued");
        self.lock().push_back(envelope);
        self.barrier.notify_work();
    }

    /// Oldest queued command, if any.
    pub fn dequeue(&self) -> Option<CommandEnvelope> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every queued command, acknowledging each ABORTED.
    pub fn clear(&self) {
        let dropped: Vec<_> = self.lock().drain(..).collect();
        for envelope in dropped {
            self.publisher
                .ack(envelope.id, AckCode::Aborted, "Command queue cleared");
        }
    }

    /// Validate, dispatch and acknowledge one command.
    ///
    /// Every external command ends with exactly one terminal acknowledgment;
    /// the synthetic update gets none.
    pub fn execute(&self, ctx: &mut Context, envelope: &CommandEnvelope) {
        let CommandEnvelope { id, command } = envelope;

        if matches!(command, Command::Update) {
            if let Err(e) = ctx.handle(command) {
                warn!("Update failed: {e}");
            }
            return;
        }

        if let Err(e) = command.validate() {
            warn!(id, command = command.name(), "Command rejected: {e}");
            self.publisher.ack(*id, AckCode::NoPerm, &e.to_string());
            return;
        }

        info!(id, command = command.name(), state = %ctx.state(), "Executing command");
        self.publisher.ack(*id, AckCode::InProgress, "");

        match ctx.handle(command) {
            Ok(()) => self.publisher.ack(*id, AckCode::Complete, ""),
            Err(e) => {
                let reason = e.to_string();
                warn!(id, command = command.name(), "Command failed: {reason}");
                if matches!(e, StateError::NotValid { .. } | StateError::Rejected(_)) {
                    self.publisher.publish(Event::CommandRejectionWarning {
                        timestamp: ctx.model().now(),
                        command: command.name(),
                        reason: reason.clone(),
                    });
                }
                self.publisher.ack(*id, AckCode::Failed, &reason);
            }
        }
    }

    /// Worker loop: run pending cycles first, then queued commands, until
    /// `running` clears or the barrier shuts down.
    ///
    /// Queued commands still pending on exit are acknowledged ABORTED.
    pub fn run(&self, ctx: &mut Context, running: &AtomicBool) {
        info!("Command worker started");
        while running.load(Ordering::SeqCst) && !self.barrier.is_shutdown() {
            if self.barrier.take_request() {
                self.execute(ctx, &CommandEnvelope::update());
                self.barrier.complete_cycle();
                continue;
            }
            match self.dequeue() {
                Some(envelope) => self.execute(ctx, &envelope),
                None => self.barrier.wait_for_work(IDLE_WAIT),
            }
        }
        self.clear();
        info!(cycles = ctx.cycles(), state = %ctx.state(), "Command worker stopped");
    }
}

impl std::fmt::Debug for CommandController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandController")
            .field("queued", &self.len())
            .finish_non_exhaustive()
    }
}
