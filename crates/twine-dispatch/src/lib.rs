//! The message dispatch loop (C6): pulls messages from a broker,
//! resolves an input handler by MIME type, and acks or rejects
//! according to the outcome. Also the bulk-import and targeted-update
//! drivers that share the same registry but bypass the broker
//! entirely.

pub mod bulk;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use twine_broker::{Broker, Message};
use twine_core::context::Context;
use twine_core::error::Result;
use twine_core::job::Job;

/// Single-thread pull-based dispatch loop over one broker connection.
/// `worker_count > 1` is achieved by constructing several `DispatchLoop`s
/// that share the same `Context` and `Broker` and giving each its own
/// thread (see [`run_workers`]), rather than by this type itself
/// spawning anything.
pub struct DispatchLoop {
    ctx: Arc<Context>,
    broker: Arc<dyn Broker>,
    shutdown: Arc<AtomicBool>,
}

impl DispatchLoop {
    pub fn new(ctx: Arc<Context>, broker: Arc<dyn Broker>, shutdown: Arc<AtomicBool>) -> Self {
        Self { ctx, broker, shutdown }
    }

    /// Run until `shutdown` is set. The flag is only checked at message
    /// boundaries: a message already being processed always runs to
    /// completion, win or lose.
    pub fn run(&self) -> Result<()> {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }
            let msg = match self.broker.next() {
                Ok(Some(msg)) => msg,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(error = %e, "broker read failed");
                    return Err(e);
                }
            };
            if self.shutdown.load(Ordering::SeqCst) {
                // Redeliver rather than lose a message picked up right
                // as shutdown was requested.
                self.broker.reject(&msg)?;
                return Ok(());
            }
            self.dispatch_one(msg);
        }
    }

    fn dispatch_one(&self, msg: Message) {
        let job = Job::new(msg.content_type.clone())
            .with_subject(msg.subject.clone())
            .with_address(msg.address.clone());
        self.ctx.set_current_job(Some(job));

        let outcome = {
            let registry = self.ctx.registry().read().expect("registry lock poisoned");
            registry.resolve_input(&self.ctx, &msg.content_type, &msg.body, msg.subject.as_deref())
        };

        match &outcome {
            Ok(()) => {
                tracing::info!(
                    mime = %msg.content_type,
                    subject = msg.subject.as_deref().unwrap_or(""),
                    address = msg.address.as_deref().unwrap_or(""),
                    outcome = "ack",
                    "message processed"
                );
                if let Err(e) = self.broker.ack(&msg) {
                    tracing::error!(error = %e, "failed to ack message");
                }
            }
            Err(e) => {
                tracing::warn!(
                    mime = %msg.content_type,
                    subject = msg.subject.as_deref().unwrap_or(""),
                    address = msg.address.as_deref().unwrap_or(""),
                    outcome = "reject",
                    error = %e,
                    "message processing failed"
                );
                if let Err(e) = self.broker.reject(&msg) {
                    tracing::error!(error = %e, "failed to reject message");
                }
            }
        }

        self.ctx.set_current_job(None);
    }
}

/// Run `worker_count` dispatch loops concurrently on their own threads,
/// all sharing `ctx`/`broker`/`shutdown`. Blocks until every thread
/// returns. A `worker_count` of 1 still spawns one thread, matching the
/// single-thread default behaviourally (just not by calling
/// `DispatchLoop::run` directly on the caller's own thread).
pub fn run_workers(ctx: Arc<Context>, broker: Arc<dyn Broker>, worker_count: usize, shutdown: Arc<AtomicBool>) -> Result<()> {
    let handles: Vec<_> = (0..worker_count.max(1))
        .map(|_| {
            let loop_ctx = Arc::clone(&ctx);
            let loop_broker = Arc::clone(&broker);
            let loop_shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || DispatchLoop::new(loop_ctx, loop_broker, loop_shutdown).run())
        })
        .collect();

    let mut first_err = None;
    for handle in handles {
        if let Ok(Err(e)) = handle.join() {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Update-mode driver: a direct `(handler_name, identifier)` call from
/// the CLI. There is no message and no ack/reject.
pub fn run_update(ctx: &Context, handler_name: &str, identifier: &str) -> Result<()> {
    let registry = ctx.registry().read().expect("registry lock poisoned");
    registry.resolve_update(ctx, handler_name, identifier)
}
