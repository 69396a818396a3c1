//! Two-phase asynchronous calls.
//!
//! A [`PendingCall`] is completed exactly once, either by the transport or by
//! [`PendingCall::abort`]. Later completions are dropped. [`PendingCall::end_invoke`]
//! blocks on a condition variable that is only allocated when somebody
//! actually waits before completion.
use std::{
    fmt, mem,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread::{self, ThreadId},
};

use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info};

use super::{ClientResult, HttpTransport};
use crate::{Result, SoapError};

/// Identifies one call towards the transport, for aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

pub type CompletionCallback = Box<dyn FnOnce(&PendingCall) + Send>;

enum Outcome {
    Pending,
    Done(Result<ClientResult>),
    Ended,
}

struct Shared {
    id: CallId,
    method: String,
    completions: AtomicUsize,
    begin_thread: ThreadId,
    begin_returned: AtomicBool,
    completed_synchronously: AtomicBool,
    outcome: Mutex<Outcome>,
    ready: OnceCell<Condvar>,
    callback: Mutex<Option<CompletionCallback>>,
    transport: Arc<dyn HttpTransport>,
}

/// Handle on a call started with [`ClientProtocol::begin_invoke`](super::ClientProtocol::begin_invoke).
#[derive(Clone)]
pub struct PendingCall {
    shared: Arc<Shared>,
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("id", &self.shared.id)
            .field("method", &self.shared.method)
            .field("completed", &self.is_completed())
            .finish()
    }
}

impl PendingCall {
    pub(crate) fn new(
        id: CallId,
        method: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        callback: Option<CompletionCallback>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id,
                method: method.into(),
                completions: AtomicUsize::new(0),
                begin_thread: thread::current().id(),
                begin_returned: AtomicBool::new(false),
                completed_synchronously: AtomicBool::new(false),
                outcome: Mutex::new(Outcome::Pending),
                ready: OnceCell::new(),
                callback: Mutex::new(callback),
                transport,
            }),
        }
    }

    pub fn id(&self) -> CallId {
        self.shared.id
    }

    pub fn method(&self) -> &str {
        &self.shared.method
    }

    pub fn is_completed(&self) -> bool {
        self.shared.completions.load(Ordering::Acquire) > 0
    }

    /// Whether the call had completed before `begin_invoke` returned.
    pub fn completed_synchronously(&self) -> bool {
        self.shared.completed_synchronously.load(Ordering::Acquire)
    }

    /// Called by `begin_invoke` once the transport handed control back.
    pub(crate) fn mark_returned(&self) {
        self.shared.begin_returned.store(true, Ordering::Release);
    }

    /// Stores the result and fires the callback, the first time only.
    pub(crate) fn complete(&self, result: Result<ClientResult>) {
        if self.shared.completions.fetch_add(1, Ordering::AcqRel) != 0 {
            debug!(call = %self.shared.id, "Late completion dropped");
            return;
        }

        // Synchronous means completed inside `begin_invoke`, on its thread.
        let synchronous =
            thread::current().id() == self.shared.begin_thread && !self.shared.begin_returned.load(Ordering::Acquire);
        {
            let mut outcome = self.shared.outcome.lock();
            self.shared
                .completed_synchronously
                .store(synchronous, Ordering::Release);
            *outcome = Outcome::Done(result);
            if let Some(ready) = self.shared.ready.get() {
                ready.notify_all();
            }
        }

        let callback = self.shared.callback.lock().take();
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// Blocks until the call completes.
    pub fn wait(&self) {
        let mut outcome = self.shared.outcome.lock();
        while matches!(*outcome, Outcome::Pending) {
            self.shared.ready.get_or_init(Condvar::new).wait(&mut outcome);
        }
    }

    /// The result of the call, blocking until there is one. A second call fails.
    pub fn end_invoke(&self) -> Result<ClientResult> {
        self.wait();
        let mut outcome = self.shared.outcome.lock();
        match mem::replace(&mut *outcome, Outcome::Ended) {
            Outcome::Done(result) => result,
            Outcome::Ended => Err(SoapError::invalid_operation(format!(
                "end_invoke was already called for {}",
                self.shared.id
            ))),
            Outcome::Pending => {
                *outcome = Outcome::Pending;
                Err(SoapError::invalid_operation("the call has not completed"))
            }
        }
    }

    /// Cancels the transport request. The call completes with [`SoapError::Aborted`].
    pub fn abort(&self) {
        if self.is_completed() {
            return;
        }
        info!(call = %self.shared.id, method = %self.shared.method, "Aborting call");
        self.shared.transport.abort(self.shared.id);
        self.complete(Err(SoapError::Aborted));
    }
}
