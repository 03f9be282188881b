use crate::propagation::TraceContext;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<TraceContext>> = const { RefCell::new(None) };
}

/// Tracks the context a thread is currently working within.
///
/// Acquisition is scoped: [`new_scope`](CurrentTraceContext::new_scope)
/// installs a context (or clears it, given `None`) and returns a [`Scope`]
/// whose drop restores the previous value. Scopes nest LIFO on each thread.
///
/// Nothing crosses threads implicitly; hand a context to another task with
/// [`wrap`] or [`FutureScopeExt`](crate::propagation::FutureScopeExt).
pub trait CurrentTraceContext: Send + Sync + fmt::Debug {
    /// The context currently installed on the calling thread, if any.
    fn current(&self) -> Option<TraceContext>;

    /// Install `context` as current on the calling thread. `None` installs
    /// "no current span". Dropping the returned scope restores the previous
    /// value.
    fn new_scope(&self, context: Option<&TraceContext>) -> Scope;
}

/// Restores the previously-current context when dropped.
///
/// Scopes are thread-bound and must be released on the thread that created
/// them, in reverse creation order.
pub struct Scope {
    restore: Option<Box<dyn FnOnce()>>,
    // relies on thread locals, so must not cross threads
    _not_send: PhantomData<*const ()>,
}

impl Scope {
    pub(crate) fn new(restore: impl FnOnce() + 'static) -> Self {
        Scope {
            restore: Some(Box::new(restore)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").finish()
    }
}

/// Default [`CurrentTraceContext`] backed by a thread local.
///
/// Misuse is tolerated: releasing scopes out of order restores each scope's
/// own previous value, which recovers on a best-effort basis.
#[derive(Clone, Debug, Default)]
pub struct ThreadLocalCurrentTraceContext {
    _private: (),
}

impl ThreadLocalCurrentTraceContext {
    /// Create a new thread-local current-context tracker.
    pub fn new() -> Self {
        ThreadLocalCurrentTraceContext { _private: () }
    }
}

impl CurrentTraceContext for ThreadLocalCurrentTraceContext {
    fn current(&self) -> Option<TraceContext> {
        CURRENT_CONTEXT.with(|current| current.borrow().clone())
    }

    fn new_scope(&self, context: Option<&TraceContext>) -> Scope {
        let previous = CURRENT_CONTEXT.with(|current| current.replace(context.cloned()));
        Scope::new(move || {
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous));
        })
    }
}

/// A [`CurrentTraceContext`] that verifies scopes are released on the thread
/// that created them and in reverse creation order.
///
/// Violations panic; if the thread is already panicking the violation is
/// reported as a `tracing` error event instead. Intended for tests and for
/// flushing out instrumentation bugs.
#[derive(Clone, Debug, Default)]
pub struct StrictCurrentTraceContext {
    _private: (),
}

impl StrictCurrentTraceContext {
    /// Create a new strict current-context tracker.
    pub fn new() -> Self {
        StrictCurrentTraceContext { _private: () }
    }
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static OPEN_SCOPES: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

impl CurrentTraceContext for StrictCurrentTraceContext {
    fn current(&self) -> Option<TraceContext> {
        CURRENT_CONTEXT.with(|current| current.borrow().clone())
    }

    fn new_scope(&self, context: Option<&TraceContext>) -> Scope {
        let scope_id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        let owner = thread::current().id();
        OPEN_SCOPES.with(|scopes| scopes.borrow_mut().push(scope_id));
        let previous = CURRENT_CONTEXT.with(|current| current.replace(context.cloned()));
        Scope::new(move || {
            if thread::current().id() != owner {
                misuse(owner, "scope closed on a different thread than it was opened on");
                return;
            }
            let in_order = OPEN_SCOPES.with(|scopes| {
                let mut scopes = scopes.borrow_mut();
                if scopes.last() == Some(&scope_id) {
                    scopes.pop();
                    true
                } else {
                    scopes.retain(|open| *open != scope_id);
                    false
                }
            });
            let _ = CURRENT_CONTEXT.try_with(|current| current.replace(previous));
            if !in_order {
                misuse(owner, "scope closed out of order");
            }
        })
    }
}

fn misuse(owner: ThreadId, message: &'static str) {
    if thread::panicking() {
        tracing::error!(owner = ?owner, message);
    } else {
        panic!("{message} (opened on {owner:?})");
    }
}

/// Capture the calling thread's current context and return a closure that
/// re-installs it for the duration of `task`, wherever the closure runs.
pub fn wrap<F, R>(current: Arc<dyn CurrentTraceContext>, task: F) -> impl FnOnce() -> R
where
    F: FnOnce() -> R,
{
    let captured = current.current();
    move || {
        let _scope = current.new_scope(captured.as_ref());
        task()
    }
}
