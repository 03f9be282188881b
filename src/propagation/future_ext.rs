use crate::propagation::{CurrentTraceContext, TraceContext};
use futures_core::Stream;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

pin_project! {
    /// A future or stream that re-installs a captured trace context around
    /// every poll.
    #[derive(Debug)]
    pub struct WithContext<T> {
        #[pin]
        inner: T,
        context: Option<TraceContext>,
        current: Arc<dyn CurrentTraceContext>,
    }
}

impl<T: Future> Future for WithContext<T> {
    type Output = T::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _scope = this.current.new_scope(this.context.as_ref());
        this.inner.poll(task_cx)
    }
}

impl<T: Stream> Stream for WithContext<T> {
    type Item = T::Item;

    fn poll_next(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        let _scope = this.current.new_scope(this.context.as_ref());
        T::poll_next(this.inner, task_cx)
    }
}

/// Extension trait for handing the current trace context to a future or
/// stream explicitly.
///
/// Nothing propagates across task boundaries on its own; wrap the work you
/// spawn.
pub trait FutureScopeExt: Sized {
    /// Attach `context` to this future or stream. While it is being polled,
    /// the attached context is installed as current on the polling thread.
    fn with_context(
        self,
        current: Arc<dyn CurrentTraceContext>,
        context: Option<TraceContext>,
    ) -> WithContext<Self> {
        WithContext {
            inner: self,
            context,
            current,
        }
    }

    /// Attach whatever context is current on the calling thread.
    fn with_current_context(self, current: Arc<dyn CurrentTraceContext>) -> WithContext<Self> {
        let context = current.current();
        self.with_context(current, context)
    }
}

impl<T: Sized> FutureScopeExt for T {}
