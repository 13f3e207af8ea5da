// Request sequencing: newer requests abort and invalidate older ones
use crate::error::{AtlasError, Result};
use futures::future::{AbortHandle, Abortable};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    latest: AtomicU64,
    in_flight: Mutex<Option<(u64, AbortHandle)>>,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, Option<(u64, AbortHandle)>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Monotonic request counter shared by everything that loads one view.
/// Only the most recently issued ticket may commit results.
#[derive(Debug, Clone, Default)]
pub struct RequestSequence {
    inner: Arc<Inner>,
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a new ticket, aborting whatever the previous one had in flight.
    pub fn begin(&self) -> RequestTicket {
        let mut in_flight = self.inner.in_flight();
        let id = self.inner.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((old, handle)) = in_flight.take() {
            tracing::debug!(superseded = old, by = id, "aborting in-flight request");
            handle.abort();
        }
        RequestTicket {
            id,
            inner: self.inner.clone(),
        }
    }

    /// Invalidates every outstanding ticket without issuing a usable one.
    pub fn cancel(&self) {
        drop(self.begin());
    }
}

#[derive(Debug, Clone)]
pub struct RequestTicket {
    id: u64,
    inner: Arc<Inner>,
}

impl RequestTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.inner.latest.load(Ordering::SeqCst) == self.id
    }

    /// Runs one request under this ticket. Resolves to `Superseded` when a
    /// newer ticket was issued before or while it ran.
    pub async fn run<F, T>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let (handle, registration) = AbortHandle::new_pair();
        {
            let mut in_flight = self.inner.in_flight();
            if !self.is_current() {
                return Err(AtlasError::Superseded);
            }
            *in_flight = Some((self.id, handle));
        }

        let outcome = Abortable::new(request, registration).await;

        {
            let mut in_flight = self.inner.in_flight();
            if matches!(*in_flight, Some((id, _)) if id == self.id) {
                *in_flight = None;
            }
        }

        match outcome {
            Ok(result) if self.is_current() => result,
            _ => Err(AtlasError::Superseded),
        }
    }
}
