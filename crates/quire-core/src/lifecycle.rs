//! Disposers and the manager lifecycle phase.
//!
//! Every subscription or setup that needs cleanup hands back a [`Disposer`]. The manager keeps
//! the disposers of each setup stage on a stack and unwinds it in reverse at teardown, running
//! every disposer even if some of them fail.

use crate::error::{BoxError, DisposalError};
use std::fmt;

type DisposeFn = Box<dyn FnOnce() -> Result<(), BoxError>>;

/// A one-shot cleanup action.
///
/// Disposing twice is a no-op.
pub struct Disposer {
    inner: Option<DisposeFn>,
}

impl Disposer {
    /// Wrap an infallible cleanup.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self::fallible(move || {
            f();
            Ok(())
        })
    }

    /// Wrap a cleanup that may fail.
    pub fn fallible(f: impl FnOnce() -> Result<(), BoxError> + 'static) -> Self {
        Self {
            inner: Some(Box::new(f)),
        }
    }

    /// A disposer that does nothing.
    pub fn noop() -> Self {
        Self { inner: None }
    }

    /// Run the cleanup if it has not run yet.
    pub fn dispose(&mut self) -> Result<(), BoxError> {
        match self.inner.take() {
            Some(f) => f(),
            None => Ok(()),
        }
    }

    /// Returns `true` once the cleanup ran (or if there never was one).
    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Where the manager is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Construction has not finished.
    Uninitialized,
    /// Composed; no surface attached.
    Created,
    /// A surface is attached.
    Viewed,
    /// Torn down. Only read accessors remain usable.
    Destroyed,
}

/// Collects failures while running a batch of cleanups.
#[derive(Debug, Default)]
pub(crate) struct FailureCollector {
    first: Option<BoxError>,
    failures: usize,
}

impl FailureCollector {
    pub(crate) fn record(&mut self, owner: &str, result: Result<(), BoxError>) {
        if let Err(err) = result {
            tracing::warn!(extension = owner, error = %err, "disposer failed");
            self.failures += 1;
            if self.first.is_none() {
                self.first = Some(err);
            }
        }
    }

    pub(crate) fn into_result(self) -> Result<(), DisposalError> {
        match self.first {
            Some(first) => Err(DisposalError {
                first,
                failures: self.failures,
            }),
            None => Ok(()),
        }
    }
}

/// Disposers of one setup stage, each tagged with the extension that returned it.
#[derive(Debug, Default)]
pub(crate) struct DisposerStack {
    entries: Vec<(String, Disposer)>,
}

impl DisposerStack {
    pub(crate) fn push(&mut self, owner: &str, disposer: Disposer) {
        self.entries.push((owner.to_string(), disposer));
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Run every disposer, last pushed first.
    pub(crate) fn unwind(&mut self, failures: &mut FailureCollector) {
        while let Some((owner, mut disposer)) = self.entries.pop() {
            failures.record(&owner, disposer.dispose());
        }
    }
}
