// Copyright (c) 2025 - Cowboy AI, Inc.
//! Eventual - Single-Assignment Values
//!
//! An [`Eventual<T>`] is a read-only handle on a value that some worker will
//! produce later, or never. The right to produce the value lives in a
//! separate [`Completer<T>`] that only the worker holds.
//!
//! # Lifecycle
//!
//! ```text
//!            complete(v)
//! Pending ───────────────→ Completed(v)
//!    │
//!    │  abandon() / Completer dropped
//!    └───────────────────→ Abandoned
//! ```
//!
//! - A value leaves `Pending` at most once. `complete` and `abandon` consume
//!   the completer, so a second transition cannot be written.
//! - Any number of observers may wait on clones of the same `Eventual`;
//!   all of them see the same terminal state.
//! - An `Eventual` carries no timeout. Bounding the wait is the job of
//!   [`gather`](crate::gather).
//!
//! # Example
//!
//! ```rust
//! use cim_quorum::eventual::{self, Outcome};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (completer, reading) = eventual::channel();
//!
//! tokio::spawn(async move {
//!     completer.complete(21.5_f64);
//! });
//!
//! assert_eq!(reading.observe().await, Outcome::Completed(21.5));
//! # }
//! ```

use std::future::Future;

use tokio::sync::watch;
use tracing::trace;

/// Terminal state of an [`Eventual`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The worker produced a value
    Completed(T),
    /// The worker will never produce a value
    Abandoned,
}

impl<T> Outcome<T> {
    /// Returns the completed value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Abandoned => None,
        }
    }

    /// True if the worker produced a value
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

/// Slot shared between the completer and observers.
///
/// Abandonment is not stored here: it is the sender closing while the slot
/// still reads `Pending`.
#[derive(Debug)]
enum Slot<T> {
    Pending,
    Completed(T),
}

/// Create a linked completer/observer pair
pub fn channel<T>() -> (Completer<T>, Eventual<T>) {
    let (tx, rx) = watch::channel(Slot::Pending);
    (Completer { tx }, Eventual { rx })
}

/// Exclusive right to settle an [`Eventual`]
///
/// Dropping a completer without calling [`complete`](Completer::complete)
/// abandons the value, so a worker that returns early or panics never
/// leaves observers waiting on a value that cannot arrive.
#[derive(Debug)]
pub struct Completer<T> {
    tx: watch::Sender<Slot<T>>,
}

impl<T> Completer<T> {
    /// Publish the value to every current and future observer
    pub fn complete(self, value: T) {
        // send_replace stores the value even when nobody is observing yet
        self.tx.send_replace(Slot::Completed(value));
        trace!("eventual completed");
    }

    /// Declare that no value will ever be produced
    pub fn abandon(self) {
        trace!("eventual abandoned");
        drop(self);
    }

    /// True once every observer handle has been dropped
    ///
    /// Workers may use this to skip work nobody will read; nothing requires
    /// them to.
    pub fn is_unobserved(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read-only handle on a value that will be available later
///
/// Cloning is cheap and every clone observes the same outcome.
#[derive(Debug, Clone)]
pub struct Eventual<T> {
    rx: watch::Receiver<Slot<T>>,
}

impl<T: Clone> Eventual<T> {
    /// An `Eventual` that is already completed with `value`
    pub fn ready(value: T) -> Self {
        let (completer, eventual) = channel();
        completer.complete(value);
        eventual
    }

    /// An `Eventual` that is already abandoned
    pub fn abandoned() -> Self {
        let (completer, eventual) = channel();
        completer.abandon();
        eventual
    }

    /// Wait until the value is settled and return its outcome
    ///
    /// Suspends without polling. Safe to call from any number of tasks at
    /// once, and safe to race against completion.
    pub async fn observe(&self) -> Outcome<T> {
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(|slot| matches!(slot, Slot::Completed(_))).await {
            Ok(slot) => match &*slot {
                Slot::Completed(value) => Outcome::Completed(value.clone()),
                Slot::Pending => Outcome::Abandoned,
            },
            // Sender closed while still pending
            Err(_) => Outcome::Abandoned,
        };
        outcome
    }

    /// Peek at the outcome without waiting
    ///
    /// Returns `None` while the value is still pending.
    pub fn try_outcome(&self) -> Option<Outcome<T>> {
        if let Slot::Completed(value) = &*self.rx.borrow() {
            return Some(Outcome::Completed(value.clone()));
        }
        match self.rx.has_changed() {
            Err(_) => Some(Outcome::Abandoned),
            Ok(_) => None,
        }
    }

    /// True once the value is completed or abandoned
    pub fn is_terminal(&self) -> bool {
        self.try_outcome().is_some()
    }
}

/// Run `work` on the tokio runtime and complete an `Eventual` with its output
///
/// Returns immediately. If `work` panics the completer is dropped with the
/// task and the value is abandoned.
pub fn spawn<F>(work: F) -> Eventual<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + Sync + 'static,
{
    let (completer, eventual) = channel();
    tokio::spawn(async move {
        let value = work.await;
        completer.complete(value);
    });
    eventual
}

/// Like [`spawn`], but `None` abandons the value instead of completing it
pub fn spawn_optional<F, T>(work: F) -> Eventual<T>
where
    F: Future<Output = Option<T>> + Send + 'static,
    T: Send + Sync + 'static,
{
    let (completer, eventual) = channel();
    tokio::spawn(async move {
        match work.await {
            Some(value) => completer.complete(value),
            None => completer.abandon(),
        }
    });
    eventual
}
