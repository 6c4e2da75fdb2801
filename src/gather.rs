// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bounded-Wait Gathering
//!
//! Collects the first `target` accepted values from a set of
//! [`Eventual`]s, giving up at a deadline. This is the gather half of
//! scatter/gather: a client fans a request out to many peers and proceeds
//! once a quorum of timely, valid replies has arrived.
//!
//! # Exit Conditions
//!
//! A gather stops as soon as one of these holds:
//!
//! 1. `target` values have been accepted
//! 2. the deadline has elapsed
//! 3. every eventual has settled, so nothing more can arrive
//!
//! Abandoned eventuals and values rejected by the filter are consumed but
//! never counted. Eventuals still pending at exit are left alone: their
//! workers keep running, and whatever they produce later is discarded.
//!
//! # Example
//!
//! ```rust
//! use cim_quorum::eventual::Eventual;
//! use cim_quorum::gather::Gather;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let replies = vec![Eventual::ready(4), Eventual::ready(7), Eventual::ready(10)];
//!
//! let gathered = Gather::new(replies)
//!     .target(2)
//!     .deadline(Duration::from_millis(300))
//!     .filter(|v: &i32| v % 2 == 0)
//!     .run()
//!     .await;
//!
//! assert_eq!(gathered.accepted, vec![4, 10]);
//! assert_eq!(gathered.rejected, 1);
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::eventual::{Eventual, Outcome};

/// Predicate deciding whether a settled value counts toward the target
pub type Filter<'a, T> = &'a (dyn Fn(&T) -> bool + Send + Sync);

/// Wait for the first `target` accepted values, or until `deadline`
///
/// Returns accepted values in arrival order; never more than `target`.
/// A missing `filter` accepts every completed value.
///
/// ```rust
/// use cim_quorum::eventual::Eventual;
/// use cim_quorum::gather::wait;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let replies = vec![Eventual::ready(1), Eventual::abandoned(), Eventual::ready(3)];
/// let values = wait(replies, 5, Duration::from_millis(10), None).await;
/// assert_eq!(values.len(), 2);
/// # }
/// ```
pub async fn wait<T>(
    futures: Vec<Eventual<T>>,
    target: usize,
    deadline: impl Into<Deadline>,
    filter: Option<Filter<'_, T>>,
) -> Vec<T>
where
    T: Clone + Send + Sync,
{
    let mut gather = Gather::new(futures).target(target).deadline(deadline);
    if let Some(filter) = filter {
        gather = gather.filter(filter);
    }
    gather.run().await.into_values()
}

/// Target for the common "majority of peers" quorum
pub fn majority(peers: usize) -> usize {
    peers / 2 + 1
}

/// Stand-in for deadlines too far out to represent, about 30 years
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// When a gather stops waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Relative to the start of the gather
    After(Duration),
    /// Fixed point in time
    At(Instant),
}

impl Deadline {
    fn resolve(self, started: Instant) -> Instant {
        match self {
            Deadline::After(timeout) => started
                .checked_add(timeout)
                .unwrap_or_else(|| started + FAR_FUTURE),
            Deadline::At(instant) => instant,
        }
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        Deadline::After(timeout)
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Deadline::At(instant)
    }
}

/// Why a gather stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Target was zero; nothing was observed
    NothingRequested,
    /// Enough values were accepted
    TargetReached,
    /// The deadline elapsed first
    DeadlineElapsed,
    /// Every eventual settled before the target was reached
    Exhausted,
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::NothingRequested => write!(f, "nothing requested"),
            Exit::TargetReached => write!(f, "target reached"),
            Exit::DeadlineElapsed => write!(f, "deadline elapsed"),
            Exit::Exhausted => write!(f, "all settled"),
        }
    }
}

/// Report of a finished gather
#[derive(Debug, Clone, PartialEq)]
pub struct Gathered<T> {
    /// Accepted values in arrival order
    pub accepted: Vec<T>,
    /// Completed values the filter turned away
    pub rejected: usize,
    /// Eventuals that settled without a value
    pub abandoned: usize,
    /// Eventuals not yet settled when the gather stopped
    pub pending: usize,
    /// Why the gather stopped
    pub exit: Exit,
    /// Time spent waiting
    pub elapsed: Duration,
}

impl<T> Gathered<T> {
    /// The accepted values, dropping the bookkeeping
    pub fn into_values(self) -> Vec<T> {
        self.accepted
    }

    /// True if the gather stopped because the target was met
    pub fn reached_target(&self) -> bool {
        self.exit == Exit::TargetReached
    }
}

/// Builder for a bounded-wait gather
///
/// Defaults: target is every eventual, deadline is one second, no filter.
pub struct Gather<'f, T> {
    futures: Vec<Eventual<T>>,
    target: usize,
    deadline: Deadline,
    filter: Option<Box<dyn Fn(&T) -> bool + Send + Sync + 'f>>,
}

impl<'f, T> Gather<'f, T>
where
    T: Clone + Send + Sync,
{
    /// Gather over `futures`
    pub fn new(futures: Vec<Eventual<T>>) -> Self {
        let target = futures.len();
        Self {
            futures,
            target,
            deadline: Deadline::After(Duration::from_secs(1)),
            filter: None,
        }
    }

    /// Number of accepted values that ends the gather early
    pub fn target(mut self, target: usize) -> Self {
        self.target = target;
        self
    }

    /// Hard upper bound on waiting
    pub fn deadline(mut self, deadline: impl Into<Deadline>) -> Self {
        self.deadline = deadline.into();
        self
    }

    /// Only count values for which `filter` returns true
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'f,
    {
        self.filter = Some(Box::new(filter));
        self
    }

    /// Observe every eventual until an exit condition holds
    pub async fn run(self) -> Gathered<T> {
        let started = Instant::now();
        let total = self.futures.len();

        if self.target == 0 {
            return Gathered {
                accepted: Vec::new(),
                rejected: 0,
                abandoned: 0,
                pending: total,
                exit: Exit::NothingRequested,
                elapsed: Duration::ZERO,
            };
        }

        let deadline = self.deadline.resolve(started);
        let accepts = |value: &T| self.filter.as_ref().map_or(true, |filter| filter(value));

        let mut observers: FuturesUnordered<_> = self
            .futures
            .iter()
            .map(|eventual| eventual.observe())
            .collect();

        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        let mut accepted = Vec::with_capacity(self.target.min(total));
        let mut rejected = 0;
        let mut abandoned = 0;

        let exit = loop {
            tokio::select! {
                // Values that are already in win ties against the timer
                biased;

                next = observers.next() => match next {
                    Some(Outcome::Completed(value)) => {
                        if accepts(&value) {
                            accepted.push(value);
                            trace!(accepted = accepted.len(), "value accepted");
                            if accepted.len() >= self.target {
                                break Exit::TargetReached;
                            }
                        } else {
                            rejected += 1;
                            trace!(rejected, "value rejected by filter");
                        }
                    }
                    Some(Outcome::Abandoned) => {
                        abandoned += 1;
                        trace!(abandoned, "eventual abandoned");
                    }
                    None => break Exit::Exhausted,
                },

                _ = &mut timer => break Exit::DeadlineElapsed,
            }
        };

        let pending = total - accepted.len() - rejected - abandoned;
        let elapsed = started.elapsed();

        debug!(
            target_count = self.target,
            total,
            accepted = accepted.len(),
            rejected,
            abandoned,
            pending,
            elapsed_ms = elapsed.as_millis() as u64,
            "gather finished: {}",
            exit
        );

        Gathered {
            accepted,
            rejected,
            abandoned,
            pending,
            exit,
            elapsed,
        }
    }
}

impl<T> fmt::Debug for Gather<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gather")
            .field("futures", &self.futures.len())
            .field("target", &self.target)
            .field("deadline", &self.deadline)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}
