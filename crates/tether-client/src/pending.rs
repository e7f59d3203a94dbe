//! In-flight request table
//!
//! Every request sits here from the moment it is written until exactly one
//! of three things happens: a frame matches it, its deadline passes, or the
//! connection drops and the table is aborted. The entry is removed before
//! the reply callback runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tether_core::{ApplicationError, Disconnected, Match, Result, TetherError};
use tokio::time::Instant;
use tracing::error;

/// Application error code delivered when a request's matcher panics
pub const MATCHER_PANICKED: i32 = -1;

/// Deadline used when `now + timeout` is not representable
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Correlation handle of a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

type Completion = Box<dyn FnOnce() + Send>;

/// Type-erased matcher plus reply callback of one request
pub(crate) trait Waiter<F>: Send {
    /// Run the matcher; on a claim, return the deferred reply so the table
    /// can remove the entry before it runs.
    fn claim(&mut self, frame: &F) -> Option<Completion>;

    /// Resolve with an error
    fn reject(self: Box<Self>, error: TetherError);
}

struct Entry<T, M, R> {
    matcher: M,
    reply: Option<R>,
    _output: PhantomData<fn() -> T>,
}

impl<F, T, M, R> Waiter<F> for Entry<T, M, R>
where
    M: FnMut(&F) -> Match<T> + Send,
    R: FnOnce(Result<T>) + Send + 'static,
    T: Send + 'static,
{
    fn claim(&mut self, frame: &F) -> Option<Completion> {
        let verdict = panic::catch_unwind(AssertUnwindSafe(|| (self.matcher)(frame)))
            .unwrap_or_else(|_| {
                error!("Response matcher panicked, failing its request");
                Match::Reject(ApplicationError::new(
                    MATCHER_PANICKED,
                    "response matcher panicked",
                ))
            });
        let outcome = match verdict {
            Match::Skip => return None,
            Match::Accept(value) => Ok(value),
            Match::Reject(err) => Err(TetherError::from(err)),
        };
        let reply = self.reply.take()?;
        Some(Box::new(move || reply(outcome)))
    }

    fn reject(self: Box<Self>, error: TetherError) {
        if let Some(reply) = self.reply {
            reply(Err(error));
        }
    }
}

/// Box a matcher and reply callback into a waiter
pub(crate) fn waiter<F, T, M, R>(matcher: M, reply: R) -> Box<dyn Waiter<F>>
where
    F: 'static,
    M: FnMut(&F) -> Match<T> + Send + 'static,
    R: FnOnce(Result<T>) + Send + 'static,
    T: Send + 'static,
{
    Box::new(Entry {
        matcher,
        reply: Some(reply),
        _output: PhantomData,
    })
}

struct PendingRequest<F> {
    waiter: Box<dyn Waiter<F>>,
    timeout: Duration,
    deadline: Instant,
}

/// Requests awaiting a correlated response, oldest first
pub struct PendingTable<F> {
    entries: BTreeMap<RequestId, PendingRequest<F>>,
    /// Deadline index; one key per entry, removed together with it
    timers: BTreeSet<(Instant, RequestId)>,
    next_id: u64,
}

impl<F: 'static> PendingTable<F> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            timers: BTreeSet::new(),
            next_id: 0,
        }
    }

    /// Register a request.
    ///
    /// `reply` is called exactly once: with the matcher's extracted value,
    /// with its application error, with `Timeout` once `timeout` elapses, or
    /// with `Disconnected` if the table is aborted first.
    pub fn add<T, M, R>(&mut self, matcher: M, reply: R, timeout: Duration) -> RequestId
    where
        M: FnMut(&F) -> Match<T> + Send + 'static,
        R: FnOnce(Result<T>) + Send + 'static,
        T: Send + 'static,
    {
        self.insert(waiter(matcher, reply), timeout)
    }

    pub(crate) fn insert(&mut self, waiter: Box<dyn Waiter<F>>, timeout: Duration) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + FAR_FUTURE);
        self.timers.insert((deadline, id));
        self.entries.insert(
            id,
            PendingRequest {
                waiter,
                timeout,
                deadline,
            },
        );
        id
    }

    /// Offer a frame to pending requests in insertion order.
    ///
    /// The first request whose matcher claims the frame is removed and
    /// resolved. Returns false if nobody claimed it.
    pub fn try_resolve(&mut self, frame: &F) -> bool {
        let claimed = self
            .entries
            .iter_mut()
            .find_map(|(id, request)| request.waiter.claim(frame).map(|done| (*id, done)));

        let Some((id, done)) = claimed else {
            return false;
        };
        self.remove(id);
        done();
        true
    }

    /// Reject every request whose deadline is at or before `now`
    pub fn expire(&mut self, now: Instant) -> usize {
        let due: Vec<RequestId> = self
            .timers
            .iter()
            .take_while(|(deadline, _)| *deadline <= now)
            .map(|(_, id)| *id)
            .collect();

        for id in &due {
            if let Some(request) = self.remove(*id) {
                let elapsed_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX);
                request.waiter.reject(TetherError::Timeout { elapsed_ms });
            }
        }
        due.len()
    }

    /// Earliest deadline among pending requests
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.first().map(|(deadline, _)| *deadline)
    }

    /// Empty the table, rejecting every request with `Disconnected(reason)`
    pub fn abort_all(&mut self, reason: Disconnected) -> usize {
        let entries = std::mem::take(&mut self.entries);
        self.timers.clear();

        let count = entries.len();
        for (_, request) in entries {
            request.waiter.reject(TetherError::disconnected(reason));
        }
        count
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove(&mut self, id: RequestId) -> Option<PendingRequest<F>> {
        let request = self.entries.remove(&id)?;
        self.timers.remove(&(request.deadline, id));
        Some(request)
    }
}

impl<F: 'static> Default for PendingTable<F> {
    fn default() -> Self {
        Self::new()
    }
}
