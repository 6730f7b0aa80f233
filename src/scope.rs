//! Fan-out over a fixed set of subtasks with an explicit cancellation signal.
//!
//! Every subtask runs on its own scoped thread and reports back over a
//! channel in completion order. The group owns the only sender of a
//! zero-capacity cancel channel; dropping it disconnects every
//! [`CancelToken`] at once. All subtask threads are joined before
//! [`TaskGroup::join`] returns, cancelled or not.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{BoxError, Cancelled, ScopeError};

/// How a group decides it is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinPolicy {
    /// First `Ok` wins; the rest are cancelled.
    FirstSuccess,
    /// Every subtask must succeed; the first `Err` cancels the rest.
    AllOrFirstFailure,
}

impl JoinPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinPolicy::FirstSuccess => "first_success",
            JoinPolicy::AllOrFirstFailure => "all_or_first_failure",
        }
    }
}

/// Handed to each subtask; observes the group's cancel signal.
#[derive(Clone, Debug)]
pub struct CancelToken {
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for `d`, waking early if the group is cancelled.
    pub fn sleep(&self, d: Duration) -> Result<(), Cancelled> {
        match self.signal.recv_timeout(d) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            _ => Err(Cancelled),
        }
    }
}

pub type Subtask<'env, T> = Box<dyn FnOnce(&CancelToken) -> Result<T, BoxError> + Send + 'env>;

#[derive(Debug, PartialEq, Eq)]
pub enum Joined<T> {
    /// Winner under [`JoinPolicy::FirstSuccess`], with its fork index.
    First { index: usize, value: T },
    /// Every value under [`JoinPolicy::AllOrFirstFailure`], in fork order.
    All(Vec<T>),
}

impl<T> Joined<T> {
    pub fn into_values(self) -> Vec<T> {
        match self {
            Joined::First { value, .. } => vec![value],
            Joined::All(values) => values,
        }
    }
}

pub struct TaskGroup<'env, T> {
    tasks: Vec<Subtask<'env, T>>,
}

impl<'env, T: Send + 'env> Default for TaskGroup<'env, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'env, T: Send + 'env> TaskGroup<'env, T> {
    pub fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    pub fn fork<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&CancelToken) -> Result<T, BoxError> + Send + 'env,
    {
        self.tasks.push(Box::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn join(self, policy: JoinPolicy) -> Result<Joined<T>, ScopeError> {
        if self.tasks.is_empty() {
            return Err(ScopeError::Empty);
        }
        let n = self.tasks.len();
        let tasks = self.tasks;

        let (cancel_tx, cancel_rx) = channel::bounded::<()>(0);
        let (done_tx, done_rx) = channel::unbounded::<(usize, Result<T, BoxError>)>();
        let mut cancel = Some(cancel_tx);

        let outcome = crossbeam::scope(|s| {
            for (index, task) in tasks.into_iter().enumerate() {
                let token = CancelToken {
                    signal: cancel_rx.clone(),
                };
                let done = done_tx.clone();
                s.spawn(move |_| {
                    let result = task(&token);
                    // Receiver is gone once the group has decided.
                    let _ = done.send((index, result));
                });
            }
            drop(done_tx);

            let decided = decide(policy, n, &done_rx);
            if cancel.take().is_some() {
                tracing::trace!(policy = policy.as_str(), "task group cancelling stragglers");
            }
            decided
        });

        match outcome {
            Ok(result) => result,
            Err(_) => Err(ScopeError::Panicked),
        }
    }
}

fn decide<T>(
    policy: JoinPolicy,
    n: usize,
    done: &Receiver<(usize, Result<T, BoxError>)>,
) -> Result<Joined<T>, ScopeError> {
    match policy {
        JoinPolicy::FirstSuccess => {
            let mut errors = Vec::new();
            for (index, result) in done.iter() {
                match result {
                    Ok(value) => return Ok(Joined::First { index, value }),
                    Err(e) => errors.push(e),
                }
            }
            if errors.len() < n {
                return Err(ScopeError::Panicked);
            }
            Err(ScopeError::AllFailed(errors))
        }
        JoinPolicy::AllOrFirstFailure => {
            let mut slots: Vec<Option<T>> = (0..n).map(|_| None).collect();
            for (index, result) in done.iter() {
                match result {
                    Ok(value) => slots[index] = Some(value),
                    Err(source) => return Err(ScopeError::Failed { index, source }),
                }
            }
            if slots.iter().any(Option::is_none) {
                return Err(ScopeError::Panicked);
            }
            Ok(Joined::All(slots.into_iter().flatten().collect()))
        }
    }
}
