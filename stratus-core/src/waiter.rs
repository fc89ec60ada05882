//! Waiter - Poll a remote status until it settles
//!
//! Cloud control planes run provisioning asynchronously and only expose a
//! status field to poll. A [`StateChangeConf`] describes which statuses mean
//! "keep waiting" (pending) and which mean "done" (target); any other status
//! stops the wait with an error. Each poll goes through [`retry`] so transient
//! query failures do not abort the wait.
//!
//! A session moves through [`WaitPhase`]s:
//!
//! ```text
//! NotStarted -> Polling -> Succeeded
//!                  |   \-> Failed
//!                  \-----> TimedOut
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::context::{DEFAULT_MIN_BACKOFF, LogId, READ_RETRY_TIMEOUT, WaitOverride};
use crate::retry::{AttemptError, RetryError, RetryPolicy, retry};

/// Default number of consecutive "not found" polls tolerated
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;
/// Default pause between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// A status value that can be compared against pending and target sets
pub trait PollStatus: Clone + PartialEq + fmt::Debug + fmt::Display {}

impl<T> PollStatus for T where T: Clone + PartialEq + fmt::Debug + fmt::Display {}

/// One observation of the remote resource
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<R, S> {
    pub value: R,
    pub status: S,
    /// Vendor-provided detail about the status, if any
    pub message: Option<String>,
}

impl<R, S> Snapshot<R, S> {
    pub fn new(value: R, status: S) -> Self {
        Self {
            value,
            status,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Lifecycle phase of a wait session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPhase {
    NotStarted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl WaitPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WaitPhase::Succeeded | WaitPhase::Failed | WaitPhase::TimedOut
        )
    }
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WaitPhase::NotStarted => "not started",
            WaitPhase::Polling => "polling",
            WaitPhase::Succeeded => "succeeded",
            WaitPhase::Failed => "failed",
            WaitPhase::TimedOut => "timed out",
        };
        write!(f, "{}", s)
    }
}

/// Timing of a wait, usually fixed per resource family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub timeout: Duration,
    /// Pause before the first poll
    pub delay: Duration,
    /// Pause between polls
    pub poll_interval: Duration,
}

impl WaitSettings {
    pub const fn new(timeout: Duration, delay: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            delay,
            poll_interval,
        }
    }

    /// Apply configured overrides on top of these settings
    pub fn with_override(self, overrides: Option<&WaitOverride>) -> Self {
        let Some(o) = overrides else {
            return self;
        };
        Self {
            timeout: o.timeout_secs.map(Duration::from_secs).unwrap_or(self.timeout),
            delay: o.delay_secs.map(Duration::from_secs).unwrap_or(self.delay),
            poll_interval: o
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(self.poll_interval),
        }
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self::new(READ_RETRY_TIMEOUT, Duration::ZERO, DEFAULT_POLL_INTERVAL)
    }
}

/// Why a wait ended without reaching a target status
#[derive(Debug, Error)]
pub enum WaitError<S, E>
where
    S: fmt::Debug + fmt::Display,
{
    /// Still pending when the timeout elapsed
    #[error(
        "timeout while waiting for {resource} after {elapsed:?} (last status: {})",
        status_or_none(.last_status)
    )]
    TimedOut {
        resource: String,
        last_status: Option<S>,
        elapsed: Duration,
        /// Last retryable query error, when the query itself kept failing
        last_error: Option<E>,
    },

    /// The remote reported a status outside the pending and target sets
    #[error(
        "unexpected status '{status}' for {resource}{} (expected one of: {})",
        message_suffix(.message),
        join_statuses(.expected)
    )]
    UnexpectedStatus {
        resource: String,
        status: S,
        message: Option<String>,
        expected: Vec<S>,
    },

    /// The status query failed with a non-retryable error
    #[error("failed to query status of {resource}: {source}")]
    Query {
        resource: String,
        #[source]
        source: E,
    },

    /// The resource stayed invisible for too many consecutive polls
    #[error("{resource} not found after {checks} consecutive checks")]
    NotFound { resource: String, checks: u32 },

    /// `run` was called again on a session that already finished
    #[error("wait session for {resource} already {phase}")]
    Closed { resource: String, phase: WaitPhase },
}

impl<S, E> WaitError<S, E>
where
    S: fmt::Debug + fmt::Display,
{
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::TimedOut { .. })
    }
}

fn status_or_none<S: fmt::Display>(status: &Option<S>) -> String {
    match status {
        Some(s) => s.to_string(),
        None => "none".to_string(),
    }
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {}", m),
        None => String::new(),
    }
}

fn join_statuses<S: fmt::Display>(statuses: &[S]) -> String {
    statuses
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration of a wait for a status change
#[derive(Debug, Clone)]
pub struct StateChangeConf<S> {
    resource: String,
    pending: Vec<S>,
    target: Vec<S>,
    settings: WaitSettings,
    /// Floor for the pause between polls
    min_timeout: Duration,
    not_found_checks: u32,
    continuous_target_occurrence: u32,
    query_policy: RetryPolicy,
}

impl<S: PollStatus> StateChangeConf<S> {
    /// `resource` labels log lines and errors (e.g., "ec2_vpc.main")
    pub fn new(resource: impl Into<String>, pending: Vec<S>, target: Vec<S>) -> Self {
        let settings = WaitSettings::default();
        Self {
            resource: resource.into(),
            pending,
            target,
            settings,
            min_timeout: DEFAULT_MIN_BACKOFF,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: 1,
            query_policy: RetryPolicy::new(settings.timeout),
        }
    }

    pub fn with_settings(mut self, settings: WaitSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.settings.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// Never pause less than `min_timeout` between polls
    pub fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Require the target status this many polls in a row
    pub fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences.max(1);
        self
    }

    /// Backoff used when a status query fails with a retryable error
    pub fn with_query_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.query_policy = self.query_policy.with_backoff(min, max);
        self
    }

    pub fn settings(&self) -> WaitSettings {
        self.settings
    }

    pub fn session(&self) -> WaitSession<'_, S> {
        WaitSession {
            conf: self,
            phase: WaitPhase::NotStarted,
            polls: 0,
            last_status: None,
            not_found: 0,
            target_streak: 0,
        }
    }

    /// Poll `query` until the status reaches the target set
    pub async fn wait_for_state<R, E, F, Fut>(
        &self,
        log_id: &LogId,
        query: F,
    ) -> Result<Snapshot<R, S>, WaitError<S, E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<Snapshot<R, S>>, AttemptError<E>>>,
        E: fmt::Display,
    {
        self.session().run(log_id, query).await
    }
}

/// Verdict on a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Continue,
    Done,
    Unexpected,
    NotFound,
}

/// One run of a [`StateChangeConf`]
///
/// Holds only local bookkeeping: the deadline clock lives inside `run` and the
/// last status is replaced on every poll.
pub struct WaitSession<'a, S> {
    conf: &'a StateChangeConf<S>,
    phase: WaitPhase,
    polls: u32,
    last_status: Option<S>,
    not_found: u32,
    target_streak: u32,
}

impl<S: PollStatus> WaitSession<'_, S> {
    pub fn phase(&self) -> WaitPhase {
        self.phase
    }

    /// Number of status queries that produced an observation
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn last_status(&self) -> Option<&S> {
        self.last_status.as_ref()
    }

    fn observe(&mut self, status: Option<&S>) -> Step {
        self.polls += 1;
        self.phase = WaitPhase::Polling;

        let Some(status) = status else {
            self.not_found += 1;
            self.target_streak = 0;
            if self.not_found > self.conf.not_found_checks {
                self.phase = WaitPhase::Failed;
                return Step::NotFound;
            }
            return Step::Continue;
        };

        self.not_found = 0;
        self.last_status = Some(status.clone());

        if self.conf.target.contains(status) {
            self.target_streak += 1;
            if self.target_streak >= self.conf.continuous_target_occurrence {
                self.phase = WaitPhase::Succeeded;
                return Step::Done;
            }
            Step::Continue
        } else if self.conf.pending.contains(status) {
            self.target_streak = 0;
            Step::Continue
        } else {
            self.phase = WaitPhase::Failed;
            Step::Unexpected
        }
    }

    fn timed_out<E>(&mut self, elapsed: Duration, last_error: Option<E>) -> WaitError<S, E> {
        self.phase = WaitPhase::TimedOut;
        WaitError::TimedOut {
            resource: self.conf.resource.clone(),
            last_status: self.last_status.clone(),
            elapsed,
            last_error,
        }
    }

    /// Poll until a terminal phase is reached
    ///
    /// The first query runs after the configured delay; later queries are
    /// spaced by the poll interval, clipped to the time left.
    pub async fn run<R, E, F, Fut>(
        &mut self,
        log_id: &LogId,
        mut query: F,
    ) -> Result<Snapshot<R, S>, WaitError<S, E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<Snapshot<R, S>>, AttemptError<E>>>,
        E: fmt::Display,
    {
        let conf = self.conf;
        if self.phase != WaitPhase::NotStarted {
            return Err(WaitError::Closed {
                resource: conf.resource.clone(),
                phase: self.phase,
            });
        }

        let start = Instant::now();
        let deadline = start + conf.settings.timeout;
        let action = format!("status of {}", conf.resource);

        if !conf.settings.delay.is_zero() {
            sleep(conf.settings.delay.min(conf.settings.timeout)).await;
        }

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let policy = conf.query_policy.with_timeout(remaining);

            let observed = match retry(log_id, &policy, &action, &mut query).await {
                Ok(observed) => observed,
                Err(RetryError::Fatal(source)) => {
                    self.phase = WaitPhase::Failed;
                    return Err(WaitError::Query {
                        resource: conf.resource.clone(),
                        source,
                    });
                }
                Err(RetryError::Timeout { last, .. }) => {
                    warn!(
                        "[{}] gave up waiting for {}: status query kept failing",
                        log_id, conf.resource
                    );
                    return Err(self.timed_out(start.elapsed(), Some(last)));
                }
            };

            let step = self.observe(observed.as_ref().map(|snapshot| &snapshot.status));
            match (step, observed) {
                (Step::Done, Some(snapshot)) => {
                    debug!(
                        "[{}] {} reached {} after {} poll(s)",
                        log_id, conf.resource, snapshot.status, self.polls
                    );
                    return Ok(snapshot);
                }
                (Step::Unexpected, Some(snapshot)) => {
                    return Err(WaitError::UnexpectedStatus {
                        resource: conf.resource.clone(),
                        status: snapshot.status,
                        message: snapshot.message,
                        expected: conf.target.clone(),
                    });
                }
                (Step::NotFound, _) => {
                    return Err(WaitError::NotFound {
                        resource: conf.resource.clone(),
                        checks: self.not_found,
                    });
                }
                (_, observed) => {
                    debug!(
                        "[{}] waiting for {}: status {} (poll {})",
                        log_id,
                        conf.resource,
                        status_or_none(&observed.map(|snapshot| snapshot.status)),
                        self.polls
                    );
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(now - start, None));
            }
            let pause = conf.settings.poll_interval.max(conf.min_timeout);
            sleep(pause.min(deadline - now)).await;
        }
    }
}
