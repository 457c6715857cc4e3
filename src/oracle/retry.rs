use std::num::NonZeroUsize;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;

use super::{
    IntraDataFlowAnalyzer, IntraDataFlowAnalyzerInput, IntraDataFlowAnalyzerOutput, PathValidator,
    PathValidatorInput, PathValidatorOutput,
};

const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Per-attempt wall-clock budget. An oracle call that hangs past this is abandoned
/// (not killed) and counted as a failed attempt, same as a `None` answer.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(50);

/// Runs `f` on a detached worker thread and waits at most `timeout` for it to finish.
/// A late-finishing worker just finds its result channel closed and exits quietly;
/// it isn't killed, since there's no safe way to preempt arbitrary oracle code.
fn call_with_timeout<R, F>(f: F, timeout: Duration) -> Option<R>
where
    F: FnOnce() -> Option<R> + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(timeout).unwrap_or(None)
}

/// Wraps an oracle with a memoizing cache and a bounded retry loop, matching the
/// underlying invoke-then-cache contract: on a cache miss, the wrapped oracle is
/// invoked up to `max_query_num` times until it returns `Some`; a `None` after
/// exhausting the budget is not cached, so a later call can retry from scratch. Each
/// attempt is also bounded by a wall-clock timeout, so a stalled call doesn't starve
/// the retry budget.
pub struct RetryingIntraDataFlowAnalyzer<T: IntraDataFlowAnalyzer> {
    inner: Arc<T>,
    cache: Mutex<LruCache<IntraDataFlowAnalyzerInput, IntraDataFlowAnalyzerOutput>>,
    max_query_num: usize,
    attempt_timeout: Duration,
}

impl<T: IntraDataFlowAnalyzer + 'static> RetryingIntraDataFlowAnalyzer<T> {
    pub fn new(inner: T, max_query_num: usize) -> Self {
        Self::with_timeout(inner, max_query_num, DEFAULT_ATTEMPT_TIMEOUT)
    }

    pub fn with_timeout(inner: T, max_query_num: usize, attempt_timeout: Duration) -> Self {
        RetryingIntraDataFlowAnalyzer {
            inner: Arc::new(inner),
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap())),
            max_query_num: max_query_num.max(1),
            attempt_timeout,
        }
    }
}

impl<T: IntraDataFlowAnalyzer + 'static> IntraDataFlowAnalyzer for RetryingIntraDataFlowAnalyzer<T> {
    fn analyze(&self, input: &IntraDataFlowAnalyzerInput) -> Option<IntraDataFlowAnalyzerOutput> {
        if let Some(hit) = self.cache.lock().unwrap().get(input) {
            return Some(hit.clone());
        }
        for attempt in 0..self.max_query_num {
            let inner = self.inner.clone();
            let owned_input = input.clone();
            let output = call_with_timeout(move || inner.analyze(&owned_input), self.attempt_timeout);
            if let Some(output) = output {
                self.cache.lock().unwrap().put(input.clone(), output.clone());
                return Some(output);
            }
            tracing::debug!(attempt, function = %input.function_name, "intra data-flow oracle returned no answer or timed out, retrying");
        }
        None
    }
}

pub struct RetryingPathValidator<T: PathValidator> {
    inner: Arc<T>,
    cache: Mutex<LruCache<PathValidatorInput, PathValidatorOutput>>,
    max_query_num: usize,
    attempt_timeout: Duration,
}

impl<T: PathValidator + 'static> RetryingPathValidator<T> {
    pub fn new(inner: T, max_query_num: usize) -> Self {
        Self::with_timeout(inner, max_query_num, DEFAULT_ATTEMPT_TIMEOUT)
    }

    pub fn with_timeout(inner: T, max_query_num: usize, attempt_timeout: Duration) -> Self {
        RetryingPathValidator {
            inner: Arc::new(inner),
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap())),
            max_query_num: max_query_num.max(1),
            attempt_timeout,
        }
    }
}

impl<T: PathValidator + 'static> PathValidator for RetryingPathValidator<T> {
    fn validate(&self, input: &PathValidatorInput) -> Option<PathValidatorOutput> {
        if let Some(hit) = self.cache.lock().unwrap().get(input) {
            return Some(hit.clone());
        }
        for attempt in 0..self.max_query_num {
            let inner = self.inner.clone();
            let owned_input = input.clone();
            let output = call_with_timeout(move || inner.validate(&owned_input), self.attempt_timeout);
            if let Some(output) = output {
                self.cache.lock().unwrap().put(input.clone(), output.clone());
                return Some(output);
            }
            tracing::debug!(attempt, bug_kind = %input.bug_kind, "path validator returned no answer or timed out, retrying");
        }
        None
    }
}
