use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

/// Cooperative stop signal shared by all the plane tasks of a computation
///
/// Tasks poll [CancellationToken::is_cancelled] once per radius sample or per row
/// and return without writing anything else once it is set.
/// A request is never cleared: a cancelled token stays cancelled.
///
/// A [child](CancellationToken::child) token is also cancelled by the requests
/// issued on its parent, or on the parent ancestors, after the child was created,
/// but not by the earlier ones.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    requested: Arc<AtomicBool>,
    // number of requests issued on this token, watched by its children
    requests: Arc<AtomicUsize>,
    // ancestors request counters and their values when the token was created
    ancestors: Vec<(Arc<AtomicUsize>, usize)>,
}
impl CancellationToken {
    pub fn new() -> Self {
        Default::default()
    }
    /// Token cancelled by its own requests and by the requests issued on `self` from now on
    pub fn child(&self) -> Self {
        let mut ancestors: Vec<_> = self
            .ancestors
            .iter()
            .map(|(requests, _)| (requests.clone(), requests.load(Ordering::SeqCst)))
            .collect();
        ancestors.push((self.requests.clone(), self.requests.load(Ordering::SeqCst)));
        Self {
            ancestors,
            ..Default::default()
        }
    }
    /// Requests all the tasks holding a clone of this token, or a child of it, to stop
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
            || self
                .ancestors
                .iter()
                .any(|(requests, since)| requests.load(Ordering::Relaxed) != *since)
    }
}
