//! Render jobs and the worker's priority queue

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use super::request::RequestState;
use super::types::ViewTime;

/// Unique identifier for render jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

/// Lifecycle of a job: `Queued → Running → {Published | Discarded}`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    Queued = 0,
    Running = 1,
    Published = 2,
    Discarded = 3,
}

impl JobState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Queued,
            1 => Self::Running,
            2 => Self::Published,
            _ => Self::Discarded,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Discarded)
    }
}

/// One scheduled attempt to produce a bitmap for a request
pub struct RenderJob {
    id: JobId,
    pub(crate) request: Arc<RequestState>,
    aborted: AtomicBool,
    state: AtomicU8,
}

impl RenderJob {
    pub(crate) fn new(id: JobId, request: Arc<RequestState>) -> Self {
        Self {
            id,
            request,
            aborted: AtomicBool::new(false),
            state: AtomicU8::new(JobState::Queued as u8),
        }
    }

    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Page this job renders
    #[must_use]
    pub fn page(&self) -> usize {
        self.request.page.index
    }

    /// View time of the owning request, read live
    #[must_use]
    pub fn view_time(&self) -> ViewTime {
        self.request.view_time()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Moves the job to a terminal state and releases it from its request.
    pub(crate) fn finish(self: &Arc<Self>, state: JobState) {
        debug_assert!(state.is_terminal());
        self.set_state(state);
        self.request.remove_job(self);
    }
}

impl std::fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderJob")
            .field("id", &self.id)
            .field("page", &self.page())
            .field("aborted", &self.is_aborted())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Pending jobs of the single worker.
///
/// Ordering is decided at pop time, so aborts and view time updates that
/// happen while a job waits are taken into account:
/// 1. aborted jobs first, to throw them out cheaply;
/// 2. then the most recently viewed page;
/// 3. ties in submission order.
#[derive(Debug, Default)]
pub struct JobQueue {
    pending: Vec<Arc<RenderJob>>,
}

impl JobQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: Arc<RenderJob>) {
        self.pending.push(job);
    }

    pub fn pop(&mut self) -> Option<Arc<RenderJob>> {
        let mut best: Option<(usize, bool, ViewTime)> = None;
        for (idx, job) in self.pending.iter().enumerate() {
            let aborted = job.is_aborted();
            let time = job.view_time();
            let better = match best {
                None => true,
                Some((_, best_aborted, best_time)) => {
                    (aborted && !best_aborted) || (aborted == best_aborted && time > best_time)
                }
            };
            if better {
                best = Some((idx, aborted, time));
            }
        }
        best.map(|(idx, _, _)| self.pending.remove(idx))
    }

    /// Remove every pending job
    pub fn drain(&mut self) -> Vec<Arc<RenderJob>> {
        std::mem::take(&mut self.pending)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::types::PageInfo;

    fn job(id: u64, page: usize, view_time: i64) -> Arc<RenderJob> {
        let request = Arc::new(RequestState::new(PageInfo::new(page, 100.0, 100.0)));
        request.set_view_time(ViewTime::from_micros(view_time));
        Arc::new(RenderJob::new(JobId(id), request))
    }

    fn pop_pages(queue: &mut JobQueue) -> Vec<usize> {
        std::iter::from_fn(|| queue.pop()).map(|j| j.page()).collect()
    }

    #[test]
    fn most_recent_view_time_first() {
        let mut queue = JobQueue::new();
        queue.push(job(1, 1, 10));
        queue.push(job(2, 2, 30));
        queue.push(job(3, 3, 20));

        assert_eq!(pop_pages(&mut queue), vec![2, 3, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn aborted_jobs_jump_the_queue() {
        let mut queue = JobQueue::new();
        let old = job(1, 1, 10);
        let newest = job(2, 2, 30);
        let middle = job(3, 3, 20);
        queue.push(old);
        queue.push(newest);
        queue.push(middle.clone());

        middle.abort();

        let first = queue.pop().expect("queue has jobs");
        assert_eq!(first.page(), 3);
        assert!(first.is_aborted());
        assert_eq!(pop_pages(&mut queue), vec![2, 1]);
    }

    #[test]
    fn view_time_changes_are_seen_at_pop_time() {
        let mut queue = JobQueue::new();
        let a = job(1, 1, 10);
        let b = job(2, 2, 20);
        queue.push(a.clone());
        queue.push(b);

        a.request.set_view_time(ViewTime::from_micros(99));
        assert_eq!(pop_pages(&mut queue), vec![1, 2]);
    }

    #[test]
    fn ties_keep_submission_order() {
        let mut queue = JobQueue::new();
        queue.push(job(1, 4, 10));
        queue.push(job(2, 5, 10));
        queue.push(job(3, 6, 10));

        assert_eq!(pop_pages(&mut queue), vec![4, 5, 6]);
    }

    #[test]
    fn finish_releases_job_from_request() {
        let j = job(1, 1, 10);
        j.request.add_job(j.clone());
        assert_eq!(j.request.active_job_count(), 1);

        j.finish(JobState::Discarded);
        assert_eq!(j.state(), JobState::Discarded);
        assert_eq!(j.request.active_job_count(), 0);
    }
}
