//! Per-page render requests

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use super::coordinator::{RenderCoordinator, Shared};
use super::job::{JobState, RenderJob};
use super::types::{PageInfo, ViewTime};

/// State of a request shared with its in-flight jobs and the worker.
pub(crate) struct RequestState {
    pub(crate) page: PageInfo,
    last_view_time: AtomicI64,
    render_plain: AtomicBool,
    active_jobs: Mutex<Vec<Arc<RenderJob>>>,
}

impl RequestState {
    pub(crate) fn new(page: PageInfo) -> Self {
        Self {
            page,
            last_view_time: AtomicI64::new(ViewTime::default().as_micros()),
            render_plain: AtomicBool::new(false),
            active_jobs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn view_time(&self) -> ViewTime {
        ViewTime::from_micros(self.last_view_time.load(Ordering::Acquire))
    }

    pub(crate) fn set_view_time(&self, time: ViewTime) {
        self.last_view_time.store(time.as_micros(), Ordering::Release);
    }

    pub(crate) fn render_plain(&self) -> bool {
        self.render_plain.load(Ordering::Acquire)
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<Arc<RenderJob>>> {
        self.active_jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add_job(&self, job: Arc<RenderJob>) {
        self.jobs().push(job);
    }

    pub(crate) fn remove_job(&self, job: &Arc<RenderJob>) {
        self.jobs().retain(|j| !Arc::ptr_eq(j, job));
    }

    pub(crate) fn active_job_count(&self) -> usize {
        self.jobs().len()
    }

    fn abort_all(&self) -> usize {
        let jobs = self.jobs();
        for job in jobs.iter() {
            job.abort();
        }
        jobs.len()
    }
}

impl std::fmt::Debug for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestState")
            .field("page", &self.page.index)
            .field("last_view_time", &self.view_time())
            .field("render_plain", &self.render_plain())
            .finish_non_exhaustive()
    }
}

/// Live handle for "this page, as currently displayed".
///
/// Created by the UI when a page's view is created and dropped with it.
/// Throttles render work for the page: at most one job that is not aborted
/// can be in flight at any time.
pub struct RenderRequest {
    state: Arc<RequestState>,
    coordinator: Arc<Shared>,
}

impl RenderRequest {
    /// Create a request for `page` and register it with the coordinator.
    ///
    /// A later request for the same page replaces this one in the
    /// coordinator's registry.
    #[must_use]
    pub fn new(coordinator: &RenderCoordinator, page: PageInfo) -> Self {
        let shared = coordinator.shared();
        let state = Arc::new(RequestState::new(page));
        shared.register_request(&state);

        Self {
            state,
            coordinator: Arc::clone(shared),
        }
    }

    /// Page number (0-indexed)
    #[must_use]
    pub fn page(&self) -> usize {
        self.state.page.index
    }

    #[must_use]
    pub fn page_info(&self) -> PageInfo {
        self.state.page
    }

    /// Ask for the page to be rendered.
    ///
    /// If a job that is not aborted is still active this is a no-op and
    /// returns `false`. Otherwise `view_time` becomes the request's
    /// priority and a new job is queued.
    pub fn request(&self, view_time: ViewTime) -> bool {
        let mut jobs = self.state.jobs();
        if jobs.iter().any(|job| !job.is_aborted()) {
            return false;
        }

        self.state.set_view_time(view_time);
        let job = Arc::new(RenderJob::new(
            self.coordinator.next_job_id(),
            Arc::clone(&self.state),
        ));
        jobs.push(Arc::clone(&job));
        drop(jobs);

        if !self.coordinator.submit(Arc::clone(&job)) {
            warn!("Render worker is gone, dropping page {}", self.page() + 1);
            job.finish(JobState::Discarded);
            return false;
        }
        true
    }

    /// Flag every active job as aborted. Does not wait for them.
    pub fn abort(&self) {
        let aborted = self.state.abort_all();
        if aborted > 0 {
            debug!("Aborted {aborted} job(s) of page {}", self.page() + 1);
        }
    }

    /// Record that the page was looked at, without rendering it.
    pub fn update_view_time(&self, time: ViewTime) {
        self.state.set_view_time(time);
    }

    #[must_use]
    pub fn last_view_time(&self) -> ViewTime {
        self.state.view_time()
    }

    /// Render at the page's native size, without zoom, rotation or recolor.
    pub fn set_render_plain(&self, plain: bool) {
        self.state.render_plain.store(plain, Ordering::Release);
    }

    #[must_use]
    pub fn render_plain(&self) -> bool {
        self.state.render_plain()
    }

    /// Number of jobs that have not reached a terminal state yet,
    /// aborted ones included
    #[must_use]
    pub fn active_job_count(&self) -> usize {
        self.state.active_job_count()
    }

    /// Whether a job that is not aborted is in flight
    #[must_use]
    pub fn has_pending_job(&self) -> bool {
        self.state.jobs().iter().any(|job| !job.is_aborted())
    }
}

impl Drop for RenderRequest {
    fn drop(&mut self) {
        self.abort();
        // Aborted jobs still finish on their own; drop our references so
        // the request state is freed with them.
        self.state.jobs().clear();
        self.coordinator.unregister_request(&self.state);
    }
}

impl std::fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRequest")
            .field("page", &self.state.page.index)
            .field("last_view_time", &self.state.view_time())
            .field("active_jobs", &self.state.active_job_count())
            .finish_non_exhaustive()
    }
}
