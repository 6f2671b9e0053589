//! Render coordinator - owns the worker, the cache and the decode lock

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread::JoinHandle;

use flume::Sender;
use log::{debug, info, warn};

use super::DEFAULT_CACHE_SIZE;
use super::cache::{CacheInsertion, PageCache};
use super::color::Color;
use super::document::PageSource;
use super::error::RenderError;
use super::events::{EventPump, EventSender, RenderEvent, Waker};
use super::job::{JobId, RenderJob};
use super::recolor::RecolorConfig;
use super::request::RequestState;
use super::state::{Command, Effect, RenderState, ZOOM_MAX, ZOOM_MIN};
use super::types::{DecodeParams, PixelBuffer, ViewParams, ViewTime};
use super::worker::{allocate, render_worker};
use crate::settings;

pub(crate) enum WorkerMessage {
    Job(Arc<RenderJob>),
    Shutdown,
}

/// Job outcome counters
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) submitted: AtomicU64,
    pub(crate) published: AtomicU64,
    pub(crate) discarded: AtomicU64,
    pub(crate) failed: AtomicU64,
}

/// Snapshot of the coordinator's job counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Jobs handed to the worker
    pub submitted: u64,
    /// Bitmaps delivered to the UI
    pub published: u64,
    /// Jobs dropped because they were aborted or the coordinator stopped
    pub discarded: u64,
    /// Jobs whose allocation or decode failed
    pub failed: u64,
}

/// State shared by the coordinator, its requests, the worker and the pump
pub(crate) struct Shared {
    document: Mutex<Box<dyn PageSource>>,
    state: RwLock<RenderState>,
    cache: Mutex<PageCache>,
    requests: Mutex<HashMap<usize, Weak<RequestState>>>,
    jobs: Sender<WorkerMessage>,
    pub(crate) events: EventSender,
    stopping: AtomicBool,
    next_job_id: AtomicU64,
    pub(crate) stats: StatsCounters,
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub(crate) fn next_job_id(&self) -> JobId {
        JobId(self.next_job_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Current view and recolor state
    pub(crate) fn render_state(&self) -> RenderState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn document(&self) -> MutexGuard<'_, Box<dyn PageSource>> {
        lock(&self.document)
    }

    /// Hands a job to the worker. Never blocks.
    pub(crate) fn submit(&self, job: Arc<RenderJob>) -> bool {
        let page = job.page();
        if self.jobs.send(WorkerMessage::Job(job)).is_err() {
            return false;
        }
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        debug!("Queued page {}", page + 1);
        true
    }

    pub(crate) fn register_request(&self, request: &Arc<RequestState>) {
        let mut requests = lock(&self.requests);
        requests.retain(|_, weak| weak.strong_count() > 0);
        requests.insert(request.page.index, Arc::downgrade(request));
    }

    pub(crate) fn unregister_request(&self, request: &Arc<RequestState>) {
        let mut requests = lock(&self.requests);
        let registered = requests
            .get(&request.page.index)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(request)));
        if registered {
            requests.remove(&request.page.index);
        }
    }

    fn invalidate_cache(&self) {
        let pages = lock(&self.cache).invalidate_all();
        debug!("Invalidated {} cached page(s)", pages.len());
        for page in pages {
            self.events.notify(RenderEvent::CacheInvalidated { page });
        }
    }
}

/// View time of the request registered for `page`; pages without a live
/// request count as the oldest.
fn view_time_in(requests: &HashMap<usize, Weak<RequestState>>, page: usize) -> ViewTime {
    requests
        .get(&page)
        .and_then(Weak::upgrade)
        .map_or(ViewTime::OLDEST, |request| request.view_time())
}

/// Exclusive access to the document, excluding the worker's decodes.
///
/// Dropping the guard releases the lock.
pub struct DecodeGuard<'a> {
    document: MutexGuard<'a, Box<dyn PageSource>>,
}

impl Deref for DecodeGuard<'_> {
    type Target = dyn PageSource;

    fn deref(&self) -> &Self::Target {
        self.document.as_ref()
    }
}

impl DerefMut for DecodeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.document.as_mut()
    }
}

/// Schedules page renders on a single background worker.
///
/// The UI thread creates one [`RenderRequest`](super::RenderRequest) per page
/// and reads results from the [`EventPump`] returned alongside the
/// coordinator.
pub struct RenderCoordinator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl RenderCoordinator {
    /// Create a coordinator with default view and recolor state
    pub fn new<D>(document: D, cache_size: usize) -> Result<(Self, EventPump), RenderError>
    where
        D: PageSource + 'static,
    {
        Self::with_state(document, cache_size, RenderState::default())
    }

    /// Create a coordinator configured from the global settings
    pub fn from_settings<D>(document: D) -> Result<(Self, EventPump), RenderError>
    where
        D: PageSource + 'static,
    {
        let mut recolor = RecolorConfig {
            enabled: settings::is_recolor_enabled(),
            preserve_hue: settings::is_recolor_keephue(),
            reverse_video: settings::is_recolor_reverse_video(),
            ..RecolorConfig::default()
        };
        let (light, dark) = settings::get_recolor_colors();
        match Color::parse(&light) {
            Ok(color) => recolor.light = color,
            Err(e) => warn!("Ignoring recolor light color: {e}"),
        }
        match Color::parse(&dark) {
            Ok(color) => recolor.dark = color,
            Err(e) => warn!("Ignoring recolor dark color: {e}"),
        }

        let defaults = ViewParams::default();
        let zoom = settings::get_zoom();
        let zoom = if zoom.is_finite() {
            zoom.clamp(ZOOM_MIN, ZOOM_MAX)
        } else {
            warn!("Ignoring non-finite zoom {zoom}");
            defaults.zoom
        };
        let ppi = settings::get_ppi();
        let ppi = if ppi.is_finite() {
            ppi.max(0.0)
        } else {
            warn!("Ignoring non-finite ppi {ppi}");
            defaults.ppi
        };
        let view = ViewParams {
            zoom,
            ppi,
            ..defaults
        };

        Self::with_state(
            document,
            settings::get_page_cache_size(),
            RenderState::new(view, recolor),
        )
    }

    /// Create a coordinator with the given initial state
    pub fn with_state<D>(
        document: D,
        cache_size: usize,
        state: RenderState,
    ) -> Result<(Self, EventPump), RenderError>
    where
        D: PageSource + 'static,
    {
        let cache_size = if cache_size == 0 {
            warn!("Page cache size must be positive, using {DEFAULT_CACHE_SIZE}");
            DEFAULT_CACHE_SIZE
        } else {
            cache_size
        };

        let cache = PageCache::new(cache_size)?;
        let (jobs_tx, jobs_rx) = flume::unbounded();
        let (events_tx, events_rx) = flume::unbounded();

        let shared = Arc::new(Shared {
            document: Mutex::new(Box::new(document)),
            state: RwLock::new(state),
            cache: Mutex::new(cache),
            requests: Mutex::new(HashMap::new()),
            jobs: jobs_tx,
            events: EventSender::new(events_tx),
            stopping: AtomicBool::new(false),
            next_job_id: AtomicU64::new(1),
            stats: StatsCounters::default(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("page-render".to_string())
            .spawn(move || render_worker(&worker_shared, &jobs_rx))?;

        info!("Render coordinator started with cache of {cache_size} page(s)");
        let pump = EventPump::new(events_rx, Arc::clone(&shared));
        Ok((
            Self {
                shared,
                worker: Some(worker),
            },
            pump,
        ))
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Stop publishing results. Jobs still queued or decoding are dropped.
    pub fn stop(&self) {
        if !self.shared.stopping.swap(true, Ordering::AcqRel) {
            info!("Render coordinator stopping");
        }
    }

    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.shared.is_stopping()
    }

    /// Take the decode lock for a synchronous decode.
    pub fn lock(&self) -> DecodeGuard<'_> {
        DecodeGuard {
            document: self.shared.document(),
        }
    }

    /// Render `page` at its native orientation and `scale`, without recolor,
    /// blocking until done. The decode lock is not held while allocating.
    pub fn render_blocking(&self, page: usize, scale: f64) -> Result<PixelBuffer, RenderError> {
        let params = DecodeParams::plain(scale);
        let size = {
            let document = self.lock();
            if page >= document.page_count() {
                return Err(RenderError::PageOutOfRange { page });
            }
            document.page_size(page)?
        };

        let mut bitmap = allocate(size, &params)?;
        self.lock().decode_page(page, &mut bitmap, &params)?;
        Ok(bitmap)
    }

    /// Keep `page`'s bitmap while it is off-screen.
    ///
    /// When the cache is full the least recently viewed page is evicted and
    /// a [`RenderEvent::CacheInvalidated`] is posted for it, followed by a
    /// [`RenderEvent::CacheAdded`] for `page`.
    pub fn cache_add(&self, page: usize) -> CacheInsertion {
        let outcome = {
            let mut cache = lock(&self.shared.cache);
            let requests = lock(&self.shared.requests);
            cache.insert(page, |p| view_time_in(&requests, p))
        };

        match outcome {
            CacheInsertion::AlreadyCached => return outcome,
            CacheInsertion::Evicted { evicted, .. } => {
                self.shared
                    .events
                    .notify(RenderEvent::CacheInvalidated { page: evicted });
            }
            CacheInsertion::Inserted { .. } => {}
        }
        self.shared.events.notify(RenderEvent::CacheAdded { page });
        outcome
    }

    #[must_use]
    pub fn is_cached(&self, page: usize) -> bool {
        lock(&self.shared.cache).is_cached(page)
    }

    /// Cached pages in slot order
    #[must_use]
    pub fn cached_pages(&self) -> Vec<usize> {
        lock(&self.shared.cache).pages()
    }

    /// Drop every cached page, posting `CacheInvalidated` for each
    pub fn invalidate_cache(&self) {
        self.shared.invalidate_cache();
    }

    /// Apply a command to the render state
    pub fn apply(&self, cmd: Command) {
        let effects = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(cmd);
        self.execute_effects(effects);
    }

    fn execute_effects(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::InvalidateCache => self.shared.invalidate_cache(),
                Effect::RefreshPages => self.shared.events.notify(RenderEvent::RefreshNeeded),
            }
        }
    }

    #[must_use]
    pub fn render_state(&self) -> RenderState {
        self.shared.render_state()
    }

    #[must_use]
    pub fn view_params(&self) -> ViewParams {
        self.render_state().view
    }

    #[must_use]
    pub fn recolor_enabled(&self) -> bool {
        self.render_state().recolor.enabled
    }

    pub fn enable_recolor(&self, enable: bool) {
        self.apply(Command::EnableRecolor(enable));
    }

    #[must_use]
    pub fn recolor_hue_enabled(&self) -> bool {
        self.render_state().recolor.preserve_hue
    }

    pub fn enable_recolor_hue(&self, enable: bool) {
        self.apply(Command::EnableRecolorHue(enable));
    }

    #[must_use]
    pub fn recolor_reverse_video_enabled(&self) -> bool {
        self.render_state().recolor.reverse_video
    }

    pub fn enable_recolor_reverse_video(&self, enable: bool) {
        self.apply(Command::EnableRecolorReverseVideo(enable));
    }

    /// Current `(light, dark)` palette
    #[must_use]
    pub fn recolor_colors(&self) -> (Color, Color) {
        let recolor = self.render_state().recolor;
        (recolor.light, recolor.dark)
    }

    pub fn set_recolor_colors(&self, light: Color, dark: Color) {
        self.apply(Command::SetRecolorColors {
            light: Some(light),
            dark: Some(dark),
        });
    }

    /// Set the palette from color strings. A color that does not parse is
    /// logged and the previous one kept.
    pub fn set_recolor_colors_str(&self, light: &str, dark: &str) {
        let parse = |name: &str, input: &str| match Color::parse(input) {
            Ok(color) => Some(color),
            Err(e) => {
                warn!("Ignoring recolor {name} color: {e}");
                None
            }
        };
        self.apply(Command::SetRecolorColors {
            light: parse("light", light),
            dark: parse("dark", dark),
        });
    }

    /// Register a callback run after each event is posted, e.g. to wake the
    /// UI event loop.
    pub fn set_waker<F>(&self, waker: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let waker: Waker = Arc::new(waker);
        self.shared.events.set_waker(Some(waker));
    }

    pub fn clear_waker(&self) {
        self.shared.events.set_waker(None);
    }

    #[must_use]
    pub fn stats(&self) -> RenderStats {
        let stats = &self.shared.stats;
        RenderStats {
            submitted: stats.submitted.load(Ordering::Relaxed),
            published: stats.published.load(Ordering::Relaxed),
            discarded: stats.discarded.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        self.stop();
        let _ = self.shared.jobs.send(WorkerMessage::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Render worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for RenderCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCoordinator")
            .field("state", &self.render_state())
            .field("stopping", &self.is_stopping())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
