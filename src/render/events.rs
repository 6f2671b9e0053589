//! Hand-off of render results to the UI thread

use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender};
use log::debug;

use super::coordinator::Shared;
use super::job::{JobState, RenderJob};
use super::types::PixelBuffer;

/// Notifications delivered to the UI thread
#[derive(Clone, Debug)]
pub enum RenderEvent {
    /// A page finished rendering
    Completed {
        page: usize,
        bitmap: Arc<PixelBuffer>,
    },
    /// The page's bitmap should be kept while it is off-screen
    CacheAdded { page: usize },
    /// The page's bitmap may be dropped
    CacheInvalidated { page: usize },
    /// View state changed; visible pages should be requested again
    RefreshNeeded,
}

impl RenderEvent {
    /// Page the event refers to, if any
    #[must_use]
    pub fn page(&self) -> Option<usize> {
        match self {
            Self::Completed { page, .. }
            | Self::CacheAdded { page }
            | Self::CacheInvalidated { page } => Some(*page),
            Self::RefreshNeeded => None,
        }
    }
}

pub(crate) enum UiMessage {
    Completed {
        job: Arc<RenderJob>,
        bitmap: PixelBuffer,
    },
    Notify(RenderEvent),
}

/// Callback run after every message posted to the UI thread
pub type Waker = Arc<dyn Fn() + Send + Sync>;

/// Sending half of the UI channel, usable from any thread
pub(crate) struct EventSender {
    tx: Sender<UiMessage>,
    waker: RwLock<Option<Waker>>,
}

impl EventSender {
    pub(crate) fn new(tx: Sender<UiMessage>) -> Self {
        Self {
            tx,
            waker: RwLock::new(None),
        }
    }

    pub(crate) fn set_waker(&self, waker: Option<Waker>) {
        *self.waker.write().unwrap_or_else(PoisonError::into_inner) = waker;
    }

    /// Queues a message; hands it back if the UI side is gone.
    pub(crate) fn post(&self, msg: UiMessage) -> Result<(), UiMessage> {
        self.tx.send(msg).map_err(|e| e.into_inner())?;
        let waker = self
            .waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(wake) = waker {
            wake();
        }
        Ok(())
    }

    pub(crate) fn notify(&self, event: RenderEvent) {
        if self.post(UiMessage::Notify(event)).is_err() {
            debug!("Event pump is gone, dropping notification");
        }
    }
}

/// Receiving end owned by the UI thread.
///
/// Completed renders are only delivered if their job was not aborted and the
/// coordinator is not stopping, checked at delivery time. Either way the job
/// leaves its request's active set here.
pub struct EventPump {
    rx: Receiver<UiMessage>,
    shared: Arc<Shared>,
}

impl EventPump {
    pub(crate) fn new(rx: Receiver<UiMessage>, shared: Arc<Shared>) -> Self {
        Self { rx, shared }
    }

    /// Drain pending messages without blocking
    pub fn poll(&self) -> Vec<RenderEvent> {
        self.rx
            .try_iter()
            .filter_map(|msg| self.dispatch(msg))
            .collect()
    }

    /// Block until at least one event is deliverable or `timeout` passes,
    /// then drain whatever else is pending.
    pub fn wait(&self, timeout: Duration) -> Vec<RenderEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let msg = match self.rx.recv_deadline(deadline) {
                Ok(msg) => msg,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return Vec::new();
                }
            };

            let mut events: Vec<RenderEvent> = self.dispatch(msg).into_iter().collect();
            events.extend(self.poll());
            if !events.is_empty() {
                return events;
            }
        }
    }

    fn dispatch(&self, msg: UiMessage) -> Option<RenderEvent> {
        match msg {
            UiMessage::Notify(event) => Some(event),
            UiMessage::Completed { job, bitmap } => {
                let page = job.page();
                if job.is_aborted() || self.shared.is_stopping() {
                    debug!("Rendering of page {} aborted", page + 1);
                    job.finish(JobState::Discarded);
                    self.shared.stats.discarded.fetch_add(1, Ordering::Relaxed);
                    return None;
                }

                debug!("Delivering page {}", page + 1);
                job.finish(JobState::Published);
                self.shared.stats.published.fetch_add(1, Ordering::Relaxed);
                Some(RenderEvent::Completed {
                    page,
                    bitmap: Arc::new(bitmap),
                })
            }
        }
    }
}

impl std::fmt::Debug for EventPump {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPump")
            .field("pending", &self.rx.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderCoordinator;
    use crate::render::job::JobId;
    use crate::render::request::RequestState;
    use crate::render::types::PageInfo;
    use crate::test_utils::SyntheticDocument;

    fn completed(page: usize) -> (Arc<RenderJob>, UiMessage) {
        let request = Arc::new(RequestState::new(PageInfo::new(page, 10.0, 10.0)));
        let job = Arc::new(RenderJob::new(JobId(page as u64), Arc::clone(&request)));
        request.add_job(Arc::clone(&job));
        let bitmap = PixelBuffer::try_new(1, 1).expect("tiny bitmap");
        (Arc::clone(&job), UiMessage::Completed { job, bitmap })
    }

    #[test]
    fn abort_after_post_is_not_delivered() {
        let (coordinator, pump) =
            RenderCoordinator::new(SyntheticDocument::new(3, 10.0, 10.0), 4).expect("coordinator");

        let (job, msg) = completed(1);
        assert!(coordinator.shared().events.post(msg).is_ok());
        job.abort();

        assert!(pump.poll().is_empty());
        assert_eq!(job.state(), JobState::Discarded);
        assert_eq!(job.request.active_job_count(), 0);
        assert_eq!(coordinator.stats().discarded, 1);
    }

    #[test]
    fn completion_is_delivered_and_released() {
        let (coordinator, pump) =
            RenderCoordinator::new(SyntheticDocument::new(3, 10.0, 10.0), 4).expect("coordinator");

        let (job, msg) = completed(2);
        assert!(coordinator.shared().events.post(msg).is_ok());

        let events = pump.wait(Duration::from_secs(1));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RenderEvent::Completed { page: 2, .. }));
        assert_eq!(job.state(), JobState::Published);
        assert_eq!(job.request.active_job_count(), 0);
    }

    #[test]
    fn stopping_discards_completions() {
        let (coordinator, pump) =
            RenderCoordinator::new(SyntheticDocument::new(3, 10.0, 10.0), 4).expect("coordinator");

        let (job, msg) = completed(0);
        assert!(coordinator.shared().events.post(msg).is_ok());
        coordinator.stop();

        assert!(pump.poll().is_empty());
        assert_eq!(job.state(), JobState::Discarded);
    }

    #[test]
    fn waker_runs_after_post() {
        let (coordinator, pump) =
            RenderCoordinator::new(SyntheticDocument::new(1, 10.0, 10.0), 4).expect("coordinator");
        let (tx, rx) = flume::unbounded();
        coordinator.set_waker(move || {
            let _ = tx.send(());
        });

        coordinator
            .shared()
            .events
            .notify(RenderEvent::RefreshNeeded);

        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        let events = pump.poll();
        assert!(matches!(events.as_slice(), [RenderEvent::RefreshNeeded]));
    }

    #[test]
    fn wait_times_out_when_idle() {
        let (_coordinator, pump) =
            RenderCoordinator::new(SyntheticDocument::new(1, 10.0, 10.0), 4).expect("coordinator");
        assert!(pump.wait(Duration::from_millis(20)).is_empty());
    }
}
