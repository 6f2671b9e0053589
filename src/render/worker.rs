//! Render worker - runs in its own thread

use std::sync::Arc;
use std::sync::atomic::Ordering;

use flume::Receiver;
use log::{debug, error, warn};

use super::coordinator::{Shared, WorkerMessage};
use super::error::RenderError;
use super::events::UiMessage;
use super::job::{JobQueue, JobState, RenderJob};
use super::recolor::RecolorConfig;
use super::types::{DecodeParams, PageRect, PageSize, PixelBuffer, PixelRect};

const BACKGROUND: [u8; 4] = [255, 255, 255, 255];

/// Bitmap dimensions for a page at the given parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RasterSpec {
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl RasterSpec {
    /// Page size scaled and rounded, swapped for sideways rotations, then
    /// multiplied by the device factors.
    pub(crate) fn compute(size: PageSize, params: &DecodeParams) -> Self {
        let mut width = (size.width * params.scale).round();
        let mut height = (size.height * params.scale).round();
        if params.rotation.is_sideways() {
            std::mem::swap(&mut width, &mut height);
        }

        Self {
            width: (width * params.device_factors.x).round().max(0.0) as u32,
            height: (height * params.device_factors.y).round().max(0.0) as u32,
        }
    }
}

/// Worker loop: collects every pending message, then renders the most
/// urgent job. Exits on `Shutdown` or when all senders are gone.
pub(crate) fn render_worker(shared: &Arc<Shared>, inbox: &Receiver<WorkerMessage>) {
    let mut queue = JobQueue::new();

    'outer: loop {
        if queue.is_empty() {
            match inbox.recv() {
                Ok(WorkerMessage::Job(job)) => queue.push(job),
                Ok(WorkerMessage::Shutdown) | Err(_) => break,
            }
        }
        for msg in inbox.try_iter() {
            match msg {
                WorkerMessage::Job(job) => queue.push(job),
                WorkerMessage::Shutdown => break 'outer,
            }
        }

        if let Some(job) = queue.pop() {
            run_job(shared, &job);
        }
    }

    let leftovers: Vec<Arc<RenderJob>> = queue
        .drain()
        .into_iter()
        .chain(inbox.try_iter().filter_map(|msg| match msg {
            WorkerMessage::Job(job) => Some(job),
            WorkerMessage::Shutdown => None,
        }))
        .collect();
    debug!("Render worker exiting, dropping {} job(s)", leftovers.len());
    for job in leftovers {
        discard(shared, &job);
    }
}

fn discard(shared: &Shared, job: &Arc<RenderJob>) {
    job.finish(JobState::Discarded);
    shared.stats.discarded.fetch_add(1, Ordering::Relaxed);
}

fn should_stop(shared: &Shared, job: &RenderJob) -> bool {
    job.is_aborted() || shared.is_stopping()
}

fn run_job(shared: &Shared, job: &Arc<RenderJob>) {
    let page = job.page();
    if should_stop(shared, job) {
        debug!("Rendering of page {} aborted before decode", page + 1);
        discard(shared, job);
        return;
    }

    job.set_state(JobState::Running);
    debug!("Rendering page {} ...", page + 1);

    match render(shared, job) {
        Ok(Some(bitmap)) => {
            let msg = UiMessage::Completed {
                job: Arc::clone(job),
                bitmap,
            };
            if shared.events.post(msg).is_err() {
                debug!("Event pump is gone, dropping page {}", page + 1);
                discard(shared, job);
            }
        }
        Ok(None) => {
            debug!("Rendering of page {} aborted", page + 1);
            discard(shared, job);
        }
        Err(e) => {
            error!("Rendering failed (page {}): {e}", page + 1);
            job.finish(JobState::Discarded);
            shared.stats.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Decodes and recolors one page. `Ok(None)` means the job was aborted
/// while decoding.
fn render(shared: &Shared, job: &RenderJob) -> Result<Option<PixelBuffer>, RenderError> {
    let request = &job.request;
    let page = request.page;
    let plain = request.render_plain();

    let view = shared.render_state().view;
    let params = if plain {
        DecodeParams::plain(1.0)
    } else {
        DecodeParams {
            scale: view.scale(),
            rotation: view.rotation,
            device_factors: view.device_factors,
        }
    };

    let mut bitmap = allocate(page.size, &params)?;
    let (recolor, images) = {
        let mut document = shared.document();
        document.decode_page(page.index, &mut bitmap, &params)?;

        // Recolor settings may have changed while decoding.
        let config = shared.render_state().recolor;
        let recolor = (!plain && config.enabled).then_some(config);
        let images = match recolor {
            Some(RecolorConfig {
                reverse_video: true,
                ..
            }) => document.image_regions(page.index).unwrap_or_else(|e| {
                warn!("Failed to retrieve images of page {}: {e}", page.index + 1);
                Vec::new()
            }),
            _ => Vec::new(),
        };
        (recolor, images)
    };

    if should_stop(shared, job) {
        return Ok(None);
    }

    if let Some(config) = recolor {
        let regions = image_pixels(&images, page.size, &params, &bitmap);
        config
            .engine()
            .apply(&mut bitmap, config.reverse_video, &regions);
    }
    Ok(Some(bitmap))
}

/// Allocates a white bitmap sized for `params`
pub(crate) fn allocate(size: PageSize, params: &DecodeParams) -> Result<PixelBuffer, RenderError> {
    let raster = RasterSpec::compute(size, params);
    let mut bitmap = PixelBuffer::try_new(raster.width, raster.height)?;
    bitmap.fill(BACKGROUND);
    bitmap.device_scale = params.device_factors;
    Ok(bitmap)
}

fn image_pixels(
    images: &[PageRect],
    page: PageSize,
    params: &DecodeParams,
    bitmap: &PixelBuffer,
) -> Vec<PixelRect> {
    images
        .iter()
        .filter_map(|rect| rect.to_pixels(page, params, bitmap.width(), bitmap.height()))
        .collect()
}
