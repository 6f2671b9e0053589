//! Deterministic document for exercising the renderer in tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};

use crate::render::{
    DecodeParams, PageInfo, PageRect, PageSize, PageSource, PixelBuffer, RenderError,
};

/// Color of the ink block drawn on every page
pub const INK: [u8; 4] = [0, 0, 0, 255];

/// One call to [`PageSource::decode_page`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodeRecord {
    pub page: usize,
    pub width: u32,
    pub height: u32,
    pub params: DecodeParams,
}

/// Shared log of decode calls, in call order
#[derive(Clone, Debug, Default)]
pub struct DecodeLog(Arc<Mutex<Vec<DecodeRecord>>>);

impl DecodeLog {
    fn push(&self, record: DecodeRecord) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn records(&self) -> Vec<DecodeRecord> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pages(&self) -> Vec<usize> {
        self.records().iter().map(|r| r.page).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll until at least `count` decodes were logged
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.len() < count {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        true
    }
}

struct Gate {
    started: Sender<usize>,
    release: Receiver<()>,
}

/// Test-side handle of a gated page
pub struct GateHandle {
    started: Receiver<usize>,
    release: Sender<()>,
}

impl GateHandle {
    /// Wait until the worker is blocked inside the gated decode
    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.started.recv_timeout(timeout).is_ok()
    }

    /// Let one blocked decode finish
    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

/// A document of blank pages with a black block in the top-left quarter.
///
/// Pages can be gated (the decode blocks until released), made to fail a
/// number of times, or given image regions.
pub struct SyntheticDocument {
    pages: Vec<PageSize>,
    gates: HashMap<usize, Gate>,
    failures: HashMap<usize, usize>,
    images: HashMap<usize, Vec<PageRect>>,
    log: DecodeLog,
}

impl SyntheticDocument {
    pub fn new(page_count: usize, width: f64, height: f64) -> Self {
        Self::with_pages(vec![PageSize::new(width, height); page_count])
    }

    pub fn with_pages(pages: Vec<PageSize>) -> Self {
        Self {
            pages,
            gates: HashMap::new(),
            failures: HashMap::new(),
            images: HashMap::new(),
            log: DecodeLog::default(),
        }
    }

    /// Fail the next `times` decodes of `page`
    pub fn fail_times(mut self, page: usize, times: usize) -> Self {
        self.failures.insert(page, times);
        self
    }

    pub fn with_images(mut self, page: usize, images: Vec<PageRect>) -> Self {
        self.images.insert(page, images);
        self
    }

    /// Block every decode of `page` until the returned handle releases it
    pub fn gate(&mut self, page: usize) -> GateHandle {
        let (started_tx, started_rx) = flume::unbounded();
        let (release_tx, release_rx) = flume::unbounded();
        self.gates.insert(
            page,
            Gate {
                started: started_tx,
                release: release_rx,
            },
        );
        GateHandle {
            started: started_rx,
            release: release_tx,
        }
    }

    pub fn decode_log(&self) -> DecodeLog {
        self.log.clone()
    }

    /// Page info as a UI would build it
    pub fn page_info(&self, page: usize) -> PageInfo {
        let size = self.pages[page];
        PageInfo::new(page, size.width, size.height)
    }
}

impl PageSource for SyntheticDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        self.pages
            .get(page)
            .copied()
            .ok_or(RenderError::PageOutOfRange { page })
    }

    fn decode_page(
        &mut self,
        page: usize,
        target: &mut PixelBuffer,
        params: &DecodeParams,
    ) -> Result<(), RenderError> {
        if page >= self.pages.len() {
            return Err(RenderError::PageOutOfRange { page });
        }
        self.log.push(DecodeRecord {
            page,
            width: target.width(),
            height: target.height(),
            params: *params,
        });

        if let Some(gate) = self.gates.get(&page) {
            let _ = gate.started.send(page);
            let _ = gate.release.recv();
        }

        if let Some(remaining) = self.failures.get_mut(&page) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RenderError::decode(page, "synthetic failure"));
            }
        }

        for y in 0..target.height() / 2 {
            for x in 0..target.width() / 2 {
                target.set_pixel(x, y, INK);
            }
        }
        Ok(())
    }

    fn image_regions(&mut self, page: usize) -> Result<Vec<PageRect>, RenderError> {
        Ok(self.images.get(&page).cloned().unwrap_or_default())
    }
}
