//! Asynchronous page rendering infrastructure

mod cache;
mod color;
mod coordinator;
mod document;
mod error;
mod events;
mod job;
mod recolor;
mod request;
mod state;
mod types;
mod worker;

/// Number of off-screen pages kept by default
pub const DEFAULT_CACHE_SIZE: usize = 15;

pub use cache::{CacheInsertion, PageCache};
pub use color::{Color, ColorParseError, LIGHTNESS_WEIGHTS};
pub use coordinator::{DecodeGuard, RenderCoordinator, RenderStats};
pub use document::PageSource;
pub use error::RenderError;
pub use events::{EventPump, RenderEvent, Waker};
pub use job::{JobId, JobQueue, JobState, RenderJob};
pub use recolor::{RecolorConfig, RecolorEngine, recolor};
pub use request::RenderRequest;
pub use state::{Command, Effect, RenderState, ZOOM_MAX, ZOOM_MIN};
pub use types::*;
