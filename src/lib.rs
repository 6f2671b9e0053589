//! Asynchronous page rendering for document viewers.
//!
//! A [`RenderCoordinator`] owns one background worker that rasterizes pages
//! through a [`PageSource`], recolors them if asked to, and hands the bitmaps
//! to the UI thread through an [`EventPump`]. Pages are requested through
//! per-page [`RenderRequest`]s, which keep at most one live job each.

pub mod logging;
pub mod render;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use render::{
    Color, EventPump, PageInfo, PageSource, PixelBuffer, RenderCoordinator, RenderError,
    RenderEvent, RenderRequest, ViewTime,
};
