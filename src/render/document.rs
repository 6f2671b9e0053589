//! Contract of the format-specific page decoder

use super::error::RenderError;
use super::types::{DecodeParams, PageRect, PageSize, PixelBuffer};

/// A decoded document the renderer can rasterize pages from.
///
/// Implementations wrap a format backend (PDF, DjVu, ...) that is assumed
/// not to be reentrant. The coordinator keeps the source behind its decode
/// lock, so methods take `&mut self` and are never called concurrently.
pub trait PageSource: Send {
    fn page_count(&self) -> usize;

    /// Page size in points
    fn page_size(&self, page: usize) -> Result<PageSize, RenderError>;

    /// Draws `page` onto `target`, which is already sized for `params` and
    /// pre-filled with opaque white.
    fn decode_page(
        &mut self,
        page: usize,
        target: &mut PixelBuffer,
        params: &DecodeParams,
    ) -> Result<(), RenderError>;

    /// Bounding boxes of embedded raster images, in page points.
    fn image_regions(&mut self, _page: usize) -> Result<Vec<PageRect>, RenderError> {
        Ok(Vec::new())
    }
}
