//! Render errors

/// Errors raised while producing a page bitmap.
///
/// None of these reach the user: the worker logs them and drops the job,
/// leaving the page in its pending state.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("cannot allocate {width}x{height} pixel buffer")]
    Allocation { width: u32, height: u32 },

    #[error("cannot allocate page cache of {capacity} slots")]
    CacheAllocation { capacity: usize },

    #[error("invalid bitmap geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("page {page} is out of range")]
    PageOutOfRange { page: usize },

    #[error("decoding page {page} failed: {detail}")]
    Decode { page: usize, detail: String },

    #[error("cannot start render worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl RenderError {
    pub fn decode(page: usize, detail: impl Into<String>) -> Self {
        Self::Decode {
            page,
            detail: detail.into(),
        }
    }
}
