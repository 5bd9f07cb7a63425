pub mod fetcher;
pub mod orchestrator;
pub mod placement;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use fetcher::{FetchPermits, HttpImageSource, ImageFetcher};
pub use orchestrator::FetchOrchestrator;
pub use placement::{Placement, center_in_cell};

use std::time::Duration;
use thiserror::Error;

/// Largest box an image may occupy after the resize step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetBox {
    pub max_width: u32,
    pub max_height: u32,
}

/// Pixel size of the worksheet area an image is centered within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBox {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpscalePolicy {
    #[default]
    Never,
    Allow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransparencyPolicy {
    /// Keep RGBA when the source carries alpha, otherwise flatten to RGB.
    #[default]
    Preserve,
    /// Always emit opaque RGB.
    Flatten,
}

/// Everything the pipeline needs to know about one call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProfile {
    pub name: &'static str,
    pub target: TargetBox,
    pub cell: CellBox,
    pub upscale: UpscalePolicy,
    pub transparency: TransparencyPolicy,
}

// Target boxes leave a margin inside their cells so offsets stay positive.
pub const PRODUCT_PROFILE: ImageProfile = ImageProfile {
    name: "product",
    target: TargetBox {
        max_width: 180,
        max_height: 130,
    },
    cell: CellBox {
        width: 210,
        height: 160,
    },
    upscale: UpscalePolicy::Never,
    transparency: TransparencyPolicy::Preserve,
};

pub const LOGO_PROFILE: ImageProfile = ImageProfile {
    name: "logo",
    target: TargetBox {
        max_width: 180,
        max_height: 100,
    },
    cell: CellBox {
        width: 210,
        height: 165,
    },
    upscale: UpscalePolicy::Never,
    transparency: TransparencyPolicy::Preserve,
};

impl ImageProfile {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "product" | "catalog" => Some(PRODUCT_PROFILE),
            "logo" | "header" => Some(LOGO_PROFILE),
            _ => None,
        }
    }
}

/// A resized, re-encoded PNG ready for insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

impl MediaError {
    /// Short machine-readable label used in logs and stage payloads.
    pub fn code(&self) -> &'static str {
        match self {
            MediaError::InvalidReference(_) => "invalid_reference",
            MediaError::Fetch(_) => "fetch_failure",
            MediaError::Decode(_) => "decode_failure",
            MediaError::Encode(_) => "encode_failure",
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("permit pool closed")]
    PoolClosed,
}

/// Outcome of one fetch: an image, or an absence with an optional cause.
/// A missing reference is absent without a cause.
#[derive(Debug)]
pub enum FetchResult {
    Image(ProcessedImage),
    Absent(Option<MediaError>),
}

impl FetchResult {
    pub fn image(&self) -> Option<&ProcessedImage> {
        match self {
            FetchResult::Image(image) => Some(image),
            FetchResult::Absent(_) => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, FetchResult::Image(_))
    }

    pub fn cause(&self) -> Option<&MediaError> {
        match self {
            FetchResult::Absent(cause) => cause.as_ref(),
            FetchResult::Image(_) => None,
        }
    }
}

/// One index-aligned entry of the orchestrator output.
#[derive(Debug)]
pub struct MediaSlot {
    pub result: FetchResult,
    pub placement: Option<Placement>,
}

impl MediaSlot {
    pub fn new(result: FetchResult, cell: CellBox) -> Self {
        let placement = center_in_cell(&result, cell);
        Self { result, placement }
    }

    pub fn absent(cause: Option<MediaError>) -> Self {
        Self {
            result: FetchResult::Absent(cause),
            placement: None,
        }
    }
}
