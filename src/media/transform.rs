use super::{ImageProfile, MediaError, ProcessedImage, TargetBox, TransparencyPolicy, UpscalePolicy};
use image::{
    DynamicImage, RgbaImage,
    codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder},
    imageops::FilterType,
};

/// Decode `bytes`, fit them inside the profile's target box and re-encode as PNG.
///
/// Aspect ratio is preserved. Alpha survives only when the profile preserves
/// transparency and at least one source pixel is not fully opaque. GIF always
/// decodes to RGBA, even without a transparent index.
pub fn fit_to_box(bytes: &[u8], profile: &ImageProfile) -> Result<ProcessedImage, MediaError> {
    let decoded =
        image::load_from_memory(bytes).map_err(|err| MediaError::Decode(err.to_string()))?;

    let preserve = matches!(profile.transparency, TransparencyPolicy::Preserve);
    let normalized = match preserve.then(|| translucent_rgba(&decoded)).flatten() {
        Some(rgba) => DynamicImage::ImageRgba8(rgba),
        None => DynamicImage::ImageRgb8(decoded.to_rgb8()),
    };

    let (width, height) = fitted_dimensions(
        normalized.width(),
        normalized.height(),
        profile.target,
        profile.upscale,
    )
    .ok_or_else(|| MediaError::Decode("image has zero width or height".into()))?;

    let resized = if (width, height) == (normalized.width(), normalized.height()) {
        normalized
    } else {
        normalized.resize_exact(width, height, FilterType::Lanczos3)
    };

    let mut png = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut png, CompressionType::Best, PngFilter::Adaptive);
    resized
        .write_with_encoder(encoder)
        .map_err(|err| MediaError::Encode(err.to_string()))?;

    Ok(ProcessedImage { png, width, height })
}

/// RGBA pixels of `image` when it has an alpha channel that is actually used.
fn translucent_rgba(image: &DynamicImage) -> Option<RgbaImage> {
    if !image.color().has_alpha() {
        return None;
    }
    let rgba = image.to_rgba8();
    rgba.pixels().any(|pixel| pixel.0[3] < u8::MAX).then_some(rgba)
}

/// Final dimensions for a `width`×`height` source inside `target`.
///
/// Returns `None` for degenerate sources or boxes.
pub fn fitted_dimensions(
    width: u32,
    height: u32,
    target: TargetBox,
    upscale: UpscalePolicy,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 || target.max_width == 0 || target.max_height == 0 {
        return None;
    }
    let mut scale = f64::min(
        f64::from(target.max_width) / f64::from(width),
        f64::from(target.max_height) / f64::from(height),
    );
    if upscale == UpscalePolicy::Never {
        scale = scale.min(1.0);
    }
    let scaled = |side: u32, bound: u32| -> u32 {
        let value = (f64::from(side) * scale).round() as u32;
        value.clamp(1, bound)
    };
    Some((
        scaled(width, target.max_width),
        scaled(height, target.max_height),
    ))
}
