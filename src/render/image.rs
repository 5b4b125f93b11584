//! Image binding: aspect-fit replacement
//!
//! The result is either rendered image bytes directly, or a tabular result
//! whose selected slice is a URL to fetch. The new image is scaled to fit
//! the element's designed bounding box while preserving aspect ratio, then
//! centered within that box, so layout survives whatever native
//! resolution the backend rendered.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::GenericImageView;
use tracing::debug;

use crate::client::{QueryService, RawResult};
use crate::document::{Content, Deck, Frame, ImageFrame};
use crate::element::BoundElement;
use crate::error::LookdeckError;
use crate::normalize::normalize;

use super::select_scalar;

pub async fn bind_image(
    deck: &mut Deck,
    bound: &BoundElement,
    raw: &RawResult,
    service: &dyn QueryService,
) -> Result<(), LookdeckError> {
    let bytes: Vec<u8> = match raw {
        RawResult::Binary(bytes) => bytes.clone(),
        RawResult::Tabular(value) => {
            let result = normalize(value);
            let url = select_scalar(&result, &bound.spec).ok_or_else(|| {
                LookdeckError::Render("no image URL in the selected result slice".to_string())
            })?;
            debug!("fetching image from result-derived URL {url}");
            service
                .fetch_bytes(&url)
                .await
                .map_err(|e| LookdeckError::Render(format!("image download failed: {e:#}")))?
        }
    };

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| LookdeckError::Render(format!("result is not a decodable image: {e}")))?;
    let (native_w, native_h) = decoded.dimensions();
    if native_w == 0 || native_h == 0 {
        return Err(LookdeckError::Render("image has zero dimensions".to_string()));
    }

    let element = deck
        .element_mut(bound.element.slide, bound.element.element_id)
        .ok_or_else(|| LookdeckError::Render("bound element no longer in deck".to_string()))?;

    let fitted = aspect_fit(bound.element.frame, native_w, native_h);
    element.frame = fitted;
    element.content = Content::Image(ImageFrame {
        data: Some(BASE64.encode(&bytes)),
        native_width: Some(native_w),
        native_height: Some(native_h),
    });
    Ok(())
}

/// Scale `(w, h)` to fit inside `frame` preserving aspect ratio, centered.
/// Scale factor is the smaller of the width and height ratios; the unused
/// box dimension is split evenly on both sides.
pub fn aspect_fit(frame: Frame, w: u32, h: u32) -> Frame {
    let scale = (frame.width / w as f64).min(frame.height / h as f64);
    let new_w = w as f64 * scale;
    let new_h = h as f64 * scale;
    Frame {
        left: frame.left + (frame.width - new_w) / 2.0,
        top: frame.top + (frame.height - new_h) / 2.0,
        width: new_w,
        height: new_h,
    }
}
