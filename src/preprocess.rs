use std::io::Cursor;

use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::DynamicImage;
use ndarray::Array4;

use crate::error::PredictError;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PredictError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PredictError::Decode(e.to_string()))?
        .decode()
        .map_err(|e| PredictError::Decode(e.to_string()))
}

/// Resizes to `(width, height)` and lays the RGB pixels out as a
/// `[1, height, width, 3]` batch. With `scale` set, values land in [0, 1],
/// otherwise they stay in [0, 255].
pub fn to_batch(
    img: &DynamicImage,
    (width, height): (u32, u32),
    scale: bool,
) -> Result<Array4<f32>, PredictError> {
    if width == 0 || height == 0 {
        return Err(PredictError::Preprocess(format!(
            "invalid target size {}x{}",
            width, height
        )));
    }

    let rgb = img.to_rgb8();
    let resized = image::imageops::resize(&rgb, width, height, FilterType::Lanczos3);

    let values: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| if scale { v as f32 / 255.0 } else { v as f32 })
        .collect();

    Array4::from_shape_vec((1, height as usize, width as usize, 3), values)
        .map_err(|e| PredictError::Preprocess(e.to_string()))
}
