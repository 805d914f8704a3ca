//! Image preprocessing
//!
//! Must mirror the training pipeline exactly: RGB, bilinear resize to
//! 224x224, raw 0-255 intensities (the exported graph rescales by 1/255
//! itself), NHWC layout with a batch dimension of 1.

use agrovision_core::{Error, Result};
use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::DynamicImage;

/// Square input resolution the model was trained on
pub const INPUT_SIZE: u32 = 224;

/// Colour channels fed to the model
pub const CHANNELS: usize = 3;

/// Resize filter; `Triangle` is bilinear, matching the training loader
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Multiplier applied to 8-bit intensities
pub const INTENSITY_SCALE: f32 = 1.0;

/// Batch shape produced by [`to_input_tensor`]
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE as usize, INPUT_SIZE as usize, CHANNELS];

/// Decode image bytes (PNG, JPEG, GIF, BMP, TIFF)
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| Error::preprocessing(format!("Failed to decode image: {}", e)))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(Error::preprocessing("Image has no pixels"));
    }

    Ok(image)
}

/// Convert a decoded image into a `[1, 224, 224, 3]` f32 tensor
pub fn to_input_tensor(image: &DynamicImage, device: &Device) -> Result<Tensor> {
    let rgb = image.to_rgb8();
    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, RESIZE_FILTER);

    let data: Vec<f32> = resized
        .into_raw()
        .into_iter()
        .map(|v| v as f32 * INTENSITY_SCALE)
        .collect();

    Tensor::from_vec(data, INPUT_SHAPE.as_slice(), device)
        .map_err(|e| Error::preprocessing(format!("Failed to build input tensor: {}", e)))
}

/// Decode and preprocess in one step
pub fn preprocess_bytes(bytes: &[u8], device: &Device) -> Result<Tensor> {
    let image = decode(bytes)?;
    to_input_tensor(&image, device)
}
