use std::io::Cursor;

use anyhow::{Context, Result};
use base64::{prelude::BASE64_STANDARD, Engine};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Tensor};
use image::DynamicImage;

use crate::DeviceMap;

pub fn select_best_device(device_map: DeviceMap) -> Result<Device> {
    let device = match device_map {
        DeviceMap::ForceCpu => Device::Cpu,
        DeviceMap::Ordinal(ordinal) if cuda_is_available() => Device::new_cuda(ordinal)?,
        DeviceMap::Ordinal(ordinal) if metal_is_available() => Device::new_metal(ordinal)?,
        DeviceMap::Ordinal(_) => {
            #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
            {
                tracing::warn!("running on CPU, build with `--features metal` to run on the GPU");
            }
            #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
            {
                tracing::warn!("running on CPU, build with `--features cuda` to run on the GPU");
            }
            Device::Cpu
        }
    };
    tracing::info!(device = ?device, "selected compute device");
    Ok(device)
}

/// Converts a u8 tensor with shape (3, height, width) into an RGB image.
pub fn tensor_to_image(img: &Tensor) -> Result<DynamicImage> {
    let (channels, height, width) = img.dims3()?;
    if channels != 3 {
        anyhow::bail!("tensor_to_image expects an image with 3 channels, got {channels}");
    }
    let img = img.permute((1, 2, 0))?.flatten_all()?;
    let pixels = img.to_vec1::<u8>()?;
    let buffer = image::ImageBuffer::from_raw(width as u32, height as u32, pixels)
        .context("error converting tensor to image buffer")?;
    Ok(DynamicImage::ImageRgb8(buffer))
}

/// Encodes an image as PNG in memory and returns it as standard base64.
pub fn image_to_base64_png(img: &DynamicImage) -> Result<String> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .context("failed to encode image as PNG")?;
    Ok(BASE64_STANDARD.encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    #[test]
    fn force_cpu_selects_cpu() {
        let device = select_best_device(DeviceMap::ForceCpu).unwrap();
        assert!(device.is_cpu());
    }

    #[test]
    fn tensor_channels_become_rgb_pixels() {
        // red plane, green plane, blue plane for a 2x1 image
        let data: Vec<u8> = vec![255, 10, 0, 20, 0, 30];
        let tensor = Tensor::from_vec(data, (3, 1, 2), &Device::Cpu).unwrap();
        let img = tensor_to_image(&tensor).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (2, 1));
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [10, 20, 30]);
    }

    #[test]
    fn rejects_non_rgb_tensors() {
        let tensor = Tensor::zeros((1, 4, 4), DType::U8, &Device::Cpu).unwrap();
        assert!(tensor_to_image(&tensor).is_err());
    }

    #[test]
    fn base64_png_is_lossless() {
        let mut buffer = image::RgbImage::new(7, 5);
        for (x, y, pixel) in buffer.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x * 30) as u8, (y * 50) as u8, (x + y) as u8]);
        }
        let original = DynamicImage::ImageRgb8(buffer);

        let encoded = image_to_base64_png(&original).unwrap();
        let bytes = BASE64_STANDARD.decode(encoded).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Png);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), original.to_rgb8());
    }
}
