//! # 图像指纹模块
//!
//! 指纹只用于“剪贴板内容是否变化”的廉价判等，不承担安全职责。
//! 计算流程：等比缩小到指纹包围盒内 → 转灰度 → 对尺寸与灰度字节做 MD5。
//! 指纹只依赖像素内容，与对象地址无关。

use std::fmt;

use image::DynamicImage;

use super::codec::resize_rgb;
use super::config::fit_within;
use super::{DecodedImage, ImageConfig, ImageError};

/// 128 位内容指纹。
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

#[derive(Debug, Clone)]
pub struct ImageHasher {
    max_side: u32,
    filter: image::imageops::FilterType,
}

impl Default for ImageHasher {
    fn default() -> Self {
        Self::from_config(&ImageConfig::default())
    }
}

impl ImageHasher {
    pub fn from_config(config: &ImageConfig) -> Self {
        Self {
            max_side: config.fingerprint_max_side.max(1),
            filter: config.resize_filter,
        }
    }

    /// 计算位图指纹。
    ///
    /// 相同像素与尺寸总是得到相同指纹；缩放失败视为硬错误，不做任何退化处理。
    pub fn fingerprint(&self, image: &DecodedImage) -> Result<Fingerprint, ImageError> {
        let (width, height) = image.dimensions();
        let small = match fit_within(width, height, self.max_side, self.max_side) {
            Some((w, h)) => resize_rgb(image.as_rgb(), w, h, self.filter)?,
            None => image.as_rgb().clone(),
        };

        let gray = DynamicImage::ImageRgb8(small).to_luma8();
        let (gray_width, gray_height) = gray.dimensions();

        let mut context = md5::Context::new();
        context.consume(gray_width.to_le_bytes());
        context.consume(gray_height.to_le_bytes());
        context.consume(gray.as_raw());
        Ok(Fingerprint(context.compute().0))
    }
}
