//! # 数据源与中间模型
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示一次识别请求的图片来源
//! - `RawCapture` 表示平台剪贴板交来的、尚未解码的截图数据
//! - `DecodedImage` 表示已解码、不可变的 RGB 位图

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use image::RgbImage;

use super::ImageError;

/// 识别请求的图片来源。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 本地文件路径，在工作线程中解码。
    FilePath(PathBuf),
    /// 已解码的内存位图（剪贴板或调用方直接提供）。
    Memory(DecodedImage),
}

/// 平台截图数据。
///
/// `bytes` 通常是 `width * height * 4` 的 RGBA 像素；部分平台会带行填充，
/// 也可能直接交出 PNG/BMP 等已编码的字节（此时宽高可能为 0）。
#[derive(Clone)]
pub struct RawCapture {
    pub width: usize,
    pub height: usize,
    pub bytes: Vec<u8>,
}

impl RawCapture {
    pub fn new(width: usize, height: usize, bytes: Vec<u8>) -> Self {
        Self { width, height, bytes }
    }

    /// 截图是否没有任何可用内容。
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for RawCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCapture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// 已解码的 RGB 位图。
///
/// 创建后不可变；内部使用 `Arc` 共享像素，克隆只增加引用计数。
#[derive(Clone)]
pub struct DecodedImage {
    pixels: Arc<RgbImage>,
}

impl DecodedImage {
    /// 包装 RGB 像素，拒绝宽或高为 0 的位图。
    pub fn from_rgb(pixels: RgbImage) -> Result<Self, ImageError> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::Decode(format!("图像尺寸无效：{}x{}", width, height)));
        }
        Ok(Self {
            pixels: Arc::new(pixels),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }
}

impl fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        write!(f, "DecodedImage({}x{} rgb8)", width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_image_rejects_empty_bitmap() {
        let result = DecodedImage::from_rgb(RgbImage::new(0, 10));
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[test]
    fn decoded_image_clone_shares_pixels() {
        let image = DecodedImage::from_rgb(RgbImage::new(4, 3)).expect("valid image");
        let clone = image.clone();
        assert!(Arc::ptr_eq(&image.pixels, &clone.pixels));
        assert_eq!(format!("{:?}", clone), "DecodedImage(4x3 rgb8)");
    }
}
