//! # 截图解码模块
//!
//! ## 设计思路
//!
//! 平台剪贴板交来的截图并不总是“规整”的 RGBA：有的带行填充，有的共享内存读取失败，
//! 有的直接是 PNG/BMP 字节。这里将解码拆成一组按优先级排列的策略，依次尝试，
//! 任一成功即返回；全部失败才报告 `ImageError::Decode`。
//!
//! 默认顺序：
//! 1. `DirectConvert`：按 `width * height * 4` 直接构建 RGBA 再转 RGB
//! 2. `PixelExtraction`：按行跨度逐像素提取，容忍行尾填充
//! 3. `TempFileRoundTrip`：写入临时文件后重新打开（适用于已编码字节），文件在所有路径上都会被删除
//!
//! 所有策略的输出都是 RGB8，像素总数受 `ImageConfig::max_decoded_pixels` 约束。

use std::io::Write;
use std::path::PathBuf;

use image::{DynamicImage, ImageReader, RgbImage, RgbaImage};

use super::codec::validate_image_signature;
use super::{DecodedImage, ImageConfig, ImageError, RawCapture};

/// 单个截图解码策略。
pub trait DecodeStrategy: Send + Sync {
    /// 策略名称（用于日志）。
    fn name(&self) -> &'static str;

    fn decode(&self, capture: &RawCapture) -> Result<RgbImage, ImageError>;
}

/// 按优先级尝试多个策略的截图解码器。
pub struct CaptureDecoder {
    strategies: Vec<Box<dyn DecodeStrategy>>,
    max_pixels: u64,
}

impl Default for CaptureDecoder {
    fn default() -> Self {
        Self::from_config(&ImageConfig::default())
    }
}

impl CaptureDecoder {
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>) -> Self {
        Self {
            strategies,
            max_pixels: ImageConfig::default().max_decoded_pixels,
        }
    }

    /// 默认策略顺序，像素上限取自配置。
    pub fn from_config(config: &ImageConfig) -> Self {
        Self::new(vec![
            Box::new(DirectConvert),
            Box::new(PixelExtraction),
            Box::new(TempFileRoundTrip::default()),
        ])
        .with_max_pixels(config.max_decoded_pixels)
    }

    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    /// 依次尝试各策略，返回第一个成功的结果。
    ///
    /// 声明尺寸超出像素上限时直接拒绝，不进入任何策略；
    /// 已编码字节（尺寸未知）则在解码后再检查一次。
    pub fn decode(&self, capture: &RawCapture) -> Result<DecodedImage, ImageError> {
        if capture.is_empty() {
            return Err(ImageError::Decode("截图数据为空".to_string()));
        }
        self.check_pixel_limit(capture.width as u64, capture.height as u64)?;

        let mut failures = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.decode(capture).and_then(DecodedImage::from_rgb) {
                Ok(image) => {
                    let (width, height) = image.dimensions();
                    self.check_pixel_limit(width as u64, height as u64)?;
                    if !failures.is_empty() {
                        log::info!("🔁 截图已通过回退策略 {} 解码", strategy.name());
                    }
                    return Ok(image);
                }
                Err(err) => {
                    log::warn!(
                        "⚠️ 截图解码策略 {} 失败 [{}]：{}",
                        strategy.name(),
                        err.code(),
                        err
                    );
                    failures.push(format!("{}: {}", strategy.name(), err));
                }
            }
        }

        Err(ImageError::Decode(format!(
            "无法转换图像（{}）",
            failures.join("; ")
        )))
    }

    fn check_pixel_limit(&self, width: u64, height: u64) -> Result<(), ImageError> {
        let pixels = width
            .checked_mul(height)
            .ok_or_else(|| ImageError::ResourceLimit("截图像素数溢出".to_string()))?;
        if pixels > self.max_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "截图像素过大：{} 像素（限制：{} 像素）",
                pixels, self.max_pixels
            )));
        }
        Ok(())
    }
}

/// 像素数据按紧凑 RGBA 排列时的直接转换。
pub struct DirectConvert;

impl DecodeStrategy for DirectConvert {
    fn name(&self) -> &'static str {
        "direct-convert"
    }

    fn decode(&self, capture: &RawCapture) -> Result<RgbImage, ImageError> {
        let (width, height) = checked_dimensions(capture)?;
        let mismatch = || {
            ImageError::Decode(format!(
                "像素长度 {} 与 {}x{} RGBA 不匹配",
                capture.bytes.len(),
                width,
                height
            ))
        };

        let expected_len = capture
            .width
            .checked_mul(capture.height)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("截图尺寸导致内存溢出风险".to_string()))?;
        if capture.bytes.len() != expected_len {
            return Err(mismatch());
        }

        let rgba = RgbaImage::from_raw(width, height, capture.bytes.clone()).ok_or_else(mismatch)?;
        Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}

/// 逐行提取像素，容忍每行末尾的对齐填充。
pub struct PixelExtraction;

impl DecodeStrategy for PixelExtraction {
    fn name(&self) -> &'static str {
        "pixel-extraction"
    }

    fn decode(&self, capture: &RawCapture) -> Result<RgbImage, ImageError> {
        let (width, height) = checked_dimensions(capture)?;
        let packed_row = capture.width * 4;
        if capture.bytes.len() % capture.height != 0 {
            return Err(ImageError::Decode("像素数据无法按行整除".to_string()));
        }
        let stride = capture.bytes.len() / capture.height;
        if stride < packed_row {
            return Err(ImageError::Decode(format!(
                "行跨度 {} 小于 {} 字节",
                stride, packed_row
            )));
        }

        let mut rgb = Vec::with_capacity(capture.width * capture.height * 3);
        for row in capture.bytes.chunks_exact(stride) {
            for pixel in row[..packed_row].chunks_exact(4) {
                rgb.extend_from_slice(&pixel[..3]);
            }
        }

        RgbImage::from_raw(width, height, rgb)
            .ok_or_else(|| ImageError::Decode("像素提取输出长度异常".to_string()))
    }
}

/// 写入临时文件后重新打开。
///
/// 仅对带图片签名的字节生效；临时文件由 `NamedTempFile` 持有，离开作用域即删除。
/// 未指定目录时使用系统临时目录。
#[derive(Debug, Default, Clone)]
pub struct TempFileRoundTrip {
    dir: Option<PathBuf>,
}

impl TempFileRoundTrip {
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

impl DecodeStrategy for TempFileRoundTrip {
    fn name(&self) -> &'static str {
        "temp-file"
    }

    fn decode(&self, capture: &RawCapture) -> Result<RgbImage, ImageError> {
        validate_image_signature(&capture.bytes)
            .map_err(|e| ImageError::Decode(format!("临时文件回退不可用：{}", e)))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("capture-").suffix(".img");
        let created = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut temp = created.map_err(|e| ImageError::FileSystem(format!("创建临时文件失败：{}", e)))?;
        temp.write_all(&capture.bytes)
            .and_then(|_| temp.flush())
            .map_err(|e| ImageError::FileSystem(format!("写入临时文件失败：{}", e)))?;

        let decoded = ImageReader::open(temp.path())
            .map_err(|e| ImageError::FileSystem(format!("重新打开临时文件失败：{}", e)))?
            .with_guessed_format()
            .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?
            .decode()
            .map_err(|e| ImageError::Decode(format!("临时文件解码失败：{}", e)))?;

        Ok(decoded.to_rgb8())
    }
}

fn checked_dimensions(capture: &RawCapture) -> Result<(u32, u32), ImageError> {
    if capture.width == 0 || capture.height == 0 {
        return Err(ImageError::Decode(format!(
            "截图尺寸无效：{}x{}",
            capture.width, capture.height
        )));
    }
    let width = u32::try_from(capture.width)
        .map_err(|_| ImageError::ResourceLimit("截图宽度溢出".to_string()))?;
    let height = u32::try_from(capture.height)
        .map_err(|_| ImageError::ResourceLimit("截图高度溢出".to_string()))?;
    Ok((width, height))
}
