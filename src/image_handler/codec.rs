//! # 编解码模块
//!
//! ## 设计思路
//!
//! 集中处理“文件 → 位图 → 压缩位图 → JPEG → Base64”的转换，并在关键节点增加资源上限控制。
//! 优先做签名与尺寸检查，再进行完整解码，降低异常输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 文件读取：存在性 / 体积 / 签名（`infer`）/ header 尺寸校验
//! 2. 完整解码并统一转换为 RGB
//! 3. 按包围盒等比缩小（不放大），优先 `fast_image_resize`，失败回退 `image::imageops`
//! 4. JPEG 编码后做 Base64

use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::{Engine as _, engine::general_purpose};
use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ImageReader, RgbImage};

use super::config::fit_within;
use super::{DecodedImage, ImageConfig, ImageError};

/// 压缩参数：包围盒与 JPEG 质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub quality: u8,
}

impl From<&ImageConfig> for CompressOptions {
    fn from(config: &ImageConfig) -> Self {
        Self {
            max_width: config.compress_max_width,
            max_height: config.compress_max_height,
            quality: config.effective_jpeg_quality(),
        }
    }
}

/// 图片编解码器。
///
/// 无内部可变状态，可随意克隆到工作线程。
#[derive(Debug, Clone, Default)]
pub struct ImageCodec {
    config: ImageConfig,
}

impl ImageCodec {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// 从本地路径读取并解码图片，统一输出 RGB。
    pub fn decode_file(&self, path: &Path) -> Result<DecodedImage, ImageError> {
        log::info!("📁 开始读取本地图片 - 路径: {}", path.display());

        if !path.exists() {
            return Err(ImageError::FileSystem(format!("文件不存在：{}", path.display())));
        }

        let metadata = fs::metadata(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > self.config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                self.config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = fs::read(path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;
        self.decode_bytes(&bytes)
    }

    /// 解码内存中的已编码图片（PNG/JPEG/BMP/GIF ...）。
    pub fn decode_bytes(&self, bytes: &[u8]) -> Result<DecodedImage, ImageError> {
        validate_image_signature(bytes)?;

        let (width, height) = inspect_dimensions_from_memory(bytes)?;
        self.validate_pixel_limits(width, height)?;

        let decoded = image::load_from_memory(bytes)
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        DecodedImage::from_rgb(decoded.to_rgb8())
    }

    /// 按包围盒等比缩小图片（已在包围盒内则原样返回）。
    ///
    /// 指定 `destination` 时额外以给定质量写出 JPEG 文件，父目录不存在会自动创建。
    pub fn compress(
        &self,
        image: &DecodedImage,
        options: &CompressOptions,
        destination: Option<&Path>,
    ) -> Result<DecodedImage, ImageError> {
        let (width, height) = image.dimensions();
        let compressed = match fit_within(width, height, options.max_width, options.max_height) {
            Some((target_width, target_height)) => {
                log::info!(
                    "🧩 压缩图像：{}x{} -> {}x{}（filter={:?}）",
                    width,
                    height,
                    target_width,
                    target_height,
                    self.config.resize_filter
                );
                let resized = resize_rgb(
                    image.as_rgb(),
                    target_width,
                    target_height,
                    self.config.resize_filter,
                )?;
                DecodedImage::from_rgb(resized)?
            }
            None => image.clone(),
        };

        if let Some(path) = destination {
            let jpeg = encode_jpeg(&compressed, options.quality)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| ImageError::FileSystem(format!("创建输出目录失败：{}", e)))?;
            }
            fs::write(path, jpeg)
                .map_err(|e| ImageError::FileSystem(format!("写出压缩图像失败：{}", e)))?;
            log::debug!("💾 压缩图像已写出: {}", path.display());
        }

        Ok(compressed)
    }

    /// 以配置的质量序列化为 JPEG，再做 Base64 编码。
    pub fn encode_base64(&self, image: &DecodedImage) -> Result<String, ImageError> {
        let jpeg = encode_jpeg(image, self.config.effective_jpeg_quality())?;
        let encoded = general_purpose::STANDARD.encode(&jpeg);
        log::info!("🔤 Base64 编码长度: {}", encoded.len());
        Ok(encoded)
    }

    /// 校验像素数量是否超过配置上限。
    fn validate_pixel_limits(&self, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > self.config.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, self.config.max_decoded_pixels
            )));
        }

        Ok(())
    }
}

/// 将位图编码为 JPEG 字节。
pub(crate) fn encode_jpeg(image: &DecodedImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ImageError::Encoding(format!("图像尺寸无效：{}x{}", width, height)));
    }

    let mut cursor = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut cursor, quality.clamp(1, 100));
    encoder
        .encode_image(image.as_rgb())
        .map_err(|e| ImageError::Encoding(format!("JPEG 编码失败：{}", e)))?;
    Ok(cursor.into_inner())
}

/// 通过文件签名（magic bytes）校验输入是否为图片。
pub(crate) fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::InvalidFormat("图片内容为空".to_string()));
    }

    let kind = infer::get(bytes)
        .ok_or_else(|| ImageError::InvalidFormat("无法识别图片类型".to_string()))?;

    if kind.matcher_type() != infer::MatcherType::Image {
        return Err(ImageError::InvalidFormat(format!(
            "文件签名不是图片类型：{}",
            kind.mime_type()
        )));
    }

    Ok(())
}

/// 仅通过内存中的图片头信息读取宽高。
fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    reader
        .into_dimensions()
        .map_err(|e| ImageError::InvalidFormat(format!("无法读取图片尺寸：{}", e)))
}

/// 缩放 RGB 位图：优先 `fast_image_resize`，失败时回退 `image::imageops::resize`。
pub(crate) fn resize_rgb(
    image: &RgbImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<RgbImage, ImageError> {
    match resize_with_fast_image_resize(image, target_width, target_height, filter) {
        Ok(resized) => Ok(resized),
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 缩放失败，回退 image::imageops::resize：{}", err);
            Ok(image::imageops::resize(image, target_width, target_height, filter))
        }
    }
}

fn resize_with_fast_image_resize(
    image: &RgbImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> Result<RgbImage, ImageError> {
    let (src_width, src_height) = image.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        image.as_raw().clone(),
        fr::PixelType::U8x3,
    )
    .map_err(|e| ImageError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(to_fast_filter(filter)));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ImageError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    RgbImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| ImageError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

fn to_fast_filter(filter: FilterType) -> fr::FilterType {
    match filter {
        FilterType::Nearest => fr::FilterType::Box,
        FilterType::Triangle => fr::FilterType::Bilinear,
        FilterType::CatmullRom => fr::FilterType::CatmullRom,
        FilterType::Gaussian => fr::FilterType::Mitchell,
        FilterType::Lanczos3 => fr::FilterType::Lanczos3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb};

    fn gradient(width: u32, height: u32) -> DecodedImage {
        let pixels = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8])
        });
        DecodedImage::from_rgb(pixels).expect("valid image")
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(gradient(width, height).as_rgb().clone())
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn compress_downscales_into_bounding_box() {
        let codec = ImageCodec::default();
        let options = CompressOptions::from(codec.config());

        let compressed = codec
            .compress(&gradient(1920, 1080), &options, None)
            .expect("compress should succeed");

        assert_eq!(compressed.dimensions(), (800, 450));
    }

    #[test]
    fn compress_never_upscales() {
        let codec = ImageCodec::default();
        let options = CompressOptions::from(codec.config());
        let small = gradient(120, 80);

        let compressed = codec.compress(&small, &options, None).expect("compress should succeed");

        assert_eq!(compressed.dimensions(), (120, 80));
    }

    #[test]
    fn compress_writes_jpeg_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("nested").join("deeper").join("out.jpg");
        let codec = ImageCodec::default();
        let options = CompressOptions {
            max_width: 100,
            max_height: 100,
            quality: 80,
        };

        codec
            .compress(&gradient(300, 150), &options, Some(&target))
            .expect("compress should succeed");

        let written = fs::read(&target).expect("output written");
        assert_eq!(image::guess_format(&written).ok(), Some(ImageFormat::Jpeg));
        let reopened = image::load_from_memory(&written).expect("jpeg decodes");
        assert_eq!((reopened.width(), reopened.height()), (100, 50));
    }

    #[test]
    fn encode_base64_produces_jpeg_payload() {
        let codec = ImageCodec::default();
        let encoded = codec.encode_base64(&gradient(64, 32)).expect("encode should succeed");

        let bytes = general_purpose::STANDARD.decode(encoded).expect("valid base64");
        assert_eq!(image::guess_format(&bytes).ok(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn decode_file_reads_png_as_rgb() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shot.png");
        fs::write(&path, png_bytes(40, 20)).expect("write png");

        let image = ImageCodec::default().decode_file(&path).expect("decode should succeed");

        assert_eq!(image.dimensions(), (40, 20));
    }

    #[test]
    fn decode_file_reports_missing_file() {
        let result = ImageCodec::default().decode_file(Path::new("/definitely/not/here.png"));
        assert!(matches!(result, Err(ImageError::FileSystem(_))));
    }

    #[test]
    fn decode_bytes_rejects_non_image_payload() {
        let result = ImageCodec::default().decode_bytes(b"<html>not an image</html>");
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn decode_bytes_rejects_too_many_pixels() {
        let mut config = ImageConfig::default();
        config.max_decoded_pixels = 1_000;

        let result = ImageCodec::new(config).decode_bytes(&png_bytes(100, 100));

        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }
}
