//! # 配置模块
//!
//! 将图片链路中所有“可调阈值”集中到 `ImageConfig`，保证行为可观测、可测试。

use image::imageops::FilterType;

/// 图片处理配置。
///
/// 字段覆盖文件读取、解码限制、压缩与指纹降采样四个阶段。
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// 读取本地文件时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 压缩阶段的包围盒宽度，超出时按比例缩小。
    pub compress_max_width: u32,
    /// 压缩阶段的包围盒高度。
    pub compress_max_height: u32,
    /// JPEG 编码质量（1~100）。
    pub jpeg_quality: u8,
    /// 指纹计算前的降采样边长上限。
    pub fingerprint_max_side: u32,
    /// 降采样滤镜策略。
    pub resize_filter: FilterType,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            compress_max_width: 800,
            compress_max_height: 600,
            jpeg_quality: 95,
            fingerprint_max_side: 100,
            resize_filter: FilterType::Triangle,
        }
    }
}

impl ImageConfig {
    /// 限制 JPEG 质量到编码器接受的范围。
    pub(crate) fn effective_jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}

/// 计算在包围盒内保持宽高比的目标尺寸，不放大。
///
/// 返回 `None` 表示原图已经在包围盒之内。
pub(crate) fn fit_within(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 || max_width == 0 || max_height == 0 {
        return None;
    }
    if width <= max_width && height <= max_height {
        return None;
    }

    let scale = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let target_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let target_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    Some((target_width, target_height))
}

#[cfg(test)]
mod tests {
    use super::fit_within;

    #[test]
    fn fit_within_keeps_small_images() {
        assert_eq!(fit_within(640, 480, 800, 600), None);
        assert_eq!(fit_within(800, 600, 800, 600), None);
    }

    #[test]
    fn fit_within_preserves_aspect_ratio() {
        assert_eq!(fit_within(1600, 1200, 800, 600), Some((800, 600)));
        assert_eq!(fit_within(2000, 500, 800, 600), Some((800, 200)));
        assert_eq!(fit_within(300, 1200, 800, 600), Some((150, 600)));
    }

    #[test]
    fn fit_within_never_collapses_to_zero() {
        assert_eq!(fit_within(10_000, 1, 100, 100), Some((100, 1)));
    }
}
