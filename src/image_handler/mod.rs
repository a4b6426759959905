//! # 图片处理模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“截图解码 → 指纹 → 压缩 → 编码”按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `capture`：平台截图 → RGB 位图（多策略回退）
//! - `codec`：文件解码、等比压缩、JPEG/Base64 编码
//! - `hasher`：降采样灰度 MD5 指纹，用于变化检测
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 调用链
//!
//! ```text
//! 剪贴板截图 (RawCapture)
//!    ↓
//! capture.rs（direct → pixel → temp-file）
//!    ↓
//! DecodedImage ──→ hasher.rs（Fingerprint）
//!    ↓
//! codec.rs（compress → JPEG → Base64）
//!    ↓
//! recognition 模块
//! ```

mod capture;
mod codec;
mod config;
mod error;
mod hasher;
mod source;

pub use capture::{
    CaptureDecoder, DecodeStrategy, DirectConvert, PixelExtraction, TempFileRoundTrip,
};
pub use codec::{CompressOptions, ImageCodec};
pub use config::ImageConfig;
pub use error::ImageError;
pub use hasher::{Fingerprint, ImageHasher};
pub use source::{DecodedImage, ImageSource, RawCapture};
