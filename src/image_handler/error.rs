//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载图片链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。

/// 图片处理统一错误类型。
///
/// 该类型会在流水线边界被上转为 `AppError`，最终以 `Failure` 消息交给展示层。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// 截图/文件无法转换为可用位图（所有回退路径均失败）。
    #[error("解码错误：{0}")]
    Decode(String),

    /// JPEG 压缩或 Base64 序列化失败。
    #[error("编码错误：{0}")]
    Encoding(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// 稳定的错误代码，供日志检索与展示层分类。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Encoding(_) => "encoding",
            Self::InvalidFormat(_) => "invalid_format",
            Self::FileSystem(_) => "file_system",
            Self::ResourceLimit(_) => "resource_limit",
        }
    }
}

impl From<ImageError> for String {
    fn from(error: ImageError) -> Self {
        error.to_string()
    }
}
