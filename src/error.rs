//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! 流水线内部任何阶段的错误都在边界处转换为 `RecognitionResult::Failure`，
//! 不会向上冒泡导致进程崩溃。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于展示层通过 IPC 转发。

use serde::Serialize;

use crate::image_handler::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片链路错误（解码 / 编码 / 资源限制）
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 远程模型调用失败（鉴权 / 网络 / 响应格式）
    #[error("API 调用失败{}: {message}", status_suffix(.status))]
    Api {
        status: Option<u16>,
        message: String,
    },

    /// 设置文件读写失败
    #[error("配置错误: {0}")]
    Config(String),

    /// 剪贴板读写操作失败
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!("（HTTP {}）", s)).unwrap_or_default()
}

impl AppError {
    pub(crate) fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
