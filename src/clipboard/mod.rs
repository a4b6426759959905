//! 剪贴板模块
//!
//! # 设计思路
//!
//! - **读写抽象**：`ClipboardSource` 只暴露“读取截图”和“写入文本”两个能力，
//!   系统实现基于 `arboard`，测试可注入内存实现。
//! - **采样**：`ClipboardWatcher` 持有 `ClipboardState`，负责截图解码、指纹比较与启动采样。
//! - **事件循环**：`RecognitionController` 串起定时采样、手动触发、复制冷却与识别任务完成消息，
//!   所有状态只在该循环中修改。
//!
//! # 实现思路
//!
//! - 没有图片时 `arboard` 返回 `ContentNotAvailable`，这里统一映射为 `Ok(None)`。
//! - 系统剪贴板句柄首次使用时创建并一直持有：X11/Wayland 下由持有者提供剪贴板内容，
//!   句柄提前释放会让刚写入的文本随之消失。读写出错后丢弃句柄，下次重新打开。
//! - 对外通过 `ControllerHandle` 发送命令，事件循环内部无锁。

mod controller;
mod watcher;

pub use controller::{
    ControllerHandle, RecognitionController, TickOutcome, TriggerOutcome, WatcherCommand,
    WatcherConfig,
};
pub use watcher::{ClipboardState, ClipboardWatcher, SampleOutcome};

use crate::error::AppError;
use crate::image_handler::RawCapture;

/// 剪贴板读写接口。
pub trait ClipboardSource: Send {
    /// 读取当前截图；剪贴板中没有图片时返回 `Ok(None)`。
    fn read_image(&mut self) -> Result<Option<RawCapture>, AppError>;

    fn write_text(&mut self, text: &str) -> Result<(), AppError>;
}

/// 基于 `arboard` 的系统剪贴板，句柄懒加载并在成功读写之间复用。
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已持有系统剪贴板句柄。
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn handle(&mut self) -> Result<&mut arboard::Clipboard, AppError> {
        if self.inner.is_none() {
            let clipboard = arboard::Clipboard::new()
                .map_err(|e| AppError::Clipboard(format!("无法访问系统剪贴板: {}", e)))?;
            log::debug!("📋 已打开系统剪贴板句柄");
            self.inner = Some(clipboard);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| AppError::Clipboard("系统剪贴板句柄不可用".to_string()))
    }

    fn discard(&mut self) {
        if self.inner.take().is_some() {
            log::warn!("⚠️ 剪贴板读写失败，已释放句柄，下次重新打开");
        }
    }
}

impl std::fmt::Debug for SystemClipboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemClipboard")
            .field("open", &self.is_open())
            .finish()
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_image(&mut self) -> Result<Option<RawCapture>, AppError> {
        let result = self.handle()?.get_image();
        match result {
            Ok(image) => Ok(Some(RawCapture::new(
                image.width,
                image.height,
                image.bytes.into_owned(),
            ))),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(err) => {
                self.discard();
                Err(AppError::Clipboard(format!("读取剪贴板图片失败: {}", err)))
            }
        }
    }

    fn write_text(&mut self, text: &str) -> Result<(), AppError> {
        let result = self.handle()?.set_text(text.to_string());
        result.map_err(|e| {
            self.discard();
            AppError::Clipboard(format!("写入剪贴板失败: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn system_clipboard_defers_opening_until_first_use() {
        assert_send::<SystemClipboard>();
        let clipboard = SystemClipboard::new();
        assert!(!clipboard.is_open());
        assert_eq!(format!("{:?}", clipboard), "SystemClipboard { open: false }");
    }
}
