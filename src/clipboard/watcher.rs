use tokio::time::Instant;

use crate::image_handler::{
    CaptureDecoder, DecodedImage, Fingerprint, ImageConfig, ImageHasher, RawCapture,
};

use super::ClipboardSource;

/// 监控状态，只在事件循环中读写。
#[derive(Debug, Clone)]
pub struct ClipboardState {
    pub last_fingerprint: Option<Fingerprint>,
    pub last_image: Option<DecodedImage>,
    pub monitoring_enabled: bool,
    /// 复制结果后的冷却截止时间，期间忽略定时采样。
    pub suppressed_until: Option<Instant>,
}

impl Default for ClipboardState {
    fn default() -> Self {
        Self {
            last_fingerprint: None,
            last_image: None,
            monitoring_enabled: true,
            suppressed_until: None,
        }
    }
}

/// 单次采样结果。
#[derive(Debug, Clone)]
pub enum SampleOutcome {
    NoImage,
    EmptyImage,
    Unchanged,
    Changed(DecodedImage),
    Failed(String),
}

/// 剪贴板采样器：读取截图、解码、计算指纹并与上次比较。
pub struct ClipboardWatcher {
    clipboard: Box<dyn ClipboardSource>,
    decoder: CaptureDecoder,
    hasher: ImageHasher,
    state: ClipboardState,
}

impl ClipboardWatcher {
    pub fn new(clipboard: Box<dyn ClipboardSource>, config: &ImageConfig) -> Self {
        Self {
            clipboard,
            decoder: CaptureDecoder::from_config(config),
            hasher: ImageHasher::from_config(config),
            state: ClipboardState::default(),
        }
    }

    pub fn state(&self) -> &ClipboardState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ClipboardState {
        &mut self.state
    }

    pub fn clipboard_mut(&mut self) -> &mut dyn ClipboardSource {
        self.clipboard.as_mut()
    }

    /// 记录当前剪贴板内容而不触发识别。
    ///
    /// 用于启动、重新启用监控以及复制冷却结束后，避免重复处理已存在的图片。
    pub fn prime(&mut self) {
        match self.sample() {
            Ok(Some((fingerprint, image))) => {
                self.state.last_fingerprint = Some(fingerprint);
                self.state.last_image = Some(image);
                log::info!("📋 已初始化剪贴板状态 - fingerprint={}", fingerprint);
            }
            Ok(None) => {
                log::info!("📋 剪贴板中没有图像，已初始化剪贴板状态");
            }
            Err(message) => {
                log::warn!("初始化剪贴板状态失败: {}", message);
            }
        }
    }

    /// 采样一次并与上次指纹比较；有变化时更新状态。
    pub fn check(&mut self) -> SampleOutcome {
        let capture = match self.clipboard.read_image() {
            Ok(Some(capture)) => capture,
            Ok(None) => {
                log::trace!("剪贴板中没有图像");
                return SampleOutcome::NoImage;
            }
            Err(err) => {
                log::warn!("检查剪贴板失败: {}", err);
                return SampleOutcome::Failed(err.to_string());
            }
        };

        if capture.is_empty() {
            log::debug!("剪贴板图像为空");
            return SampleOutcome::EmptyImage;
        }

        let (fingerprint, image) = match self.fingerprint_capture(&capture) {
            Ok(pair) => pair,
            Err(message) => {
                log::warn!("处理剪贴板图像失败: {}", message);
                return SampleOutcome::Failed(message);
            }
        };

        if self.state.last_fingerprint == Some(fingerprint) {
            return SampleOutcome::Unchanged;
        }

        log::info!(
            "🆕 检测到新的剪贴板图像 {}x{} - fingerprint={}",
            image.width(),
            image.height(),
            fingerprint
        );
        self.state.last_fingerprint = Some(fingerprint);
        self.state.last_image = Some(image.clone());
        SampleOutcome::Changed(image)
    }

    fn sample(&mut self) -> Result<Option<(Fingerprint, DecodedImage)>, String> {
        match self.clipboard.read_image().map_err(|e| e.to_string())? {
            Some(capture) if !capture.is_empty() => self.fingerprint_capture(&capture).map(Some),
            _ => Ok(None),
        }
    }

    fn fingerprint_capture(
        &self,
        capture: &RawCapture,
    ) -> Result<(Fingerprint, DecodedImage), String> {
        let image = self.decoder.decode(capture).map_err(|e| e.to_string())?;
        let fingerprint = self.hasher.fingerprint(&image).map_err(|e| e.to_string())?;
        Ok((fingerprint, image))
    }
}
