//! 展示层接口
//!
//! 核心逻辑只通过 `Presenter` 向外通知，不感知任何窗口或控件。
//! 每次识别恰好产生一次 `on_result` 或 `on_error`，随后恰好一次 `on_finished`。

/// 识别派发时的进度提示。
pub const PROGRESS_MESSAGE: &str = "正在分析图像内容，请稍候...";

/// 展示层回调。所有回调都在事件循环任务中调用。
pub trait Presenter: Send {
    fn on_progress(&mut self, _message: &str) {}

    fn on_result(&mut self, text: &str);

    fn on_error(&mut self, message: &str);

    fn on_finished(&mut self) {}

    /// 用户可见的警告（未设置 API Key、任务进行中等）。
    fn on_warning(&mut self, _message: &str) {}

    /// 普通提示（如设置已保存）。
    fn on_info(&mut self, _message: &str) {}
}

/// 无界面运行时使用：结果打印到标准输出，其余写入日志。
#[derive(Debug, Default)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn on_progress(&mut self, message: &str) {
        log::info!("⏳ {}", message);
    }

    fn on_result(&mut self, text: &str) {
        log::info!("📝 识别结果（{} 字符）", text.chars().count());
        println!("{}", text);
    }

    fn on_error(&mut self, message: &str) {
        log::error!("❌ {}", message);
    }

    fn on_finished(&mut self) {
        log::debug!("识别任务结束");
    }

    fn on_warning(&mut self, message: &str) {
        log::warn!("⚠️ {}", message);
    }

    fn on_info(&mut self, message: &str) {
        log::info!("ℹ️ {}", message);
    }
}
