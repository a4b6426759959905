//! # 剪贴板 LaTeX 识别工具：应用入口
//!
//! 本文件仅负责日志、设置与运行时初始化。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::sync::Arc;

use clipboard_latex_ocr::clipboard::{
    ClipboardWatcher, ControllerHandle, RecognitionController, SystemClipboard,
};
use clipboard_latex_ocr::image_handler::{ImageCodec, ImageConfig};
use clipboard_latex_ocr::presenter::LogPresenter;
use clipboard_latex_ocr::recognition::{GeminiClient, RecognitionPipeline};
use clipboard_latex_ocr::settings::SettingsStore;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let store = SettingsStore::default();
    let settings = store.load_or_default();
    if settings.api_key.trim().is_empty() {
        log::warn!("未设置 API Key，请在 {} 中配置 api_key", store.path().display());
    }

    let image_config = ImageConfig::default();
    let watcher = ClipboardWatcher::new(Box::new(SystemClipboard::new()), &image_config);
    let pipeline =
        RecognitionPipeline::new(ImageCodec::new(image_config), Arc::new(GeminiClient::new()));
    let controller =
        RecognitionController::new(watcher, pipeline, Box::new(LogPresenter), store, settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("创建 tokio 运行时失败");

    runtime.block_on(async move {
        let (handle, commands) = ControllerHandle::channel();
        let event_loop = tokio::spawn(controller.run(commands));

        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("收到 Ctrl-C，正在退出"),
            Err(err) => log::error!("监听 Ctrl-C 失败: {}", err),
        }

        handle.shutdown();
        if let Err(err) = event_loop.await {
            log::error!("事件循环异常退出: {}", err);
        }
    });
}
