//! 识别控制器（事件循环）
//!
//! # 设计思路
//!
//! 一个 tokio 任务串行处理四类事件：定时采样、外部命令、识别完成消息、复制冷却到期。
//! `ClipboardState`、任务槽与当前凭据都只在这里修改，工作任务只通过完成消息回传结果。
//!
//! ```text
//! interval.tick ──┐
//! commands.recv ──┼─→ RecognitionController ─submit─→ PipelineSlot ─spawn─→ RecognitionPipeline
//! cooldown 到期 ──┤                                                                  │
//! completions ←───┴────────────────────────────── Completion { ticket, result } ←────┘
//! ```
//!
//! # 实现思路
//!
//! - 定时采样：监控关闭或冷却中直接跳过；任务进行中跳过（不读剪贴板）。
//! - 自动识别缺少 API Key 时只记录日志；手动触发则向用户给出警告。
//! - 复制结果后进入冷却，到期后重新采样，避免把刚写入的内容当作新图片。
//! - 重新启用监控时重新采样并重置定时器。

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::image_handler::{DecodedImage, ImageSource};
use crate::presenter::{PROGRESS_MESSAGE, Presenter};
use crate::recognition::{
    Completion, PipelineSlot, RecognitionPipeline, RecognitionRequest, RecognitionResult, SlotBusy,
};
use crate::settings::{Settings, SettingsStore};

use super::watcher::{ClipboardState, ClipboardWatcher, SampleOutcome};

const COPY_COOLDOWN_DEFAULT_MS: u64 = 1_000;

const BUSY_WARNING: &str = "正在处理图像，请稍候...";
const MISSING_KEY_WARNING: &str = "请先输入API Key";
const NOTHING_TO_COPY_WARNING: &str = "没有可复制的结果";

/// 事件循环的时间参数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub copy_cooldown: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl WatcherConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.poll_interval_ms()),
            copy_cooldown: Duration::from_millis(COPY_COOLDOWN_DEFAULT_MS),
        }
    }
}

/// 一次定时采样的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Disabled,
    Suppressed,
    Busy,
    NoImage,
    Unchanged,
    MissingApiKey,
    Dispatched,
    Failed,
}

/// 手动触发的处理结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Dispatched,
    Busy,
    MissingApiKey,
}

/// 发送给事件循环的命令。
#[derive(Debug)]
pub enum WatcherCommand {
    TriggerFromFile(PathBuf),
    TriggerFromImage(DecodedImage),
    SetMonitoring(bool),
    CopyResult,
    SaveApiKey(String),
    SelectModel(String),
    Shutdown,
}

/// 定时采样前的门控判断；返回 `Some` 表示本次跳过。
fn decide_tick(state: &ClipboardState, busy: bool, now: Instant) -> Option<TickOutcome> {
    if !state.monitoring_enabled {
        return Some(TickOutcome::Disabled);
    }
    if state.suppressed_until.is_some_and(|until| now < until) {
        return Some(TickOutcome::Suppressed);
    }
    if busy {
        return Some(TickOutcome::Busy);
    }
    None
}

pub struct RecognitionController {
    watcher: ClipboardWatcher,
    pipeline: RecognitionPipeline,
    slot: PipelineSlot,
    completions: Option<mpsc::UnboundedReceiver<Completion>>,
    presenter: Box<dyn Presenter>,
    store: SettingsStore,
    settings: Settings,
    model: String,
    config: WatcherConfig,
    last_result: Option<String>,
}

impl RecognitionController {
    pub fn new(
        watcher: ClipboardWatcher,
        pipeline: RecognitionPipeline,
        presenter: Box<dyn Presenter>,
        store: SettingsStore,
        settings: Settings,
    ) -> Self {
        let (slot, completions) = PipelineSlot::new();
        Self {
            watcher,
            pipeline,
            slot,
            completions: Some(completions),
            presenter,
            store,
            config: WatcherConfig::from_settings(&settings),
            model: settings.model().to_string(),
            settings,
            last_result: None,
        }
    }

    pub fn with_config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> WatcherConfig {
        self.config
    }

    pub fn state(&self) -> &ClipboardState {
        self.watcher.state()
    }

    pub fn is_busy(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn api_key(&self) -> &str {
        &self.settings.api_key
    }

    pub fn last_result(&self) -> Option<&str> {
        self.last_result.as_deref()
    }

    /// 启动采样：记录当前剪贴板内容，不触发识别。
    pub fn initialize(&mut self) {
        self.watcher.prime();
    }

    pub fn on_tick(&mut self) -> TickOutcome {
        self.on_tick_at(Instant::now())
    }

    pub fn on_tick_at(&mut self, now: Instant) -> TickOutcome {
        if self.watcher.state().suppressed_until.is_some_and(|until| now >= until) {
            self.finish_cooldown();
        }
        if let Some(skipped) = decide_tick(self.watcher.state(), self.slot.is_busy(), now) {
            return skipped;
        }

        match self.watcher.check() {
            SampleOutcome::NoImage | SampleOutcome::EmptyImage => TickOutcome::NoImage,
            SampleOutcome::Unchanged => TickOutcome::Unchanged,
            SampleOutcome::Failed(_) => TickOutcome::Failed,
            SampleOutcome::Changed(image) => {
                if self.settings.api_key.trim().is_empty() {
                    log::warn!("未设置API Key，跳过处理剪贴板图像");
                    return TickOutcome::MissingApiKey;
                }
                match self.dispatch(ImageSource::Memory(image)) {
                    Ok(_) => TickOutcome::Dispatched,
                    Err(SlotBusy) => TickOutcome::Busy,
                }
            }
        }
    }

    pub fn trigger_from_file(&mut self, path: impl Into<PathBuf>) -> TriggerOutcome {
        self.trigger(ImageSource::FilePath(path.into()))
    }

    pub fn trigger_from_image(&mut self, image: DecodedImage) -> TriggerOutcome {
        self.trigger(ImageSource::Memory(image))
    }

    fn trigger(&mut self, source: ImageSource) -> TriggerOutcome {
        if self.slot.is_busy() {
            self.presenter.on_warning(BUSY_WARNING);
            return TriggerOutcome::Busy;
        }
        if self.settings.api_key.trim().is_empty() {
            self.presenter.on_warning(MISSING_KEY_WARNING);
            return TriggerOutcome::MissingApiKey;
        }
        match self.dispatch(source) {
            Ok(_) => TriggerOutcome::Dispatched,
            Err(SlotBusy) => {
                self.presenter.on_warning(BUSY_WARNING);
                TriggerOutcome::Busy
            }
        }
    }

    fn dispatch(&mut self, source: ImageSource) -> Result<u64, SlotBusy> {
        let request = RecognitionRequest {
            source,
            api_key: self.settings.api_key.clone(),
            model: self.model.clone(),
        };
        let pipeline = self.pipeline.clone();
        let ticket = self.slot.submit(async move { pipeline.run(request).await })?;

        log::info!("🚀 已派发识别任务 ticket={} model={}", ticket, self.model);
        self.presenter.on_progress(PROGRESS_MESSAGE);
        Ok(ticket)
    }

    /// 处理工作任务回传的完成消息，释放任务槽。
    pub fn on_completion(&mut self, completion: Completion) {
        if !self.slot.complete(completion.ticket) {
            return;
        }
        match completion.result {
            RecognitionResult::Success(text) => {
                self.presenter.on_result(&text);
                self.last_result = Some(text);
            }
            RecognitionResult::Failure(message) => {
                self.presenter.on_error(&message);
            }
        }
        self.presenter.on_finished();
    }

    /// 等待下一条完成消息并处理；事件循环已接管接收端时返回 `None`。
    pub async fn wait_for_completion(&mut self) -> Option<RecognitionResult> {
        let completion = self.completions.as_mut()?.recv().await?;
        let result = completion.result.clone();
        self.on_completion(completion);
        Some(result)
    }

    /// 开关监控；从关闭切换到开启时重新采样并返回 `true`。
    pub fn set_monitoring(&mut self, enabled: bool) -> bool {
        let was_enabled = self.watcher.state().monitoring_enabled;
        self.watcher.state_mut().monitoring_enabled = enabled;
        log::info!("剪贴板监控已{}", if enabled { "启用" } else { "禁用" });

        if enabled && !was_enabled {
            self.watcher.prime();
            return true;
        }
        false
    }

    pub fn copy_result(&mut self) -> bool {
        self.copy_result_at(Instant::now())
    }

    /// 将最近一次识别结果写入剪贴板，并在冷却期内暂停采样。
    pub fn copy_result_at(&mut self, now: Instant) -> bool {
        let Some(text) = self.last_result.clone().filter(|text| !text.trim().is_empty()) else {
            log::warn!("{}", NOTHING_TO_COPY_WARNING);
            self.presenter.on_warning(NOTHING_TO_COPY_WARNING);
            return false;
        };

        self.watcher.state_mut().suppressed_until = Some(now + self.config.copy_cooldown);
        match self.watcher.clipboard_mut().write_text(&text) {
            Ok(()) => {
                log::info!("结果已复制到剪贴板");
                true
            }
            Err(err) => {
                log::error!("{}", err);
                self.presenter.on_warning(&err.to_string());
                false
            }
        }
    }

    /// 冷却结束：恢复采样并记录当前剪贴板内容。
    pub fn finish_cooldown(&mut self) {
        if self.watcher.state_mut().suppressed_until.take().is_some() {
            log::info!("剪贴板监控已恢复");
            self.watcher.prime();
        }
    }

    pub fn save_api_key(&mut self, api_key: String) {
        self.settings.api_key = api_key;
        match self.store.save(&self.settings) {
            Ok(()) => self.presenter.on_info("API Key 已保存！"),
            Err(err) => {
                log::error!("保存配置文件失败: {}", err);
                self.presenter.on_warning(&err.to_string());
            }
        }
    }

    pub fn select_model(&mut self, model: &str) {
        let model = model.trim();
        if model.is_empty() {
            self.presenter.on_warning("模型名称不能为空");
            return;
        }
        log::info!("🔀 切换模型: {} → {}", self.model, model);
        self.model = model.to_string();
    }

    /// 处理一条命令；返回 `true` 表示需要重置定时器。
    pub fn handle_command(&mut self, command: WatcherCommand) -> bool {
        match command {
            WatcherCommand::TriggerFromFile(path) => {
                self.trigger_from_file(path);
            }
            WatcherCommand::TriggerFromImage(image) => {
                self.trigger_from_image(image);
            }
            WatcherCommand::SetMonitoring(enabled) => return self.set_monitoring(enabled),
            WatcherCommand::CopyResult => {
                self.copy_result();
            }
            WatcherCommand::SaveApiKey(api_key) => self.save_api_key(api_key),
            WatcherCommand::SelectModel(model) => self.select_model(&model),
            WatcherCommand::Shutdown => {}
        }
        false
    }

    /// 运行事件循环，直到收到 `Shutdown` 或所有句柄被丢弃。
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<WatcherCommand>) {
        let Some(mut completions) = self.completions.take() else {
            log::error!("识别完成通道已被占用，事件循环无法启动");
            return;
        };

        self.initialize();

        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "📋 剪贴板监控已启动 - interval={}ms model={}",
            period.as_millis(),
            self.model
        );

        loop {
            let monitoring = self.watcher.state().monitoring_enabled;
            let cooldown = self.watcher.state().suppressed_until;

            tokio::select! {
                _ = ticker.tick(), if monitoring => {
                    self.on_tick_at(Instant::now());
                }
                Some(completion) = completions.recv() => {
                    self.on_completion(completion);
                }
                _ = tokio::time::sleep_until(cooldown.unwrap_or_else(Instant::now)),
                    if cooldown.is_some() =>
                {
                    self.finish_cooldown();
                }
                command = commands.recv() => match command {
                    None | Some(WatcherCommand::Shutdown) => break,
                    Some(command) => {
                        if self.handle_command(command) {
                            ticker.reset();
                        }
                    }
                },
            }
        }

        log::info!("👋 剪贴板监控已停止");
    }
}

/// 事件循环的外部句柄，可克隆并跨线程使用。
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    commands: mpsc::UnboundedSender<WatcherCommand>,
}

impl ControllerHandle {
    /// 创建句柄以及交给 `RecognitionController::run` 的接收端。
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WatcherCommand>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        (Self { commands }, receiver)
    }

    fn send(&self, command: WatcherCommand) -> bool {
        if self.commands.send(command).is_err() {
            log::warn!("事件循环已退出，命令被丢弃");
            return false;
        }
        true
    }

    pub fn trigger_from_file(&self, path: impl Into<PathBuf>) -> bool {
        self.send(WatcherCommand::TriggerFromFile(path.into()))
    }

    pub fn trigger_from_image(&self, image: DecodedImage) -> bool {
        self.send(WatcherCommand::TriggerFromImage(image))
    }

    pub fn set_monitoring(&self, enabled: bool) -> bool {
        self.send(WatcherCommand::SetMonitoring(enabled))
    }

    pub fn copy_result(&self) -> bool {
        self.send(WatcherCommand::CopyResult)
    }

    pub fn save_api_key(&self, api_key: impl Into<String>) -> bool {
        self.send(WatcherCommand::SaveApiKey(api_key.into()))
    }

    pub fn select_model(&self, model: impl Into<String>) -> bool {
        self.send(WatcherCommand::SelectModel(model.into()))
    }

    pub fn shutdown(&self) -> bool {
        self.send(WatcherCommand::Shutdown)
    }
}
