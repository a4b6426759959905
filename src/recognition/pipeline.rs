//! # 识别流水线
//!
//! ## 设计思路
//!
//! `RecognitionPipeline` 只负责编排：解码（如需）→ 压缩 → Base64 → 远程识别 → 规范化。
//! 任何阶段的错误都在这里转换成 `RecognitionResult::Failure`，调用方只会收到一个终态结果。
//!
//! `PipelineSlot` 是容量为 1 的任务槽：槽被占用时 `submit` 直接拒绝，
//! 任务结束后由事件循环调用 `complete` 归还。工作任务通过一次性的完成消息回传结果，
//! 即使任务 panic 也会回传 `Failure`，保证槽一定会被释放。
//!
//! ## 实现思路
//!
//! - CPU 密集阶段（解码/压缩/编码）放在 `spawn_blocking` 中执行。
//! - 网络阶段走异步 `RecognitionClient`。
//! - 记录 `prepare/api/total` 阶段耗时，便于诊断。

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::AppError;
use crate::image_handler::{CompressOptions, ImageCodec, ImageError, ImageSource};

use super::client::RecognitionClient;
use super::normalizer::normalize;

/// 一次识别请求。
#[derive(Debug, Clone)]
pub struct RecognitionRequest {
    pub source: ImageSource,
    pub api_key: String,
    pub model: String,
}

/// 识别终态结果，每个请求恰好产生一个。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    Success(String),
    Failure(String),
}

impl RecognitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// 识别流水线。
#[derive(Clone)]
pub struct RecognitionPipeline {
    codec: ImageCodec,
    client: Arc<dyn RecognitionClient>,
}

impl RecognitionPipeline {
    pub fn new(codec: ImageCodec, client: Arc<dyn RecognitionClient>) -> Self {
        Self { codec, client }
    }

    /// 执行完整流水线；所有错误都折叠为 `Failure`。
    pub async fn run(&self, request: RecognitionRequest) -> RecognitionResult {
        match self.try_run(request).await {
            Ok(text) => RecognitionResult::Success(text),
            Err(err) => {
                log::error!("处理图像失败: {}", err);
                RecognitionResult::Failure(format!("发生错误: {}", err))
            }
        }
    }

    async fn try_run(&self, request: RecognitionRequest) -> Result<String, AppError> {
        let RecognitionRequest {
            source,
            api_key,
            model,
        } = request;
        let total_start = Instant::now();

        let prepare_start = Instant::now();
        let codec = self.codec.clone();
        let encoded = tokio::task::spawn_blocking(move || -> Result<String, ImageError> {
            let image = match source {
                ImageSource::FilePath(path) => codec.decode_file(&path)?,
                ImageSource::Memory(image) => image,
            };
            let options = CompressOptions::from(codec.config());
            let compressed = codec.compress(&image, &options, None)?;
            codec.encode_base64(&compressed)
        })
        .await
        .map_err(|e| ImageError::Encoding(format!("图像处理线程执行失败：{}", e)))??;
        let prepare_elapsed = prepare_start.elapsed();

        let api_start = Instant::now();
        let raw = self.client.recognize(&encoded, &api_key, &model).await?;
        let api_elapsed = api_start.elapsed();

        let text = normalize(&raw);
        log::info!(
            "✅ 图像识别完成 - prepare={}ms api={}ms total={}ms",
            prepare_elapsed.as_millis(),
            api_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );
        Ok(text)
    }
}

/// 工作任务回传给事件循环的完成消息。
#[derive(Debug)]
pub struct Completion {
    pub ticket: u64,
    pub result: RecognitionResult,
}

/// 槽被占用时的拒绝错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("已有识别请求正在进行")]
pub struct SlotBusy;

/// 容量为 1 的识别任务槽，仅由事件循环线程访问。
#[derive(Debug)]
pub struct PipelineSlot {
    current: Option<u64>,
    next_ticket: u64,
    completions: mpsc::UnboundedSender<Completion>,
}

impl PipelineSlot {
    /// 创建任务槽，返回完成消息接收端。
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                current: None,
                next_ticket: 1,
                completions: tx,
            },
            rx,
        )
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// 在槽空闲时派发任务，返回任务票据。
    ///
    /// 任务在 tokio 运行时中执行；panic 会被转换为 `Failure`，完成消息恰好发送一次。
    pub fn submit<F>(&mut self, job: F) -> Result<u64, SlotBusy>
    where
        F: Future<Output = RecognitionResult> + Send + 'static,
    {
        if self.current.is_some() {
            return Err(SlotBusy);
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.current = Some(ticket);

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = match tokio::spawn(job).await {
                Ok(result) => result,
                Err(err) => {
                    log::error!("识别任务异常终止: {}", err);
                    RecognitionResult::Failure(format!("发生错误: 识别任务异常终止（{}）", err))
                }
            };
            if completions.send(Completion { ticket, result }).is_err() {
                log::warn!("事件循环已退出，丢弃识别结果 ticket={}", ticket);
            }
        });

        Ok(ticket)
    }

    /// 归还槽位；票据与当前任务不符时忽略并返回 `false`。
    pub fn complete(&mut self, ticket: u64) -> bool {
        if self.current == Some(ticket) {
            self.current = None;
            true
        } else {
            log::warn!("收到未知的完成消息 ticket={}，当前={:?}", ticket, self.current);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_handler::DecodedImage;
    use crate::recognition::client::RecognitionFuture;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    struct StaticClient {
        reply: Result<String, (Option<u16>, String)>,
        seen: Mutex<Vec<(usize, String, String)>>,
    }

    impl RecognitionClient for StaticClient {
        fn recognize<'a>(
            &'a self,
            image_base64: &'a str,
            api_key: &'a str,
            model: &'a str,
        ) -> RecognitionFuture<'a> {
            self.seen
                .lock()
                .expect("lock")
                .push((image_base64.len(), api_key.to_string(), model.to_string()));
            let reply = self.reply.clone();
            Box::pin(async move {
                reply.map_err(|(status, message)| AppError::api(status, message))
            })
        }
    }

    fn request(source: ImageSource) -> RecognitionRequest {
        RecognitionRequest {
            source,
            api_key: "key".to_string(),
            model: "gemini-2.0-flash".to_string(),
        }
    }

    fn memory_image() -> ImageSource {
        let pixels = RgbImage::from_pixel(1600, 900, Rgb([200, 10, 10]));
        ImageSource::Memory(DecodedImage::from_rgb(pixels).expect("valid image"))
    }

    #[tokio::test]
    async fn run_normalizes_successful_output() {
        let client = Arc::new(StaticClient {
            reply: Ok("```latex\n\\[a\\]\n```".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = RecognitionPipeline::new(ImageCodec::default(), client.clone());

        let result = pipeline.run(request(memory_image())).await;

        assert_eq!(result, RecognitionResult::Success("$$a$$".to_string()));
        let seen = client.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0 > 0);
        assert_eq!(seen[0].1, "key");
    }

    #[tokio::test]
    async fn client_error_becomes_single_failure() {
        let client = Arc::new(StaticClient {
            reply: Err((Some(403), "permission denied".to_string())),
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = RecognitionPipeline::new(ImageCodec::default(), client);

        let result = pipeline.run(request(memory_image())).await;

        match result {
            RecognitionResult::Failure(message) => {
                assert!(message.starts_with("发生错误"));
                assert!(message.contains("403"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_file_fails_before_network() {
        let client = Arc::new(StaticClient {
            reply: Ok("unused".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = RecognitionPipeline::new(ImageCodec::default(), client.clone());

        let result = pipeline
            .run(request(ImageSource::FilePath("/no/such/file.png".into())))
            .await;

        assert!(!result.is_success());
        assert!(client.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn slot_rejects_second_job_until_completed() {
        let (mut slot, mut completions) = PipelineSlot::new();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let ticket = slot
            .submit(async move {
                let _ = release_rx.await;
                RecognitionResult::Success("done".to_string())
            })
            .expect("slot is free");
        assert!(slot.is_busy());
        assert_eq!(
            slot.submit(async { RecognitionResult::Success("second".to_string()) }),
            Err(SlotBusy)
        );

        release_tx.send(()).expect("job waiting");
        let completion = completions.recv().await.expect("completion delivered");
        assert_eq!(completion.ticket, ticket);
        assert!(slot.complete(completion.ticket));
        assert!(!slot.is_busy());
        assert!(slot.submit(async { RecognitionResult::Success("third".to_string()) }).is_ok());
    }

    #[tokio::test]
    async fn panicking_job_still_reports_failure() {
        let (mut slot, mut completions) = PipelineSlot::new();

        slot.submit(async { panic!("boom") }).expect("slot is free");

        let completion = completions.recv().await.expect("completion delivered");
        assert!(matches!(completion.result, RecognitionResult::Failure(_)));
        assert!(slot.complete(completion.ticket));
    }

    #[test]
    fn stale_ticket_does_not_release_slot() {
        let (mut slot, _completions) = PipelineSlot::new();
        assert!(!slot.complete(42));
        assert!(!slot.is_busy());
    }
}
