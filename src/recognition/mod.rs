//! # 识别模块（recognition）
//!
//! - `client`：远程模型接口与 Gemini 实现
//! - `normalizer`：模型输出的 LaTeX 规范化
//! - `pipeline`：解码 → 压缩 → 编码 → 识别 → 规范化 的编排，以及单任务槽
//!
//! ```text
//! RecognitionRequest
//!    ↓
//! PipelineSlot::submit（槽被占用时拒绝）
//!    ↓
//! RecognitionPipeline::run ── spawn_blocking(decode/compress/base64)
//!    ↓                     └─ RecognitionClient::recognize
//! normalize
//!    ↓
//! Completion { ticket, RecognitionResult } → 事件循环
//! ```

mod client;
mod normalizer;
mod pipeline;

pub use client::{GeminiClient, INSTRUCTION_PROMPT, RecognitionClient, RecognitionFuture};
pub use normalizer::normalize;
pub use pipeline::{
    Completion, PipelineSlot, RecognitionPipeline, RecognitionRequest, RecognitionResult, SlotBusy,
};
