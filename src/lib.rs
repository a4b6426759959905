//! # 剪贴板 LaTeX 识别工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            展示层（Presenter + ControllerHandle）         │
//! │   on_progress / on_result / on_error / on_finished       │
//! │   trigger_from_file / trigger_from_image / 监控开关 / 复制 │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ mpsc 命令 / 回调
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            核心 (Rust)                           │
//! │                                                          │
//! │  ┌─ clipboard ──── 事件循环 + 采样 + arboard 读写         │
//! │  │   ├─ watcher        ClipboardState / 指纹比较          │
//! │  │   └─ controller     定时器 · 冷却 · 单任务槽           │
//! │  │                                                       │
//! │  ├─ recognition ── 识别流水线                             │
//! │  │   ├─ pipeline       decode → compress → base64 → api  │
//! │  │   ├─ client         Gemini generateContent            │
//! │  │   └─ normalizer     LaTeX 输出规范化                   │
//! │  │                                                       │
//! │  ├─ image_handler  截图解码 · 压缩 · 编码 · 指纹           │
//! │  ├─ settings       JSON 设置文件（原子写入）               │
//! │  └─ error          AppError (统一错误类型)                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`clipboard`] | 剪贴板读写抽象、变化检测、识别事件循环 |
//! | [`recognition`] | 识别流水线、远程模型客户端、输出规范化 |
//! | [`image_handler`] | 截图多策略解码、等比压缩、JPEG/Base64 编码、MD5 指纹 |
//! | [`settings`] | API Key / 模型 / 轮询间隔的读取与保存 |
//! | [`presenter`] | 展示层回调接口与日志实现 |

pub mod clipboard;
pub mod error;
pub mod image_handler;
pub mod presenter;
pub mod recognition;
pub mod settings;
