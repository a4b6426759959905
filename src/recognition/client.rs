//! # 远程识别客户端
//!
//! ## 设计思路
//!
//! `RecognitionClient` 是流水线与远程模型之间的接缝：流水线只关心
//! “Base64 图片 + 凭据 → 原始文本”，具体的 HTTP 协议由实现负责，测试可注入假客户端。
//!
//! ## 实现思路
//!
//! - `GeminiClient` 复用单个 `reqwest::Client`，每次识别发送一次 `generateContent` 请求：
//!   `role=user`，`parts=[固定指令文本, inline_data(image/jpeg, Base64)]`。
//! - 非 2xx 响应解析 Google 错误体，连同 HTTP 状态码放入 `AppError::Api`。
//! - 不做自动重试：重试由用户或定时器重新触发整条流水线。
//! - 应用层不设超时，沿用 HTTP 客户端默认行为。

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const IMAGE_MIME_TYPE: &str = "image/jpeg";

/// 发送给模型的固定指令。
pub const INSTRUCTION_PROMPT: &str = "请以LaTeX代码格式输出图像中的所有内容，不需要documentclass声明。\
请确保微分符号d、虚数单位i和欧拉常数e为正体，使用\\mathrm{}包裹，对于加粗的符号使用\\bm{}包裹，不要使用\\mathbf。\
请注意分辨行内公式与行间公式，行间公式不要使用有编号的公式环境。\
对于行列式请使用vmatrix环境，对于矩阵请使用pmatrix环境。";

pub type RecognitionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;

/// 远程识别接口。
pub trait RecognitionClient: Send + Sync {
    /// 提交一张 JPEG（Base64）并返回模型的原始文本。
    fn recognize<'a>(
        &'a self,
        image_base64: &'a str,
        api_key: &'a str,
        model: &'a str,
    ) -> RecognitionFuture<'a>;
}

/// Gemini `generateContent` 客户端。
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiClient {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    /// 指定模型接口根地址（形如 `.../v1beta/models`）。
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.base_url, model.trim())
    }

    async fn generate(
        &self,
        image_base64: &str,
        api_key: &str,
        model: &str,
    ) -> Result<String, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::api(None, "未设置 API Key"));
        }

        let body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        { "text": INSTRUCTION_PROMPT },
                        {
                            "inline_data": {
                                "mime_type": IMAGE_MIME_TYPE,
                                "data": image_base64
                            }
                        }
                    ]
                }
            ]
        });

        log::info!("🌐 调用模型 {} - 图片 Base64 长度: {}", model, image_base64.len());

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::api(None, format!("网络请求失败: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::api(Some(status.as_u16()), format!("读取响应失败: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::api(
                Some(status.as_u16()),
                extract_gemini_error(&text).unwrap_or(text),
            ));
        }

        extract_text(&text).map_err(|message| AppError::api(Some(status.as_u16()), message))
    }
}

impl RecognitionClient for GeminiClient {
    fn recognize<'a>(
        &'a self,
        image_base64: &'a str,
        api_key: &'a str,
        model: &'a str,
    ) -> RecognitionFuture<'a> {
        Box::pin(self.generate(image_base64, api_key, model))
    }
}

/// 从成功响应中取出首个候选的全部文本片段。
fn extract_text(body: &str) -> Result<String, String> {
    let payload: GeminiResponse =
        serde_json::from_str(body).map_err(|e| format!("响应 JSON 解析失败: {}", e))?;

    let candidate = payload
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| "模型未返回候选结果".to_string())?;

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(format!("模型返回空文本（finishReason={}）", reason));
    }

    Ok(text)
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message.filter(|m| !m.trim().is_empty()) {
        parts.push(message);
    }
    if let Some(status) = error.status.filter(|s| !s.trim().is_empty()) {
        parts.push(format!("status: {}", status));
    }
    if parts.is_empty() { None } else { Some(parts.join(" | ")) }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// 启动只服务一次请求的 HTTP 服务器，返回根地址与捕获的请求文本。
    fn serve_once(status_line: &'static str, body: String) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let addr = listener.local_addr().expect("read local addr failed");

        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept failed");
            let mut reader = BufReader::new(stream);

            let mut head = String::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header failed");
                if let Some((name, value)) = line.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().expect("content-length");
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut request_body = vec![0u8; content_length];
            reader.read_exact(&mut request_body).expect("read body failed");

            let response = format!(
                concat!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\n",
                    "Content-Length: {}\r\nConnection: close\r\n\r\n{}"
                ),
                status_line,
                body.len(),
                body
            );
            let mut stream = reader.into_inner();
            stream.write_all(response.as_bytes()).expect("write response failed");
            stream.flush().expect("flush failed");

            format!("{}{}", head, String::from_utf8_lossy(&request_body))
        });

        (format!("http://127.0.0.1:{}/v1beta/models", addr.port()), server)
    }

    #[tokio::test]
    async fn recognize_sends_prompt_and_inline_jpeg() {
        let body = json!({
            "candidates": [
                { "content": { "parts": [ { "text": "```latex\n" }, { "text": "x^2\n```" } ] } }
            ]
        })
        .to_string();
        let (base_url, server) = serve_once("200 OK", body);

        let client = GeminiClient::with_base_url(base_url);
        let text = client
            .recognize("aGVsbG8=", "test-key", "gemini-2.0-flash")
            .await
            .expect("recognize should succeed");

        let request = server.join().expect("server thread failed");
        assert_eq!(text, "```latex\nx^2\n```");
        assert!(request.starts_with("POST /v1beta/models/gemini-2.0-flash:generateContent"));
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: test-key"));

        let json_start = request.find('{').expect("json body");
        let sent: serde_json::Value = serde_json::from_str(&request[json_start..]).expect("json");
        let parts = &sent["contents"][0]["parts"];
        assert_eq!(sent["contents"][0]["role"], "user");
        assert_eq!(parts[0]["text"], INSTRUCTION_PROMPT);
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "aGVsbG8=");
    }

    #[tokio::test]
    async fn auth_failure_carries_status_and_message() {
        let body = json!({
            "error": { "code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT" }
        })
        .to_string();
        let (base_url, server) = serve_once("400 Bad Request", body);

        let err = GeminiClient::with_base_url(base_url)
            .recognize("aGVsbG8=", "bad-key", "gemini-2.0-flash")
            .await
            .expect_err("auth failure must be an error");
        server.join().expect("server thread failed");

        match err {
            AppError::Api { status, message } => {
                assert_eq!(status, Some(400));
                assert!(message.contains("API key not valid."));
                assert!(message.contains("INVALID_ARGUMENT"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_response_is_api_error() {
        let (base_url, server) = serve_once("200 OK", "<html>oops</html>".to_string());

        let err = GeminiClient::with_base_url(base_url)
            .recognize("aGVsbG8=", "key", "gemini-2.0-flash")
            .await
            .expect_err("malformed body must be an error");
        server.join().expect("server thread failed");

        assert!(matches!(err, AppError::Api { status: Some(200), .. }));
    }

    #[tokio::test]
    async fn network_failure_is_api_error_without_status() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let err = GeminiClient::with_base_url(format!("http://127.0.0.1:{}/models", port))
            .recognize("aGVsbG8=", "key", "gemini-2.0-flash")
            .await
            .expect_err("closed port must fail");

        assert!(matches!(err, AppError::Api { status: None, .. }));
    }

    #[tokio::test]
    async fn empty_api_key_is_rejected_before_network() {
        let err = GeminiClient::with_base_url("http://127.0.0.1:9/models")
            .recognize("aGVsbG8=", "  ", "gemini-2.0-flash")
            .await
            .expect_err("blank key must fail");

        assert!(matches!(err, AppError::Api { status: None, .. }));
    }

    #[test]
    fn empty_candidate_reports_finish_reason() {
        let body = json!({ "candidates": [ { "finishReason": "SAFETY" } ] }).to_string();
        let err = extract_text(&body).expect_err("empty text");
        assert!(err.contains("SAFETY"));
    }
}
