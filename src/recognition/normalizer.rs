//! # 输出规范化模块
//!
//! 模型返回的 LaTeX 常带 Markdown 代码块标记与 `\[ \]`、`\( \)`、`equation*`、`align*`
//! 等多种写法，这里统一改写为 `$$ ... $$` / `$ ... $`。
//!
//! 该处理只影响展示效果：内部任何失败都原样返回输入，不向上报错。
//! 对已规范化的文本再次处理结果不变。

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_FENCE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^```[\w+\-]*[ \t]*(?:\r?\n|$)"));

static EQUATION_STAR: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{equation\*\}(.*?)\\end\{equation\*\}"));

static ALIGN_STAR: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{align\*\}(.*?)\\end\{align\*\}"));

const DELIMITERS: [(&str, &str); 4] = [(r"\[", "$$"), (r"\]", "$$"), (r"\(", "$"), (r"\)", "$")];

/// 规范化模型输出。
pub fn normalize(raw: &str) -> String {
    match try_normalize(raw) {
        Ok(text) => text,
        Err(err) => {
            log::error!("处理LaTeX输出失败: {}", err);
            raw.to_string()
        }
    }
}

fn try_normalize(raw: &str) -> Result<String, regex::Error> {
    let leading_fence = compiled(&LEADING_FENCE)?;
    let equation = compiled(&EQUATION_STAR)?;
    let align = compiled(&ALIGN_STAR)?;

    let mut text = strip_fences(raw, leading_fence);

    for (from, to) in DELIMITERS {
        text = text.replace(from, to);
    }

    // 嵌套环境需要多轮改写，每轮至少消去一对标记
    loop {
        let rewritten = align
            .replace_all(&equation.replace_all(&text, "$$$$ ${1} $$$$"), "$$$$ ${1} $$$$")
            .into_owned();
        if rewritten == text {
            break;
        }
        text = rewritten;
    }

    Ok(text)
}

fn compiled(
    pattern: &'static Lazy<Result<Regex, regex::Error>>,
) -> Result<&'static Regex, regex::Error> {
    Lazy::force(pattern).as_ref().map_err(|e| e.clone())
}

/// 去掉首尾空白以及首部 ```（可带语言标记）和尾部 ```，直到文本不再以代码块标记开头或结尾。
///
/// 语言标记必须独占开头一行；同一行后面还有内容时只去掉三个反引号。
fn strip_fences(raw: &str, leading_fence: &Regex) -> String {
    let mut text = raw.trim();
    loop {
        let mut changed = false;
        if let Some(found) = leading_fence.find(text) {
            text = text[found.end()..].trim();
            changed = true;
        } else if let Some(stripped) = text.strip_prefix("```") {
            text = stripped.trim();
            changed = true;
        }
        if let Some(stripped) = text.strip_suffix("```") {
            text = stripped.trim();
            changed = true;
        }
        if !changed {
            return text.to_string();
        }
    }
}
