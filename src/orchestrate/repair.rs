//! 推理服务输出的 JSON 修复与提取
//!
//! extract_and_fix_json：「永不失败」契约——任何输入都返回 None、清洗后的文本或解析成功的
//! JSON 值，绝不报错。extract_and_merge_json：扫描全部非嵌套花括号片段并深合并，
//! 用于合并工具智能体分多段吐出的 JSON。get_json_key：结构化取键，退化到脆弱的
//! 子串切片兜底（仅对受 prompt 强约束的 Verifier 回复形状可用，勿推广）。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// 修复结果：解析成功的 JSON 值，或清洗后仍不可解析的原始文本
#[derive(Debug, Clone, PartialEq)]
pub enum Repaired {
    Json(Value),
    Text(String),
}

/// 从自由文本中提取并修复单个 JSON 对象
///
/// 取首个 `{` 到末个 `}` 的子串，依次应用：
/// 1. 行级尾逗号修复（含 `]`/`}` 的行，其前一行去掉行尾逗号）
/// 2. 花括号不配平时把 `}` 全部替换为 `]`（LLM 用 `}` 闭合数组的常见病）
/// 3. 剔除控制字符（保留 \n \r \t）
/// 找不到括号对返回 None；清洗后解析失败返回 Text（调用方按不透明文本处理）。
pub fn extract_and_fix_json(text: &str) -> Option<Repaired> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    let json_str = &text[start..=end];

    // 1. 尾逗号修复
    let lines: Vec<&str> = json_str.split('\n').collect();
    let mut fixed: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    for i in 1..lines.len() {
        if lines[i].contains(']') || lines[i].contains('}') {
            fixed[i - 1] = fixed[i - 1].trim_end_matches(',').to_string();
        }
    }
    let mut json_str = fixed.join("\n");

    // 2. 花括号配平
    let opens = json_str.matches('{').count();
    let closes = json_str.matches('}').count();
    if closes > 0 && opens > closes {
        json_str = json_str.replace('}', "]");
    }

    // 3. 控制字符
    let cleaned: String = json_str
        .chars()
        .filter(|c| (*c as u32) >= 32 || matches!(c, '\n' | '\r' | '\t'))
        .collect();

    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => Some(Repaired::Json(value)),
        Err(e) => {
            tracing::debug!(error = %e, "JSON repair could not produce a parseable value");
            Some(Repaired::Text(cleaned))
        }
    }
}

fn object_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").unwrap())
}

/// 找出文本中所有花括号片段、逐个解析（坏片段跳过）并深合并：
/// 同键且双方都是数组时拼接，否则后者覆盖前者。
pub fn extract_and_merge_json(text: &str) -> Value {
    let mut merged = Map::new();
    for m in object_pattern().find_iter(text) {
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(m.as_str()) else {
            continue;
        };
        for (key, value) in obj {
            match (merged.get_mut(&key), &value) {
                (Some(Value::Array(existing)), Value::Array(incoming)) => {
                    existing.extend(incoming.clone());
                }
                _ => {
                    merged.insert(key, value);
                }
            }
        }
    }
    Value::Object(merged)
}

/// 从修复结果中取键值（统一转为字符串）
///
/// 结构化对象直接取键；文本先尝试整体 JSON 解析，失败则退化为子串切片：
/// 键名之后的首个冒号到首个逗号之间、去引号去空白。切片兜底只在 Verifier 的
/// 固定回复形状下有意义。
pub fn get_json_key(input: &Repaired, key: &str) -> Option<String> {
    match input {
        Repaired::Json(value) => value.get(key).map(value_to_string),
        Repaired::Text(text) => {
            if let Ok(value) = serde_json::from_str::<Value>(text) {
                return value.get(key).map(value_to_string);
            }
            let after_key = text.split_once(key)?.1;
            let after_colon = after_key.split_once(':')?.1;
            let raw = after_colon.split(',').next().unwrap_or("");
            Some(raw.replace('"', "").trim().to_string())
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
