//! 四个按精度排序的提取族
//!
//! 1) 显式函数语法 `function:|tool:|call: name(...)`；2) 内嵌 JSON 对象（```json 围栏或裸对象）；
//! 3) 文本中的资源定位符（裸域名 / http URL）映射为 navigate；4) 隐式意图关键词映射为 search。
//! 每族独立可测；族内单个畸形候选（引号/括号不配对、JSON 不合法）按候选丢弃，不影响同族其余匹配。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::normalize::{ToolCall, TOOL_NAVIGATE, TOOL_SEARCH};

static FUNCTION_RE: OnceLock<Regex> = OnceLock::new();
static FENCED_JSON_RE: OnceLock<Regex> = OnceLock::new();
static LENIENT_NAME_RE: OnceLock<Regex> = OnceLock::new();
static LENIENT_ARGS_RE: OnceLock<Regex> = OnceLock::new();
static LOCATOR_RE: OnceLock<Regex> = OnceLock::new();
static QUERY_RE: OnceLock<Regex> = OnceLock::new();

/// 隐式意图关键词；仅在所有高精度族落空后生效
const INTENT_KEYWORDS: [&str; 5] = ["search", "find", "look up", "news", "trending"];

/// 无具体短语可恢复时的固定默认查询
const DEFAULT_SEARCH_QUERY: &str = "latest trending news today";

/// 族 1：显式函数语法 `function: name(key="value", ...)`
pub fn extract_function_calls(text: &str) -> Vec<ToolCall> {
    let re = FUNCTION_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:function|tool|call)\s*:\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(([\s\S]*?)\)")
            .unwrap()
    });

    let mut calls = Vec::new();
    for cap in re.captures_iter(text) {
        let name = cap[1].to_string();
        // 畸形参数按候选丢弃，同族其余匹配不受影响
        if let Some(arguments) = parse_call_arguments(&cap[2]) {
            calls.push(ToolCall { name, arguments });
        }
    }
    calls
}

/// 解析调用参数：先按 JSON（裸键值对时补花括号），失败则回退 key=value 列表
fn parse_call_arguments(args: &str) -> Option<Map<String, Value>> {
    let trimmed = args.trim();
    if trimmed.is_empty() {
        return Some(Map::new());
    }

    let candidate = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        format!("{{{}}}", trimmed)
    };
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&candidate) {
        return Some(map);
    }

    // key=value 回退；引号不配对的候选整体丢弃
    if trimmed.matches('"').count() % 2 != 0 {
        return None;
    }
    let mut map = Map::new();
    for pair in trimmed.split(',') {
        let (key, value) = pair.split_once('=')?;
        let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        if key.is_empty() {
            return None;
        }
        map.insert(key.to_string(), coerce_scalar(value));
    }
    Some(map)
}

/// 将裸标量转为合适的 JSON 类型（bool / 整数 / 浮点 / 字符串）
fn coerce_scalar(value: &str) -> Value {
    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = value.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = value.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(value.to_string())
}

/// 族 2：内嵌 JSON——```json 围栏块优先，其次裸花括号对象；
/// 近似 JSON（可辨认 name/arguments 形状但整体不合法）走宽松恢复
pub fn extract_json_calls(text: &str) -> Vec<ToolCall> {
    let fenced_re =
        FENCED_JSON_RE.get_or_init(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").unwrap());

    let mut calls = Vec::new();
    for cap in fenced_re.captures_iter(text) {
        let block = &cap[1];
        match serde_json::from_str::<Value>(block) {
            Ok(value) => collect_named_objects(&value, &mut calls),
            Err(_) => lenient_recover(block, &mut calls),
        }
    }

    // 围栏外的裸对象（围栏内容替换为空格以免重复计入）
    let stripped = fenced_re.replace_all(text, " ");
    for span in balanced_brace_spans(&stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            collect_named_objects(&value, &mut calls);
        }
    }
    calls
}

/// 收集 {"name": ..., "arguments": ...} 形状的对象（数组逐项处理）
fn collect_named_objects(value: &Value, out: &mut Vec<ToolCall>) {
    match value {
        Value::Object(obj) => {
            if let Some(name) = obj.get("name").and_then(Value::as_str) {
                let arguments = match obj.get("arguments") {
                    Some(Value::Object(map)) => map.clone(),
                    // arguments 为字符串时尝试二次解析（模型常见输出形态）
                    Some(Value::String(s)) => serde_json::from_str::<Value>(s)
                        .ok()
                        .and_then(|v| v.as_object().cloned())
                        .unwrap_or_default(),
                    _ => Map::new(),
                };
                out.push(ToolCall {
                    name: name.to_string(),
                    arguments,
                });
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_named_objects(item, out);
            }
        }
        _ => {}
    }
}

/// 宽松恢复：从不合法 JSON 里直接抠 "name" 与 "arguments"
fn lenient_recover(block: &str, out: &mut Vec<ToolCall>) {
    let name_re =
        LENIENT_NAME_RE.get_or_init(|| Regex::new(r#""name"\s*:\s*"([^"]+)""#).unwrap());
    let args_re =
        LENIENT_ARGS_RE.get_or_init(|| Regex::new(r#""arguments"\s*:\s*(\{[^}]*\})"#).unwrap());

    let Some(name_cap) = name_re.captures(block) else {
        return;
    };
    let arguments = args_re
        .captures(block)
        .and_then(|c| serde_json::from_str::<Value>(&c[1]).ok())
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default();
    out.push(ToolCall {
        name: name_cap[1].to_string(),
        arguments,
    });
}

/// 扫描顶层配平的花括号区间（嵌套计数，不处理字符串内花括号的极端形态）
fn balanced_brace_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start.take() {
                            spans.push(&text[s..=i]);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

/// 族 3：资源定位符——裸域名或带 http(s) 前缀的 URL，映射为 navigate 调用
pub fn extract_locator_calls(text: &str) -> Vec<ToolCall> {
    let re = LOCATOR_RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:https?://)?(?:[a-z0-9][a-z0-9-]*\.)+[a-z]{2,}(?::\d+)?(?:/[^\s]*)?")
            .unwrap()
    });

    let mut calls = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let raw = m.as_str();
        let url = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        if seen.contains(&url) {
            continue;
        }
        seen.push(url.clone());
        calls.push(ToolCall::new(TOOL_NAVIGATE).with_arg("url", url));
    }
    calls
}

/// 族 4：隐式意图——search/find/news 等关键词映射为 search 调用；
/// 查询短语用有界模式从上下文恢复，恢复不到则用固定默认查询
pub fn extract_intent_calls(text: &str) -> Vec<ToolCall> {
    let lower = text.to_lowercase();
    if !INTENT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return Vec::new();
    }

    let re = QUERY_RE.get_or_init(|| {
        Regex::new(r#"(?im)(?:search for|look up|news about|find)\s+["“]?([^"”.\n]{1,80}?)["”]?\s*(?:\.|$)"#)
            .unwrap()
    });

    let query = re
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| DEFAULT_SEARCH_QUERY.to_string());

    vec![ToolCall::new(TOOL_SEARCH).with_arg("query", query)]
}
