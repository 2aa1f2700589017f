//! 工具调用归一化
//!
//! 模型自由文本的可靠性方差无上界：严格单一文法会悄悄丢掉合法意图，
//! 因此归一化是分层回退链——四个按精度排序的提取族，仅当更高精度的族
//! 一无所获时才评估下一族；命中族内的所有匹配按出现顺序收集。
//! 对相同输入输出序列完全相同（无随机性、无隐藏状态），全输入域不 panic。

pub mod strategies;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use strategies::{
    extract_function_calls, extract_intent_calls, extract_json_calls, extract_locator_calls,
};

/// 规范工具名：导航
pub const TOOL_NAVIGATE: &str = "navigate";
/// 规范工具名：搜索
pub const TOOL_SEARCH: &str = "search";
/// 规范工具名：正文提取
pub const TOOL_EXTRACT: &str = "extract";
/// 规范工具名：文档落盘
pub const TOOL_WRITE_FILE: &str = "write_file";

/// 归一化后的工具调用；相等为结构相等
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.to_string(), value.into());
        self
    }

    /// 取字符串参数（缺失或非字符串时返回空串）
    pub fn arg_str(&self, key: &str) -> &str {
        self.arguments.get(key).and_then(Value::as_str).unwrap_or("")
    }
}

/// 提取族：名称用于日志，函数为无状态纯解析
type Strategy = fn(&str) -> Vec<ToolCall>;

/// 精度降序的提取族表；顺序即优先级
const STRATEGIES: &[(&str, Strategy)] = &[
    ("function_syntax", extract_function_calls),
    ("embedded_json", extract_json_calls),
    ("resource_locator", extract_locator_calls),
    ("implicit_intent", extract_intent_calls),
];

/// 从原始模型输出提取规范工具调用序列；完全失败时返回空序列，从不抛错
pub fn normalize(raw: &str) -> Vec<ToolCall> {
    for (family, extract) in STRATEGIES {
        let calls = extract(raw);
        if !calls.is_empty() {
            tracing::debug!(family, count = calls.len(), "tool calls normalized");
            return calls;
        }
    }
    Vec::new()
}
