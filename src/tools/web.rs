//! 网页工具：导航、搜索、正文提取
//!
//! 三个工具共享一个 PageFetcher：域名白名单（为空表示不限制）、超时、
//! 结果大小限制；HTML 响应用 html2text 提取可读文本，去除标签与脚本。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut prev_whitespace = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => {
                let is_whitespace = c.is_whitespace();
                if is_whitespace && prev_whitespace {
                    continue;
                }
                prev_whitespace = is_whitespace;
                out.push(if is_whitespace { ' ' } else { c });
            }
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

/// 去除正文前导 BOM（U+FEFF 为 3 字节，不能按字节下标切；可能连续出现多个）
fn strip_bom(body: &str) -> &str {
    body.trim_start_matches('\u{FEFF}')
}

/// 从 URL 中提取 host（不含端口后的路径）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// 共享抓取器：白名单、超时、截断
pub struct PageFetcher {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl PageFetcher {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        let allowed_domains = allowed_domains.into_iter().map(|s| s.to_lowercase()).collect();
        // 使用现代浏览器 UA 与常用请求头，避免被站点识别为爬虫
        const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains,
            max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        let domain = extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.is_empty() || self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(&self, html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    fn truncate(&self, body: String) -> String {
        let len = body.chars().count();
        if len > self.max_result_chars {
            body.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]"
        } else {
            body
        }
    }

    /// 抓取 URL 并返回可读文本；白名单校验在发请求前完成
    pub async fn fetch(&self, url: &str) -> Result<String, String> {
        self.is_allowed(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let raw = resp.text().await.map_err(|e| format!("Read body: {}", e))?;

        // 先去 BOM，避免 HTML 检测失败
        let stripped = strip_bom(&raw);
        let body = if looks_like_html(stripped) {
            self.html_to_text(stripped)
        } else {
            stripped.to_string()
        };
        Ok(self.truncate(body))
    }
}

/// navigate 工具：抓取 URL，返回页面可读文本
pub struct NavigateTool {
    fetcher: Arc<PageFetcher>,
}

impl NavigateTool {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for NavigateTool {
    fn name(&self) -> &str {
        "navigate"
    }

    fn description(&self) -> &str {
        "Open a web page and return its readable text. Args: {\"url\": \"https://...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim();
        if url.is_empty() {
            return Err("Missing url".to_string());
        }
        tracing::info!(url = %url, "navigate tool fetch");
        let text = self.fetcher.fetch(url).await?;
        Ok(format!("Navigated to {}\n\n{}", url, text))
    }
}

/// search 工具：通过 DuckDuckGo HTML 端点查询，返回结果页可读文本
pub struct SearchTool {
    fetcher: Arc<PageFetcher>,
}

impl SearchTool {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web for a query and return result snippets. Args: {\"query\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("").trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        let url = format!(
            "https://html.duckduckgo.com/html/?q={}",
            urlencode(query)
        );
        tracing::info!(query = %query, "search tool fetch");
        let text = self.fetcher.fetch(&url).await?;
        Ok(format!("Search results for \"{}\":\n\n{}", query, text))
    }
}

/// extract 工具：按 goal 从指定 URL（或直接给定的 content）提取正文
pub struct ExtractTool {
    fetcher: Arc<PageFetcher>,
}

impl ExtractTool {
    pub fn new(fetcher: Arc<PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for ExtractTool {
    fn name(&self) -> &str {
        "extract"
    }

    fn description(&self) -> &str {
        "Extract page content for a stated goal. Args: {\"url\": \"https://...\", \"goal\": \"...\"} or {\"content\": \"...\", \"goal\": \"...\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let goal = args.get("goal").and_then(|v| v.as_str()).unwrap_or("extract main content");
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("").trim().to_string();
        let body = if !url.is_empty() {
            tracing::info!(url = %url, goal = %goal, "extract tool fetch");
            self.fetcher.fetch(&url).await?
        } else {
            match args.get("content").and_then(|v| v.as_str()) {
                Some(c) if !c.trim().is_empty() => c.to_string(),
                _ => return Err("Missing url or content".to_string()),
            }
        };
        Ok(format!("Extraction goal: {}\n\n{}", goal, body))
    }
}

/// 最小 percent 编码：仅保留 URL 查询安全字符
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
