//! LLM 输出解析：提取 JSON 块并反序列化为角色的类型化结果

use serde::de::DeserializeOwned;

use crate::core::WorkerError;
use crate::workflow::WorkerRole;

/// 提取 JSON 片段（```json ... ``` 代码块，或首个 `{` 到末个 `}`）
pub fn extract_json_block(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析为 T；找不到 JSON 或结构不符时返回 MalformedOutput
pub fn parse_json_output<T: DeserializeOwned>(role: WorkerRole, output: &str) -> Result<T, WorkerError> {
    let json_str = extract_json_block(output).ok_or_else(|| WorkerError::MalformedOutput {
        role,
        detail: "no JSON object in output".to_string(),
    })?;
    serde_json::from_str(json_str).map_err(|e| WorkerError::MalformedOutput {
        role,
        detail: format!("{e}: {json_str}"),
    })
}
