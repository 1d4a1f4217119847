//! 聚合器：按调用顺序合并多个 Worker 的输出

use thiserror::Error;

use crate::workflow::RoleOutputs;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregateError {
    /// 没有任何 Worker 产出，调用方不应在这种情况下聚合
    #[error("nothing to aggregate: no worker produced output")]
    Empty,
}

/// 每段以角色标签开头（"tag: 输出"），段与段之间空一行；结果只取决于输入顺序与内容
pub fn aggregate(outputs: &RoleOutputs) -> Result<String, AggregateError> {
    if outputs.is_empty() {
        return Err(AggregateError::Empty);
    }
    Ok(outputs
        .iter()
        .map(|(role, text)| format!("{}: {}", role.tag(), text))
        .collect::<Vec<_>>()
        .join("\n\n"))
}
