//! 规则引擎错误类型
//!
//! 条件和公式层面的错误在规则集评估时转换为诊断信息和降级结果；
//! 只有定义解析和存储查找的错误会返回给调用方。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("无效的规则定义: {0}")]
    InvalidDefinition(String),

    #[error("取值失败: {0}")]
    ResolutionError(String),

    #[error("无效的比较符: {comparator} 不支持类型 {value_type}")]
    InvalidOperator {
        comparator: String,
        value_type: String,
    },

    #[error("公式错误: {0}")]
    EquationError(String),

    #[error("规则集未找到: {0}")]
    RuleSetNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
