//! 规则定义与评估结果模型
//!
//! 规则集以 JSON 持久化：若干条件定义加一个公式定义。公式既可以写成紧凑字符串
//! （如 `"a+b"`），也可以写成显式的 token 列表。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RuleError};

/// 规则集定义
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSetDefinition {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    #[serde(default)]
    pub equation: EquationDefinition,
}

impl RuleSetDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 条件编号上限；公式修复会为每个编号追加元素，编号过大时直接拒绝
pub const MAX_CONDITION_ID: usize = 4095;

/// 条件编号：字母 A..Z 或整数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionId {
    Index(usize),
    Alias(String),
}

impl ConditionId {
    /// 解析为从 0 开始的编号，字母不区分大小写；超过 [`MAX_CONDITION_ID`] 时报错
    pub fn index(&self) -> Result<usize> {
        let id = self.parse_index()?;
        if id > MAX_CONDITION_ID {
            return Err(RuleError::InvalidDefinition(format!(
                "条件编号 {} 超过上限 {}",
                id, MAX_CONDITION_ID
            )));
        }
        Ok(id)
    }

    fn parse_index(&self) -> Result<usize> {
        match self {
            Self::Index(i) => Ok(*i),
            Self::Alias(s) => {
                let s = s.trim();
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => {
                        Ok((c.to_ascii_lowercase() as u8 - b'a') as usize)
                    }
                    _ => s.parse::<usize>().map_err(|_| {
                        RuleError::InvalidDefinition(format!("无效的条件编号: '{}'", s))
                    }),
                }
            }
        }
    }
}

impl From<usize> for ConditionId {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for ConditionId {
    fn from(alias: &str) -> Self {
        Self::Alias(alias.to_string())
    }
}

/// 条件定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub id: ConditionId,
    pub comparator: String,
    #[serde(default)]
    pub left: Option<ValueNodeDefinition>,
    #[serde(default)]
    pub right: Option<ValueNodeDefinition>,
}

impl ConditionDefinition {
    pub fn new(
        id: impl Into<ConditionId>,
        comparator: impl Into<String>,
        left: ValueNodeDefinition,
        right: ValueNodeDefinition,
    ) -> Self {
        Self {
            id: id.into(),
            comparator: comparator.into(),
            left: Some(left),
            right: Some(right),
        }
    }
}

/// 取值节点定义
///
/// 带 `left` / `right` 子节点时为复合节点，否则 `value` 为字面量或字段名。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueNodeDefinition {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub left: Option<Box<ValueNodeDefinition>>,
    #[serde(default)]
    pub right: Option<Box<ValueNodeDefinition>>,
}

impl ValueNodeDefinition {
    /// 字段引用
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            kind: Some("Field".to_string()),
            value: Some(Value::String(name.into())),
            ..Default::default()
        }
    }

    /// 字面量
    pub fn literal(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            value: Some(Value::String(value.into())),
            ..Default::default()
        }
    }

    /// 复合节点
    pub fn compound(
        kind: impl Into<String>,
        operator: impl Into<String>,
        left: ValueNodeDefinition,
        right: ValueNodeDefinition,
    ) -> Self {
        Self {
            kind: Some(kind.into()),
            value: None,
            operator: Some(operator.into()),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
        }
    }

    pub fn is_compound(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    /// 字面量文本，数字和布尔值按 JSON 文本处理
    pub fn value_text(&self) -> Option<String> {
        match self.value.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// 公式定义
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EquationDefinition {
    Formula { formula: String },
    Tokens { tokens: Vec<TokenDefinition> },
}

impl Default for EquationDefinition {
    fn default() -> Self {
        Self::Formula {
            formula: String::new(),
        }
    }
}

/// 公式 token：运算符名称，`NodeRef` 时附带条件编号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDefinition {
    pub op: String,
    #[serde(default)]
    pub value: Option<ConditionId>,
}

/// 评估结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub rule_set_id: String,
    pub matched_conditions: Vec<String>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_ms: i64,
}

impl EvaluationResult {
    pub fn new(rule_set_id: String) -> Self {
        Self {
            rule_set_id,
            ..Default::default()
        }
    }
}
