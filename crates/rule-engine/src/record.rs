//! 数据记录适配
//!
//! 引擎只需要按字段名取值的能力；表格行（表头 + 值）、JSON 树和普通 Map
//! 都通过 [`Record`] 接入。

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

/// 按字段名取值，字段不存在时返回 `None`
pub trait Record {
    fn get_field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// 表格行：表头列表与值列表一一对应
#[derive(Debug, Clone, Default)]
pub struct TabularRecord {
    headers: Vec<String>,
    values: Vec<String>,
}

impl TabularRecord {
    pub fn new(headers: Vec<String>, values: Vec<String>) -> Self {
        Self { headers, values }
    }

    /// 从 (表头, 值) 对构建
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let (headers, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { headers, values }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl Record for TabularRecord {
    /// 表头匹配不区分大小写；值列表短于表头时视为字段缺失
    fn get_field(&self, name: &str) -> Option<Cow<'_, str>> {
        let index = self
            .headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))?;
        self.values.get(index).map(|v| Cow::Borrowed(v.as_str()))
    }
}

/// 树形记录 - 基于 JSON 值，字段名支持点号路径
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    data: Value,
}

impl EvaluationContext {
    pub fn new(data: Value) -> Self {
        Self { data }
    }

    /// 从 JSON 对象创建
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: Value = serde_json::from_str(json)?;
        Ok(Self { data })
    }

    /// 获取节点（支持点号分隔的路径，如 "item.price" 或 "items.0.sku"）
    pub fn get_value(&self, path: &str) -> Option<&Value> {
        let mut current = &self.data;

        for part in path.split('.') {
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// 获取底层数据
    pub fn data(&self) -> &Value {
        &self.data
    }
}

impl Record for EvaluationContext {
    fn get_field(&self, name: &str) -> Option<Cow<'_, str>> {
        match self.get_value(name)? {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

impl Record for HashMap<String, String> {
    fn get_field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl Record for BTreeMap<String, String> {
    fn get_field(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(|v| Cow::Borrowed(v.as_str()))
    }
}
