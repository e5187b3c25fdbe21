//! 取值节点与取值解析
//!
//! 取值节点可以是字面量、字段引用，或两个子节点的算术组合。每次评估都会重新
//! 解析，得到 (文本值, 类型) 对；字段值的类型按 日期 → 时长 → 整数 → 浮点 的
//! 顺序试探推断，都不匹配则视为字符串。

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostics;
use crate::error::{Result, RuleError};
use crate::models::ValueNodeDefinition;
use crate::operators::ArithmeticOperator;
use crate::record::Record;

/// 取值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    String,
    Int,
    Float,
    Date,
    Duration,
    Field,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, Self::Date | Self::Duration)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Date => "Date",
            Self::Duration => "Duration",
            Self::Field => "Field",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ValueKind {
    type Err = RuleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Self::String,
            "int" | "integer" => Self::Int,
            "float" | "double" | "decimal" => Self::Float,
            "date" | "datetime" => Self::Date,
            "duration" | "datespan" => Self::Duration,
            "field" => Self::Field,
            other => {
                return Err(RuleError::InvalidDefinition(format!("未知的取值类型: '{}'", other)));
            }
        };
        Ok(kind)
    }
}

/// 时长单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DurationUnit {
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    fn minutes(self) -> i64 {
        match self {
            Self::Minutes => 1,
            Self::Hours => 60,
            Self::Days => 1440,
        }
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes => write!(f, "Minutes"),
            Self::Hours => write!(f, "Hours"),
            Self::Days => write!(f, "Days"),
        }
    }
}

static DURATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([+-]?\d+)\s+([A-Za-z]\w*)\s*$").expect("duration pattern is valid")
});

/// 时长，文本形式为 `"<整数> <单位>"`，如 `"3 Days"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateSpan {
    pub amount: i64,
    pub unit: DurationUnit,
}

impl DateSpan {
    pub fn new(amount: i64, unit: DurationUnit) -> Self {
        Self { amount, unit }
    }

    /// 单位按首字母匹配（d / h / m），不区分大小写
    pub fn parse(text: &str) -> Option<Self> {
        let caps = DURATION_PATTERN.captures(text)?;
        let amount: i64 = caps[1].parse().ok()?;
        let unit = match caps[2].chars().next()?.to_ascii_lowercase() {
            'd' => DurationUnit::Days,
            'h' => DurationUnit::Hours,
            'm' => DurationUnit::Minutes,
            _ => return None,
        };
        Some(Self { amount, unit })
    }

    /// 折算为分钟，溢出时返回 `None`
    pub fn total_minutes(&self) -> Option<i64> {
        self.amount.checked_mul(self.unit.minutes())
    }

    fn from_minutes(minutes: i64, unit: DurationUnit) -> Self {
        Self {
            amount: minutes / unit.minutes(),
            unit,
        }
    }

    /// 两个日期之差，取能整除的最大单位
    fn between(later: NaiveDateTime, earlier: NaiveDateTime) -> Self {
        let minutes = (later - earlier).num_minutes();
        let unit = if minutes % DurationUnit::Days.minutes() == 0 {
            DurationUnit::Days
        } else if minutes % DurationUnit::Hours.minutes() == 0 {
            DurationUnit::Hours
        } else {
            DurationUnit::Minutes
        };
        Self::from_minutes(minutes, unit)
    }

    /// 相加或相减，结果取两者中较细的单位
    fn combine(self, other: Self, negate: bool) -> Option<Self> {
        let unit = self.unit.min(other.unit);
        let rhs = if negate {
            other.total_minutes()?.checked_neg()?
        } else {
            other.total_minutes()?
        };
        let total = self.total_minutes()?.checked_add(rhs)?;
        Some(Self::from_minutes(total, unit))
    }

    fn to_delta(self) -> Option<TimeDelta> {
        match self.unit {
            DurationUnit::Days => TimeDelta::try_days(self.amount),
            DurationUnit::Hours => TimeDelta::try_hours(self.amount),
            DurationUnit::Minutes => TimeDelta::try_minutes(self.amount),
        }
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit)
    }
}

const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// 解析日期时间
pub fn parse_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// 零点只输出日期部分
pub fn format_date(dt: NaiveDateTime) -> String {
    if dt.time() == chrono::NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// 解析浮点数，必须包含数字（"nan"、"inf" 之类按字符串处理）
pub fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim();
    if !text.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// 推断字段值类型
pub fn infer_kind(text: &str) -> ValueKind {
    if parse_date(text).is_some() {
        ValueKind::Date
    } else if DateSpan::parse(text).is_some() {
        ValueKind::Duration
    } else if text.trim().parse::<i64>().is_ok() {
        ValueKind::Int
    } else if parse_float(text).is_some() {
        ValueKind::Float
    } else {
        ValueKind::String
    }
}

/// 解析后的取值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedValue {
    pub value: Option<String>,
    pub kind: ValueKind,
}

impl TypedValue {
    pub fn new(value: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            value: Some(value.into()),
            kind,
        }
    }

    pub fn absent(kind: ValueKind) -> Self {
        Self { value: None, kind }
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    pub fn as_str(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// 取值节点
#[derive(Debug, Clone, PartialEq)]
pub enum ValueNode {
    Literal {
        kind: ValueKind,
        text: String,
    },
    Field(String),
    Compound {
        kind: ValueKind,
        operator: ArithmeticOperator,
        left: Box<ValueNode>,
        right: Box<ValueNode>,
    },
}

impl ValueNode {
    pub fn literal(kind: ValueKind, text: impl Into<String>) -> Self {
        Self::Literal {
            kind,
            text: text.into(),
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::Field(name.into())
    }

    pub fn compound(
        kind: ValueKind,
        operator: ArithmeticOperator,
        left: ValueNode,
        right: ValueNode,
    ) -> Self {
        Self::Compound {
            kind,
            operator,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// 从持久化定义构建
    pub fn from_definition(def: &ValueNodeDefinition) -> Result<Self> {
        let kind: ValueKind = def
            .kind
            .as_deref()
            .ok_or_else(|| RuleError::InvalidDefinition("取值节点缺少 kind".to_string()))?
            .parse()?;

        if def.is_compound() {
            if kind == ValueKind::Field {
                return Err(RuleError::InvalidDefinition(
                    "复合节点的 kind 不能为 Field".to_string(),
                ));
            }

            let (Some(left), Some(right)) = (&def.left, &def.right) else {
                return Err(RuleError::InvalidDefinition(
                    "复合节点需要 left 和 right 两个子节点".to_string(),
                ));
            };

            let operator = match def.operator.as_deref() {
                Some(op) => op.parse()?,
                None => ArithmeticOperator::None,
            };

            return Ok(Self::compound(
                kind,
                operator,
                Self::from_definition(left)?,
                Self::from_definition(right)?,
            ));
        }

        let text = def.value_text().ok_or_else(|| {
            RuleError::InvalidDefinition(format!("{} 节点缺少 value", kind))
        })?;

        if kind == ValueKind::Field {
            if text.trim().is_empty() {
                return Err(RuleError::InvalidDefinition("字段名不能为空".to_string()));
            }
            return Ok(Self::Field(text.trim().to_string()));
        }

        Ok(Self::Literal { kind, text })
    }

    /// 定义中声明的类型
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Literal { kind, .. } | Self::Compound { kind, .. } => *kind,
            Self::Field(_) => ValueKind::Field,
        }
    }
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal { text, .. } => write!(f, "{}", text),
            Self::Field(name) => write!(f, "{}", name),
            Self::Compound {
                operator: ArithmeticOperator::None,
                left,
                ..
            } => write!(f, "{}", left),
            Self::Compound {
                operator,
                left,
                right,
                ..
            } => write!(f, "({} {} {})", left, operator.symbol(), right),
        }
    }
}

/// 参与日期运算的操作数
enum Temporal {
    Date(NaiveDateTime),
    Span(DateSpan),
}

/// 取值解析器
///
/// 解析失败时报告诊断并返回缺失值，不会向外传播错误。
pub struct ValueResolver<'a> {
    record: &'a dyn Record,
    diagnostics: &'a Diagnostics,
    float_precision: usize,
}

impl<'a> ValueResolver<'a> {
    pub fn new(record: &'a dyn Record, diagnostics: &'a Diagnostics) -> Self {
        Self {
            record,
            diagnostics,
            float_precision: 2,
        }
    }

    pub fn with_float_precision(mut self, precision: usize) -> Self {
        self.float_precision = precision;
        self
    }

    pub fn resolve(&self, node: &ValueNode) -> TypedValue {
        match self.try_resolve(node) {
            Ok(value) => value,
            Err(e) => {
                self.diagnostics.error(e.to_string(), node.to_string());
                let kind = match node.kind() {
                    ValueKind::Field => ValueKind::String,
                    other => other,
                };
                TypedValue::absent(kind)
            }
        }
    }

    fn try_resolve(&self, node: &ValueNode) -> Result<TypedValue> {
        match node {
            ValueNode::Literal { kind, text } => self.resolve_literal(*kind, text),
            ValueNode::Field(name) => Ok(self.resolve_field(name)),
            ValueNode::Compound {
                kind,
                operator,
                left,
                right,
            } => match kind {
                ValueKind::Date | ValueKind::Duration => {
                    self.resolve_temporal(*operator, left, right)
                }
                _ => self.resolve_numeric(*kind, *operator, left, right),
            },
        }
    }

    fn resolve_literal(&self, kind: ValueKind, text: &str) -> Result<TypedValue> {
        let valid = match kind {
            ValueKind::Date if text.trim().eq_ignore_ascii_case("today") => {
                let now = Local::now().naive_local();
                return Ok(TypedValue::new(
                    now.format("%Y-%m-%d %H:%M:%S").to_string(),
                    ValueKind::Date,
                ));
            }
            ValueKind::Date => parse_date(text).is_some(),
            ValueKind::Duration => DateSpan::parse(text).is_some(),
            ValueKind::Int => text.trim().parse::<i64>().is_ok(),
            ValueKind::Float => parse_float(text).is_some(),
            ValueKind::String | ValueKind::Field => true,
        };

        if !valid {
            return Err(RuleError::ResolutionError(format!(
                "无法将字面量 '{}' 解析为 {}",
                text, kind
            )));
        }
        Ok(TypedValue::new(text, kind))
    }

    fn resolve_field(&self, name: &str) -> TypedValue {
        match self.record.get_field(name) {
            Some(value) => {
                let kind = infer_kind(&value);
                TypedValue::new(value.into_owned(), kind)
            }
            None => TypedValue::absent(ValueKind::String),
        }
    }

    fn resolve_numeric(
        &self,
        kind: ValueKind,
        operator: ArithmeticOperator,
        left: &ValueNode,
        right: &ValueNode,
    ) -> Result<TypedValue> {
        let a = self.resolve_number(left)?;
        let b = self.resolve_number(right)?;

        let result = operator.apply(a, b).ok_or_else(|| {
            RuleError::ResolutionError(format!("除数为零: {} / {}", left, right))
        })?;

        let text = if kind == ValueKind::Int {
            format!("{}", result.floor() as i64)
        } else {
            format!("{:.*}", self.float_precision, result)
        };
        Ok(TypedValue::new(text, kind))
    }

    fn resolve_number(&self, node: &ValueNode) -> Result<f64> {
        let value = self.try_resolve(node)?;
        let text = value
            .as_str()
            .ok_or_else(|| RuleError::ResolutionError(format!("'{}' 没有取到值", node)))?;
        parse_float(text).ok_or_else(|| {
            RuleError::ResolutionError(format!("'{}' 的值 '{}' 不是数字", node, text))
        })
    }

    /// 日期 / 时长运算，只有三种合法组合：
    /// 日期 - 日期 = 时长；时长 ± 时长 = 时长；日期 ± 时长 = 日期
    fn resolve_temporal(
        &self,
        operator: ArithmeticOperator,
        left: &ValueNode,
        right: &ValueNode,
    ) -> Result<TypedValue> {
        let first = self.try_resolve(left)?;
        if operator == ArithmeticOperator::None {
            return Ok(first);
        }

        let second = self.try_resolve(right)?;
        let negate = match operator {
            ArithmeticOperator::Plus => false,
            ArithmeticOperator::Minus => true,
            other => {
                return Err(RuleError::ResolutionError(format!(
                    "日期运算不支持运算符 {}",
                    other
                )));
            }
        };

        let shape_error = || {
            RuleError::ResolutionError(format!(
                "不支持的日期运算: {} {} {}",
                first.kind, operator, second.kind
            ))
        };

        match (Self::as_temporal(&first), Self::as_temporal(&second)) {
            (Some(Temporal::Date(a)), Some(Temporal::Date(b))) if negate => {
                let span = DateSpan::between(a, b);
                Ok(TypedValue::new(span.to_string(), ValueKind::Duration))
            }
            (Some(Temporal::Span(a)), Some(Temporal::Span(b))) => {
                let span = a.combine(b, negate).ok_or_else(|| {
                    RuleError::ResolutionError(format!("时长超出范围: {} {} {}", a, operator, b))
                })?;
                Ok(TypedValue::new(span.to_string(), ValueKind::Duration))
            }
            (Some(Temporal::Date(date)), Some(Temporal::Span(span))) => {
                let delta = span.to_delta().ok_or_else(shape_error)?;
                let shifted = if negate {
                    date.checked_sub_signed(delta)
                } else {
                    date.checked_add_signed(delta)
                }
                .ok_or_else(|| {
                    RuleError::ResolutionError(format!("日期超出范围: {} {} {}", date, operator, span))
                })?;
                Ok(TypedValue::new(format_date(shifted), ValueKind::Date))
            }
            _ => Err(shape_error()),
        }
    }

    fn as_temporal(value: &TypedValue) -> Option<Temporal> {
        let text = value.as_str()?;
        match value.kind {
            ValueKind::Date => parse_date(text).map(Temporal::Date),
            ValueKind::Duration => DateSpan::parse(text).map(Temporal::Span),
            _ => parse_date(text)
                .map(Temporal::Date)
                .or_else(|| DateSpan::parse(text).map(Temporal::Span)),
        }
    }
}
