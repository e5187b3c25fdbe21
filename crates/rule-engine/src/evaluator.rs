//! 条件评估器
//!
//! 一个条件由两个取值节点和一个比较符组成。比较方式由两侧解析出的类型决定：
//! 整数、浮点、日期、时长各有专门的比较，其余情况退化为不区分大小写的字符串比较。

use std::cmp::Ordering;

use crate::diagnostics::Diagnostics;
use crate::error::{Result, RuleError};
use crate::models::ConditionDefinition;
use crate::operators::Comparator;
use crate::value::{DateSpan, TypedValue, ValueKind, ValueNode, ValueResolver, parse_date, parse_float};

/// 缺失值在相等比较中的字面形式
const NULL_TEXT: &str = "null";

/// 条件
///
/// `operands` 为 `None` 表示条件已被禁用：构建失败或运行时发现结构缺失后，
/// 条件永久返回 false。
#[derive(Debug, Clone)]
pub struct Condition {
    id: usize,
    label: String,
    name: String,
    comparator: Comparator,
    operands: Option<(ValueNode, ValueNode)>,
}

impl Condition {
    pub fn new(id: usize, left: ValueNode, comparator: Comparator, right: ValueNode) -> Self {
        let label = format!("{} {} {}", left, comparator, right);
        Self {
            id,
            name: label.clone(),
            label,
            comparator,
            operands: Some((left, right)),
        }
    }

    /// 已禁用的条件，名称使用编号的字母形式
    pub fn disabled(id: usize, comparator: Comparator) -> Self {
        let label = id_alias(id);
        Self {
            id,
            name: label.clone(),
            label,
            comparator,
            operands: None,
        }
    }

    /// 从持久化定义构建；任一取值节点缺失或非法时返回错误
    pub fn from_definition(def: &ConditionDefinition) -> Result<Self> {
        let id = def.id.index()?;
        let comparator: Comparator = def.comparator.parse()?;

        let (Some(left), Some(right)) = (&def.left, &def.right) else {
            return Err(RuleError::InvalidDefinition(format!(
                "条件 {} 缺少取值节点",
                id_alias(id)
            )));
        };

        Ok(Self::new(
            id,
            ValueNode::from_definition(left)?,
            comparator,
            ValueNode::from_definition(right)?,
        ))
    }

    /// 重新编号；禁用条件的名称随编号变化
    pub fn with_id(mut self, id: usize) -> Self {
        if self.operands.is_none() {
            self.label = id_alias(id);
            self.name = self.label.clone();
        }
        self.id = id;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// 当前显示名称；`Copy` 比较会把它改写为左值
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 由定义推导出的名称，不受 `Copy` 影响
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn comparator(&self) -> Comparator {
        self.comparator
    }

    pub fn is_enabled(&self) -> bool {
        self.operands.is_some()
    }

    pub fn disable(&mut self) {
        self.operands = None;
    }

    /// 评估条件，任何错误都降级为 false
    pub fn evaluate(&mut self, resolver: &ValueResolver<'_>, diagnostics: &Diagnostics) -> bool {
        let Some((left, right)) = &self.operands else {
            return false;
        };

        let left = resolver.resolve(left);
        let right = resolver.resolve(right);

        if self.comparator == Comparator::Copy {
            self.name = left.value.unwrap_or_else(|| NULL_TEXT.to_string());
            return true;
        }

        match ConditionEvaluator::compare(&left, self.comparator, &right) {
            Ok(matched) => matched,
            Err(e) => {
                diagnostics.error(e.to_string(), self.label.clone());
                false
            }
        }
    }
}

/// 编号的字母形式：0..25 为 A..Z，之后为 `#n`
pub fn id_alias(id: usize) -> String {
    if id < 26 {
        ((b'A' + id as u8) as char).to_string()
    } else {
        format!("#{}", id)
    }
}

/// 按类型分派的比较逻辑
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 比较两个解析后的值
    ///
    /// 分派顺序：整数 → 数值 → 日期 → 时长 → 时长与数值 → 日期/时长对缺失值 → 字符串。
    pub fn compare(left: &TypedValue, comparator: Comparator, right: &TypedValue) -> Result<bool> {
        if comparator == Comparator::Copy {
            return Ok(true);
        }

        if let (Some(l), Some(r)) = (left.as_str(), right.as_str()) {
            if let Some(matched) = Self::compare_typed(l, left.kind, comparator, r, right.kind)? {
                return Ok(matched);
            }
        }

        // 日期、时长无法与缺失值比较
        if (left.kind.is_temporal() && right.is_absent())
            || (right.kind.is_temporal() && left.is_absent())
        {
            return Ok(false);
        }

        Ok(Self::compare_strings(left.as_str(), comparator, right.as_str()))
    }

    /// 类型化比较；返回 `None` 表示交给字符串比较
    fn compare_typed(
        l: &str,
        lkind: ValueKind,
        comparator: Comparator,
        r: &str,
        rkind: ValueKind,
    ) -> Result<Option<bool>> {
        use ValueKind::*;

        let ordering = match (lkind, rkind) {
            (Int, Int) if comparator.is_relational() => {
                match (l.trim().parse::<i64>(), r.trim().parse::<i64>()) {
                    (Ok(a), Ok(b)) => a.cmp(&b),
                    _ => return Self::compare_numbers(l, comparator, r),
                }
            }
            (Int | Float, Int | Float) if comparator.is_relational() => {
                return Self::compare_numbers(l, comparator, r);
            }
            (Int | Float, Int | Float) => return Ok(None),
            (Date, Date) => {
                Self::require_relational(comparator, "Date")?;
                match (parse_date(l), parse_date(r)) {
                    (Some(a), Some(b)) => a.cmp(&b),
                    _ => return Err(Self::unparsable(l, r, "Date")),
                }
            }
            (Duration, Duration) => {
                Self::require_relational(comparator, "Duration")?;
                let minutes = |text: &str| DateSpan::parse(text).map(|s| s.total_minutes());
                match (minutes(l), minutes(r)) {
                    (Some(Some(a)), Some(Some(b))) => a.cmp(&b),
                    (Some(_), Some(_)) => {
                        return Err(RuleError::ResolutionError(format!(
                            "时长超出范围: {} / {}",
                            l, r
                        )));
                    }
                    _ => return Err(Self::unparsable(l, r, "Duration")),
                }
            }
            (Duration, Int | Float) | (Int | Float, Duration) => {
                Self::require_relational(comparator, "Duration")?;
                let magnitude = |text: &str, kind: ValueKind| match kind {
                    Duration => DateSpan::parse(text).map(|s| s.amount as f64),
                    _ => parse_float(text),
                };
                match (magnitude(l, lkind), magnitude(r, rkind)) {
                    (Some(a), Some(b)) => Self::order_floats(a, b),
                    _ => return Err(Self::unparsable(l, r, "Duration")),
                }
            }
            _ => return Ok(None),
        };

        Ok(comparator.test_ordering(ordering))
    }

    fn compare_numbers(l: &str, comparator: Comparator, r: &str) -> Result<Option<bool>> {
        match (parse_float(l), parse_float(r)) {
            (Some(a), Some(b)) => Ok(comparator.test_ordering(Self::order_floats(a, b))),
            _ => Err(Self::unparsable(l, r, "Float")),
        }
    }

    /// 数值比较需要容忍浮点误差（如 5 == 5.0）
    fn order_floats(a: f64, b: f64) -> Ordering {
        if (a - b).abs() < f64::EPSILON {
            Ordering::Equal
        } else {
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }

    fn require_relational(comparator: Comparator, value_type: &str) -> Result<()> {
        if comparator.is_relational() {
            Ok(())
        } else {
            Err(RuleError::InvalidOperator {
                comparator: comparator.to_string(),
                value_type: value_type.to_string(),
            })
        }
    }

    fn unparsable(l: &str, r: &str, value_type: &str) -> RuleError {
        RuleError::ResolutionError(format!("无法按 {} 比较 '{}' 与 '{}'", value_type, l, r))
    }

    /// 不区分大小写的字符串比较
    fn compare_strings(left: Option<&str>, comparator: Comparator, right: Option<&str>) -> bool {
        match comparator {
            Comparator::Eq | Comparator::Ne => {
                let l = left.unwrap_or(NULL_TEXT).to_lowercase();
                let r = right.unwrap_or(NULL_TEXT).to_lowercase();
                (l == r) == (comparator == Comparator::Eq)
            }
            Comparator::Copy => true,
            _ => {
                let (Some(l), Some(r)) = (left, right) else {
                    return false;
                };
                let (l, r) = (l.to_lowercase(), r.to_lowercase());
                match comparator {
                    Comparator::Contains => l.contains(&r),
                    Comparator::StartsWith => l.starts_with(&r),
                    Comparator::EndsWith => l.ends_with(&r),
                    Comparator::IsOneOf => r.split(',').any(|item| item.trim() == l.trim()),
                    relational => relational.test_ordering(l.cmp(&r)).unwrap_or(false),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueNodeDefinition;
    use std::collections::HashMap;

    fn int(v: &str) -> TypedValue {
        TypedValue::new(v, ValueKind::Int)
    }

    fn float(v: &str) -> TypedValue {
        TypedValue::new(v, ValueKind::Float)
    }

    fn string(v: &str) -> TypedValue {
        TypedValue::new(v, ValueKind::String)
    }

    fn date(v: &str) -> TypedValue {
        TypedValue::new(v, ValueKind::Date)
    }

    fn span(v: &str) -> TypedValue {
        TypedValue::new(v, ValueKind::Duration)
    }

    fn record(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_int_vs_float_eq() {
        assert!(ConditionEvaluator::compare(&int("5"), Comparator::Eq, &float("5.0")).unwrap());
        assert!(!ConditionEvaluator::compare(&int("5"), Comparator::Ne, &float("5.0")).unwrap());
    }

    #[test]
    fn test_integer_comparisons() {
        assert!(ConditionEvaluator::compare(&int("5"), Comparator::Gt, &int("1")).unwrap());
        assert!(ConditionEvaluator::compare(&int("5"), Comparator::Ge, &int("5")).unwrap());
        assert!(!ConditionEvaluator::compare(&int("5"), Comparator::Lt, &int("1")).unwrap());
        assert!(ConditionEvaluator::compare(&int("-3"), Comparator::Le, &int("1")).unwrap());
    }

    #[test]
    fn test_float_comparisons() {
        assert!(ConditionEvaluator::compare(&float("0.00"), Comparator::Lt, &float("0.01")).unwrap());
        assert!(!ConditionEvaluator::compare(&float("19.99"), Comparator::Lt, &float("0.01")).unwrap());
    }

    #[test]
    fn test_date_comparisons() {
        assert!(
            ConditionEvaluator::compare(&date("2020-01-07"), Comparator::Lt, &date("2020-01-10"))
                .unwrap()
        );
        assert!(
            ConditionEvaluator::compare(
                &date("2020-01-10"),
                Comparator::Eq,
                &date("2020-01-10 00:00:00")
            )
            .unwrap()
        );
        assert!(
            ConditionEvaluator::compare(&date("2020-01-10"), Comparator::Contains, &date("2020"))
                .is_err()
        );
    }

    #[test]
    fn test_duration_comparisons() {
        assert!(ConditionEvaluator::compare(&span("1 Days"), Comparator::Gt, &span("23 Hours")).unwrap());
        assert!(ConditionEvaluator::compare(&span("60 Minutes"), Comparator::Eq, &span("1 Hours")).unwrap());
        assert!(ConditionEvaluator::compare(&span("3 Days"), Comparator::Ge, &int("3")).unwrap());
        assert!(ConditionEvaluator::compare(&float("2.5"), Comparator::Lt, &span("3 Days")).unwrap());
        assert!(
            ConditionEvaluator::compare(&span("3 Days"), Comparator::StartsWith, &int("3")).is_err()
        );
    }

    #[test]
    fn test_duration_overflow_is_error() {
        let huge = span("9999999999999999 Days");
        assert!(ConditionEvaluator::compare(&huge, Comparator::Gt, &span("1 Days")).is_err());
        assert!(ConditionEvaluator::compare(&span("1 Days"), Comparator::Lt, &huge).is_err());

        let rec = record(&[("span", "9999999999999999 Days")]);
        let diagnostics = Diagnostics::new();
        let resolver = ValueResolver::new(&rec, &diagnostics);
        let mut condition = Condition::new(
            0,
            ValueNode::field("span"),
            Comparator::Gt,
            ValueNode::literal(ValueKind::Duration, "1 Days"),
        );
        assert!(!condition.evaluate(&resolver, &diagnostics));
    }

    #[test]
    fn test_temporal_vs_absent() {
        let absent = TypedValue::absent(ValueKind::String);
        assert!(!ConditionEvaluator::compare(&date("2020-01-10"), Comparator::Ne, &absent).unwrap());
        assert!(!ConditionEvaluator::compare(&absent, Comparator::Eq, &span("3 Days")).unwrap());
    }

    #[test]
    fn test_string_comparisons() {
        assert!(ConditionEvaluator::compare(&string("Red Shirt"), Comparator::Eq, &string("red shirt")).unwrap());
        assert!(ConditionEvaluator::compare(&string("Red Shirt"), Comparator::Contains, &string("SHIRT")).unwrap());
        assert!(ConditionEvaluator::compare(&string("Red Shirt"), Comparator::StartsWith, &string("red")).unwrap());
        assert!(ConditionEvaluator::compare(&string("Red Shirt"), Comparator::EndsWith, &string("shirt")).unwrap());
        assert!(ConditionEvaluator::compare(&string("apple"), Comparator::Lt, &string("Banana")).unwrap());
    }

    #[test]
    fn test_is_one_of() {
        let list = string("red, green ,Blue");
        assert!(ConditionEvaluator::compare(&string("blue"), Comparator::IsOneOf, &list).unwrap());
        assert!(ConditionEvaluator::compare(&string("green"), Comparator::IsOneOf, &list).unwrap());
        assert!(!ConditionEvaluator::compare(&string("yellow"), Comparator::IsOneOf, &list).unwrap());
        assert!(ConditionEvaluator::compare(&int("5"), Comparator::IsOneOf, &string("1,5,7")).unwrap());
    }

    #[test]
    fn test_absent_as_null() {
        let absent = TypedValue::absent(ValueKind::String);
        assert!(ConditionEvaluator::compare(&absent, Comparator::Eq, &string("NULL")).unwrap());
        assert!(ConditionEvaluator::compare(&absent, Comparator::Ne, &string("x")).unwrap());
        assert!(!ConditionEvaluator::compare(&absent, Comparator::Contains, &string("x")).unwrap());
        assert!(!ConditionEvaluator::compare(&absent, Comparator::Lt, &string("x")).unwrap());
    }

    #[test]
    fn test_copy_renames_condition() {
        let rec = record(&[("brand", "Acme")]);
        let diagnostics = Diagnostics::new();
        let resolver = ValueResolver::new(&rec, &diagnostics);

        let mut condition = Condition::new(
            2,
            ValueNode::field("brand"),
            Comparator::Copy,
            ValueNode::literal(ValueKind::String, ""),
        );
        assert_eq!(condition.name(), "brand Copy ");

        assert!(condition.evaluate(&resolver, &diagnostics));
        assert_eq!(condition.name(), "Acme");
        assert_eq!(condition.label(), "brand Copy ");
    }

    #[test]
    fn test_condition_from_definition() {
        let def = ConditionDefinition::new(
            "A",
            "Lt",
            ValueNodeDefinition::field("price"),
            ValueNodeDefinition::literal("Float", "0.01"),
        );
        let mut condition = Condition::from_definition(&def).unwrap();
        assert_eq!(condition.id(), 0);
        assert_eq!(condition.name(), "price Lt 0.01");

        let rec = record(&[("price", "0.00")]);
        let diagnostics = Diagnostics::new();
        let resolver = ValueResolver::new(&rec, &diagnostics);
        assert!(condition.evaluate(&resolver, &diagnostics));
    }

    #[test]
    fn test_condition_missing_operands() {
        let def = ConditionDefinition {
            id: 3.into(),
            comparator: "Eq".to_string(),
            left: None,
            right: None,
        };
        assert!(Condition::from_definition(&def).is_err());

        let mut condition = Condition::disabled(3, Comparator::Eq);
        assert!(!condition.is_enabled());
        assert_eq!(condition.name(), "D");

        let rec = record(&[]);
        let diagnostics = Diagnostics::new();
        let resolver = ValueResolver::new(&rec, &diagnostics);
        assert!(!condition.evaluate(&resolver, &diagnostics));
    }

    #[test]
    fn test_unknown_comparator_is_definition_error() {
        let def = ConditionDefinition::new(
            0,
            "Between",
            ValueNodeDefinition::field("price"),
            ValueNodeDefinition::literal("Float", "1"),
        );
        assert!(Condition::from_definition(&def).is_err());
    }

    #[test]
    fn test_id_alias() {
        assert_eq!(id_alias(0), "A");
        assert_eq!(id_alias(25), "Z");
        assert_eq!(id_alias(30), "#30");
    }
}
