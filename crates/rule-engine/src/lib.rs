//! 条件表达式规则引擎
//!
//! 对一条记录评估规则集，支持：
//! - JSON 规则集定义和解析
//! - 带类型的值节点（字段引用、字面量、算术/日期复合节点）
//! - 紧凑公式（`(a.b)+-c`）的解析、修复和表达式树求值
//! - 线程安全的规则集存储

pub mod compiler;
pub mod diagnostics;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod operators;
pub mod record;
pub mod rule_set;
pub mod store;
pub mod tree;
pub mod value;


pub use compiler::{Element, Equation, EquationCompiler};
pub use diagnostics::{Diagnostic, DiagnosticSink, Diagnostics, Severity};
pub use error::{Result, RuleError};
pub use evaluator::{Condition, ConditionEvaluator};
pub use models::{
    ConditionDefinition, ConditionId, EquationDefinition, EvaluationResult, RuleSetDefinition,
    TokenDefinition, ValueNodeDefinition,
};
pub use operators::{ArithmeticOperator, Comparator, LogicOperator};
pub use record::{EvaluationContext, Record, TabularRecord};
pub use rule_set::{RuleSet, RuleSetOptions};
pub use store::{RuleStore, RuleStoreStats};
pub use tree::{ExpressionTreeEngine, TreeNode};
pub use value::{DateSpan, DurationUnit, TypedValue, ValueKind, ValueNode, ValueResolver};
