//! 规则集
//!
//! 持有编号到条件的映射和一个组合公式。评估时先无条件地评估每一个条件
//! （`Copy` 比较会改写条件名称，调用方也需要完整的命中列表），
//! 再把结果代入修复后的公式构建表达式树求值。

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::compiler::{Element, Equation, render};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::evaluator::{Condition, id_alias};
use crate::models::{EvaluationResult, MAX_CONDITION_ID, RuleSetDefinition};
use crate::operators::Comparator;
use crate::record::Record;
use crate::tree::ExpressionTreeEngine;
use crate::value::ValueResolver;

/// 规则集选项
#[derive(Debug, Clone)]
pub struct RuleSetOptions {
    /// 是否记录详细评估追踪
    pub trace_enabled: bool,
    /// Float 类型复合节点结果保留的小数位数
    pub float_precision: usize,
}

impl Default for RuleSetOptions {
    fn default() -> Self {
        Self {
            trace_enabled: false,
            float_precision: 2,
        }
    }
}

/// 规则集
#[derive(Debug, Clone)]
pub struct RuleSet {
    id: String,
    name: String,
    conditions: BTreeMap<usize, Condition>,
    equation: Equation,
    diagnostics: Diagnostics,
    options: RuleSetOptions,
}

impl RuleSet {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            diagnostics: Diagnostics::new().with_alias(id.clone()),
            id,
            conditions: BTreeMap::new(),
            equation: Equation::default(),
            options: RuleSetOptions::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = match diagnostics.alias() {
            Some(_) => diagnostics,
            None => diagnostics.with_alias(self.name.clone()),
        };
        self
    }

    pub fn with_options(mut self, options: RuleSetOptions) -> Self {
        self.options = options;
        self
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.options.trace_enabled = true;
        self
    }

    /// 从持久化定义构建
    ///
    /// 定义有误的条件以禁用状态加入，不会导致整个规则集加载失败。
    pub fn from_definition(def: &RuleSetDefinition, diagnostics: Diagnostics) -> Self {
        let id = def
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = def.name.clone().unwrap_or_else(|| id.clone());

        let diagnostics = match diagnostics.alias() {
            Some(_) => diagnostics,
            None => diagnostics.with_alias(name.clone()),
        };

        let mut conditions = BTreeMap::new();
        for cond_def in &def.conditions {
            let id = match cond_def.id.index() {
                Ok(id) => id,
                Err(e) => {
                    diagnostics.warn(e.to_string(), format!("{:?}", cond_def.id));
                    continue;
                }
            };

            let condition = match Condition::from_definition(cond_def) {
                Ok(condition) => condition,
                Err(e) => {
                    diagnostics.warn(format!("条件已禁用: {}", e), id_alias(id));
                    let comparator = cond_def.comparator.parse().unwrap_or(Comparator::Eq);
                    Condition::disabled(id, comparator)
                }
            };

            if conditions.insert(id, condition).is_some() {
                warn!(rule_set = %name, condition = %id_alias(id), "条件编号重复，后者覆盖前者");
            }
        }

        let equation = Equation::from_definition(&def.equation, &diagnostics);

        Self {
            id,
            name,
            conditions,
            equation,
            diagnostics,
            options: RuleSetOptions::default(),
        }
    }

    /// 从 JSON 字符串构建
    pub fn from_json(json: &str, diagnostics: Diagnostics) -> Result<Self> {
        let def = RuleSetDefinition::from_json(json)?;
        Ok(Self::from_definition(&def, diagnostics))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &RuleSetOptions {
        &self.options
    }

    /// 添加或替换条件；公式不会立即重新校验
    ///
    /// 编号超过 [`MAX_CONDITION_ID`] 的条件不会加入，返回 `None`。
    pub fn add(&mut self, id: usize, condition: Condition) -> Option<Condition> {
        if id > MAX_CONDITION_ID {
            self.diagnostics.warn(
                format!("条件编号 {} 超过上限 {}，已忽略", id, MAX_CONDITION_ID),
                condition.label().to_string(),
            );
            return None;
        }
        self.conditions.insert(id, condition.with_id(id))
    }

    pub fn remove(&mut self, id: usize) -> Option<Condition> {
        self.conditions.remove(&id)
    }

    pub fn condition(&self, id: usize) -> Option<&Condition> {
        self.conditions.get(&id)
    }

    pub fn conditions(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// 最大条件编号，编号不要求连续
    pub fn max_id(&self) -> Option<usize> {
        self.conditions.keys().next_back().copied()
    }

    pub fn equation(&self) -> &Equation {
        &self.equation
    }

    pub fn set_equation(&mut self, equation: Equation) {
        self.equation = equation;
    }

    /// 以紧凑字符串替换公式
    pub fn set_formula(&mut self, formula: &str) {
        self.equation = Equation::parse(formula, &self.diagnostics);
    }

    pub fn set_elements(&mut self, elements: Vec<Element>) {
        self.equation.set_elements(elements);
    }

    /// 按当前最大编号修复后的公式
    pub fn normalized_equation(&mut self) -> &[Element] {
        match self.max_id() {
            Some(max_id) => self.equation.normalize(max_id, &self.diagnostics),
            None => &[],
        }
    }

    /// 把条件结果代入公式求值；没有条件时为 false
    pub fn apply(&mut self, results: &HashMap<usize, bool>) -> bool {
        let Some(max_id) = self.max_id() else {
            return false;
        };
        let elements = self.equation.normalize(max_id, &self.diagnostics);
        ExpressionTreeEngine::new(elements, results, &self.diagnostics).evaluate()
    }

    /// 评估一条记录
    pub fn evaluate(&mut self, record: &dyn Record) -> EvaluationResult {
        let start = Instant::now();
        let mut result = EvaluationResult::new(self.id.clone());
        let mut results = HashMap::with_capacity(self.conditions.len());

        {
            let resolver = ValueResolver::new(record, &self.diagnostics)
                .with_float_precision(self.options.float_precision);

            for (&id, condition) in self.conditions.iter_mut() {
                let matched = condition.evaluate(&resolver, &self.diagnostics);
                results.insert(id, matched);

                if self.options.trace_enabled {
                    result.evaluation_trace.push(format!(
                        "{}: {} => {}",
                        id_alias(id),
                        condition.label(),
                        match (condition.is_enabled(), matched) {
                            (false, _) => "DISABLED",
                            (true, true) => "MATCHED",
                            (true, false) => "NOT_MATCHED",
                        }
                    ));
                }

                if matched {
                    result.matched_conditions.push(condition.name().to_string());
                }
            }
        }

        result.matched = self.apply(&results);

        if self.options.trace_enabled {
            result.evaluation_trace.push(format!(
                "equation: {} => {}",
                render(self.equation.normalized().unwrap_or_default()),
                if result.matched { "MATCHED" } else { "NOT_MATCHED" }
            ));
        }

        result.evaluation_time_ms = start.elapsed().as_millis() as i64;

        debug!(
            rule_set = %self.name,
            matched = result.matched,
            matched_conditions = result.matched_conditions.len(),
            "规则集评估完成"
        );

        result
    }
}
