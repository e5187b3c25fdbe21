//! 规则集存储管理
//!
//! 使用 DashMap 提供线程安全的规则集缓存。规则集的评估会修改自身状态
//! （公式修复、`Copy` 改名），因此评估通过条目级写锁进行，同一规则集的
//! 评估与增删互斥，不同规则集之间可以并行。

use crate::diagnostics::Diagnostics;
use crate::error::{Result, RuleError};
use crate::models::{EvaluationResult, RuleSetDefinition};
use crate::record::Record;
use crate::rule_set::{RuleSet, RuleSetOptions};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则集存储
#[derive(Clone)]
pub struct RuleStore {
    rule_sets: Arc<DashMap<String, RuleSet>>,
    /// 新加载规则集使用的诊断句柄
    diagnostics: Diagnostics,
    /// 新加载规则集使用的选项
    options: RuleSetOptions,
}

impl RuleStore {
    /// 创建新的规则集存储
    pub fn new() -> Self {
        Self {
            rule_sets: Arc::new(DashMap::new()),
            diagnostics: Diagnostics::new(),
            options: RuleSetOptions::default(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_options(mut self, options: RuleSetOptions) -> Self {
        self.options = options;
        self
    }

    /// 获取当前存储的规则集数量
    pub fn len(&self) -> usize {
        self.rule_sets.len()
    }

    /// 检查存储是否为空
    pub fn is_empty(&self) -> bool {
        self.rule_sets.is_empty()
    }

    /// 加载规则集（已构建好的 RuleSet），同 ID 的规则集会被替换
    #[instrument(skip(self, rule_set), fields(rule_set_id = %rule_set.id()))]
    pub fn load(&self, rule_set: RuleSet) -> String {
        let id = rule_set.id().to_string();
        self.rule_sets.insert(id.clone(), rule_set);
        info!("规则集已加载: {}", id);
        id
    }

    /// 加载规则集（从定义）
    pub fn load_definition(&self, def: &RuleSetDefinition) -> String {
        let rule_set = RuleSet::from_definition(def, self.diagnostics.clone())
            .with_options(self.options.clone());
        self.load(rule_set)
    }

    /// 加载规则集（从 JSON 字符串）
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let def = RuleSetDefinition::from_json(json)?;
        Ok(self.load_definition(&def))
    }

    /// 更新规则集
    #[instrument(skip(self, rule_set), fields(rule_set_id = %rule_set.id()))]
    pub fn update(&self, rule_set: RuleSet) -> Result<()> {
        let id = rule_set.id().to_string();

        if !self.rule_sets.contains_key(&id) {
            warn!("更新不存在的规则集: {}", id);
            return Err(RuleError::RuleSetNotFound(id));
        }

        self.load(rule_set);
        Ok(())
    }

    /// 删除规则集
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        if self.rule_sets.remove(id).is_some() {
            info!("规则集已删除: {}", id);
            Ok(())
        } else {
            warn!("删除不存在的规则集: {}", id);
            Err(RuleError::RuleSetNotFound(id.to_string()))
        }
    }

    /// 获取规则集快照
    pub fn get(&self, id: &str) -> Option<RuleSet> {
        self.rule_sets.get(id).map(|r| r.clone())
    }

    /// 检查规则集是否存在
    pub fn contains(&self, id: &str) -> bool {
        self.rule_sets.contains_key(id)
    }

    /// 获取所有规则集 ID
    pub fn list_ids(&self) -> Vec<String> {
        self.rule_sets.iter().map(|r| r.key().clone()).collect()
    }

    /// 用指定规则集评估一条记录
    pub fn evaluate(&self, id: &str, record: &dyn Record) -> Result<EvaluationResult> {
        let mut rule_set = self
            .rule_sets
            .get_mut(id)
            .ok_or_else(|| RuleError::RuleSetNotFound(id.to_string()))?;
        Ok(rule_set.evaluate(record))
    }

    /// 批量加载规则集定义
    #[instrument(skip(self, defs))]
    pub fn load_batch(&self, defs: &[RuleSetDefinition]) -> Vec<String> {
        let loaded_ids: Vec<String> = defs.iter().map(|def| self.load_definition(def)).collect();
        info!("批量加载完成: {} 个规则集", loaded_ids.len());
        loaded_ids
    }

    /// 清空所有规则集
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.rule_sets.len();
        self.rule_sets.clear();
        info!("已清空 {} 个规则集", count);
    }

    /// 获取存储统计信息
    pub fn stats(&self) -> RuleStoreStats {
        let rule_sets_count = self.rule_sets.len();
        let (total_conditions, disabled_conditions) =
            self.rule_sets.iter().fold((0, 0), |(total, disabled), r| {
                let off = r.conditions().filter(|c| !c.is_enabled()).count();
                (total + r.len(), disabled + off)
            });

        RuleStoreStats {
            rule_sets_count,
            total_conditions,
            disabled_conditions,
            avg_conditions_per_rule_set: if rule_sets_count > 0 {
                total_conditions as f64 / rule_sets_count as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 存储统计信息
#[derive(Debug, Clone)]
pub struct RuleStoreStats {
    /// 规则集总数
    pub rule_sets_count: usize,
    /// 所有规则集的条件总数
    pub total_conditions: usize,
    /// 其中被禁用的条件数
    pub disabled_conditions: usize,
    /// 平均每个规则集的条件数
    pub avg_conditions_per_rule_set: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_rule_set_json(id: &str) -> String {
        format!(
            r#"
            {{
                "id": "{}",
                "name": "clearance",
                "conditions": [
                    {{
                        "id": "A",
                        "comparator": "Lt",
                        "left": {{ "kind": "Field", "value": "price" }},
                        "right": {{ "kind": "Float", "value": "0.01" }}
                    }},
                    {{
                        "id": "B",
                        "comparator": "Lt",
                        "left": {{ "kind": "Field", "value": "inventory" }},
                        "right": {{ "kind": "Int", "value": "1" }}
                    }}
                ],
                "equation": {{ "formula": "a+b" }}
            }}
            "#,
            id
        )
    }

    fn record(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_load_from_json() {
        let store = RuleStore::new();
        let id = store.load_from_json(&sample_rule_set_json("rs-001")).unwrap();

        assert_eq!(id, "rs-001");
        assert!(store.contains("rs-001"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_load_invalid_json() {
        let store = RuleStore::new();
        assert!(store.load_from_json("{ not json").is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_generated_id() {
        let store = RuleStore::new();
        let id = store.load_definition(&RuleSetDefinition::default());
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_evaluate() {
        let store = RuleStore::new();
        store.load_from_json(&sample_rule_set_json("rs-001")).unwrap();

        let result = store
            .evaluate("rs-001", &record(&[("price", "0.00"), ("inventory", "5")]))
            .unwrap();
        assert!(result.matched);
        assert_eq!(result.rule_set_id, "rs-001");

        assert!(store.evaluate("missing", &record(&[])).is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let store = RuleStore::new();
        store.load_from_json(&sample_rule_set_json("rs-001")).unwrap();

        let mut rule_set = store.get("rs-001").unwrap();
        rule_set.set_formula("a.b");
        store.update(rule_set).unwrap();
        assert_eq!(store.get("rs-001").unwrap().equation().to_string(), "a.b");

        assert!(store.update(RuleSet::new("rs-404")).is_err());

        store.delete("rs-001").unwrap();
        assert!(!store.contains("rs-001"));
        assert!(store.delete("rs-001").is_err());
    }

    #[test]
    fn test_list_ids_and_clear() {
        let store = RuleStore::new();
        let defs: Vec<RuleSetDefinition> = ["rs-001", "rs-002", "rs-003"]
            .iter()
            .map(|id| RuleSetDefinition::from_json(&sample_rule_set_json(id)).unwrap())
            .collect();

        let loaded = store.load_batch(&defs);
        assert_eq!(loaded.len(), 3);

        let ids = store.list_ids();
        assert!(ids.contains(&"rs-002".to_string()));

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_stats() {
        let store = RuleStore::new();
        store.load_from_json(&sample_rule_set_json("rs-001")).unwrap();
        store
            .load_from_json(
                r#"{ "id": "rs-002", "conditions": [ { "id": "A", "comparator": "Eq" } ] }"#,
            )
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.rule_sets_count, 2);
        assert_eq!(stats.total_conditions, 3);
        assert_eq!(stats.disabled_conditions, 1);
        assert_eq!(stats.avg_conditions_per_rule_set, 1.5);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let store = RuleStore::new();
        let store_clone = store.clone();

        let handle = thread::spawn(move || {
            for i in 0..100 {
                store_clone
                    .load_from_json(&sample_rule_set_json(&format!("rs-{}", i)))
                    .unwrap();
            }
        });

        for i in 100..200 {
            store
                .load_from_json(&sample_rule_set_json(&format!("rs-{}", i)))
                .unwrap();
        }

        handle.join().unwrap();

        assert_eq!(store.len(), 200);
    }
}
