//! 规则引擎性能基准测试
//!
//! 覆盖取值解析、类型化比较、公式修复和规则集端到端评估。

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rule_engine::{
    ArithmeticOperator, Comparator, Condition, ConditionEvaluator, Diagnostics, EquationCompiler,
    RuleSet, TypedValue, ValueKind, ValueNode, ValueResolver,
};
use std::collections::HashMap;
use std::hint::black_box;

fn create_record() -> HashMap<String, String> {
    HashMap::from([
        ("price".to_string(), "19.99".to_string()),
        ("inventory".to_string(), "5".to_string()),
        ("start".to_string(), "2020-01-10".to_string()),
        ("brand".to_string(), "Acme".to_string()),
    ])
}

/// 类型化比较基准
fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare");

    let int = TypedValue::new("1000", ValueKind::Int);
    let float = TypedValue::new("500.5", ValueKind::Float);
    let date_a = TypedValue::new("2020-01-10", ValueKind::Date);
    let date_b = TypedValue::new("2020-02-01 08:00:00", ValueKind::Date);
    let text = TypedValue::new("hello world", ValueKind::String);
    let list = TypedValue::new("red,green,hello world", ValueKind::String);

    group.bench_function("int_float_gt", |b| {
        b.iter(|| ConditionEvaluator::compare(black_box(&int), Comparator::Gt, black_box(&float)))
    });

    group.bench_function("date_lt", |b| {
        b.iter(|| ConditionEvaluator::compare(black_box(&date_a), Comparator::Lt, black_box(&date_b)))
    });

    group.bench_function("string_is_one_of", |b| {
        b.iter(|| ConditionEvaluator::compare(black_box(&text), Comparator::IsOneOf, black_box(&list)))
    });

    group.finish();
}

/// 取值解析基准
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let record = create_record();
    let diagnostics = Diagnostics::new();
    let resolver = ValueResolver::new(&record, &diagnostics);

    let field = ValueNode::field("price");
    let numeric = ValueNode::compound(
        ValueKind::Float,
        ArithmeticOperator::Times,
        ValueNode::field("price"),
        ValueNode::literal(ValueKind::Float, "0.8"),
    );
    let temporal = ValueNode::compound(
        ValueKind::Date,
        ArithmeticOperator::Minus,
        ValueNode::field("start"),
        ValueNode::literal(ValueKind::Duration, "3 Days"),
    );

    group.bench_function("field", |b| b.iter(|| resolver.resolve(black_box(&field))));
    group.bench_function("numeric_compound", |b| {
        b.iter(|| resolver.resolve(black_box(&numeric)))
    });
    group.bench_function("date_minus_duration", |b| {
        b.iter(|| resolver.resolve(black_box(&temporal)))
    });

    group.finish();
}

/// 公式修复随长度的扩展性
fn bench_normalize_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_scaling");
    let diagnostics = Diagnostics::new();

    for size in [4usize, 16, 64] {
        // 缺少右括号的 (a.b)+(c.d)+... 链
        let formula: String = (0..size)
            .map(|i| format!("({}.{}", (b'a' + (i % 23) as u8) as char, (b'a' + ((i + 1) % 23) as u8) as char))
            .collect::<Vec<_>>()
            .join("+");
        let elements = EquationCompiler::parse_compact(&formula, &diagnostics);

        group.bench_with_input(BenchmarkId::from_parameter(size), &elements, |b, elements| {
            b.iter(|| EquationCompiler::normalize(black_box(elements), 25, &diagnostics, "bench"))
        });
    }

    group.finish();
}

/// 规则集端到端评估
fn bench_rule_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_set");
    let record = create_record();

    let mut rule_set = RuleSet::new("bench");
    rule_set.add(
        0,
        Condition::new(
            0,
            ValueNode::field("price"),
            Comparator::Lt,
            ValueNode::literal(ValueKind::Float, "0.01"),
        ),
    );
    rule_set.add(
        1,
        Condition::new(
            1,
            ValueNode::field("inventory"),
            Comparator::Lt,
            ValueNode::literal(ValueKind::Int, "1"),
        ),
    );
    rule_set.add(
        2,
        Condition::new(
            2,
            ValueNode::field("brand"),
            Comparator::Eq,
            ValueNode::literal(ValueKind::String, "acme"),
        ),
    );
    rule_set.set_formula("(a+b).-c");

    group.bench_function("three_conditions", |b| {
        b.iter(|| rule_set.evaluate(black_box(&record)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_compare,
    bench_resolve,
    bench_normalize_scaling,
    bench_rule_set,
);

criterion_main!(benches);
