//! 表达式树
//!
//! 每次评估都从修复后的公式重新构建一棵二叉树：左操作数 → 运算符 → 右操作数，
//! 右操作数之后还有内容时递归构建右子树，因此组合是右结合、无优先级的
//! （`a.b+c` 即 `a AND (b OR c)`）。

use std::collections::HashMap;

use crate::compiler::Element;
use crate::diagnostics::Diagnostics;
use crate::operators::LogicOperator;

/// 树节点
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub left: Option<Box<TreeNode>>,
    pub right: Option<Box<TreeNode>>,
    pub left_value: bool,
    pub right_value: bool,
    pub not_left: bool,
    pub not_right: bool,
    pub operator: LogicOperator,
}

impl Default for TreeNode {
    fn default() -> Self {
        Self {
            left: None,
            right: None,
            left_value: false,
            right_value: false,
            not_left: false,
            not_right: false,
            operator: LogicOperator::Or,
        }
    }
}

impl TreeNode {
    /// 后序求值
    pub fn evaluate(&self) -> bool {
        let left = self
            .left
            .as_ref()
            .map_or(self.left_value, |node| node.evaluate());
        let right = self
            .right
            .as_ref()
            .map_or(self.right_value, |node| node.evaluate());

        self.operator
            .combine(left ^ self.not_left, right ^ self.not_right)
    }
}

/// 当前期待的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Left,
    Operator,
    Right,
    Done,
}

/// 表达式树构建器
pub struct ExpressionTreeEngine<'a> {
    elements: &'a [Element],
    results: &'a HashMap<usize, bool>,
    diagnostics: &'a Diagnostics,
}

impl<'a> ExpressionTreeEngine<'a> {
    pub fn new(
        elements: &'a [Element],
        results: &'a HashMap<usize, bool>,
        diagnostics: &'a Diagnostics,
    ) -> Self {
        Self {
            elements,
            results,
            diagnostics,
        }
    }

    /// 构建整棵树并求值
    pub fn evaluate(&self) -> bool {
        self.build(0, self.elements.len()).evaluate()
    }

    /// 在 `[start, end)` 范围内构建节点
    ///
    /// 结构错误不会中断构建：缺失的右操作数按 false 处理，缺失的运算符按 OR 处理。
    pub fn build(&self, start: usize, end: usize) -> TreeNode {
        let mut node = TreeNode::default();
        let mut slot = Slot::Left;
        let mut i = start;

        while i < end && slot != Slot::Done {
            let element = self.elements[i];

            if slot == Slot::Operator && !matches!(element, Element::Op(op) if op.is_binary()) {
                match element {
                    Element::NodeRef(_) | Element::Op(LogicOperator::OpenParen | LogicOperator::Not) => {
                        self.report("两个操作数之间缺少运算符，按 OR 处理", i);
                        node.operator = LogicOperator::Or;
                        slot = Slot::Right;
                    }
                    _ => {
                        self.report("多余的右括号", i);
                        i += 1;
                    }
                }
                continue;
            }

            match (slot, element) {
                (Slot::Operator, Element::Op(op)) => {
                    node.operator = op;
                    slot = Slot::Right;
                    i += 1;
                }
                (Slot::Left, Element::NodeRef(id)) => {
                    node.left_value = self.lookup(id);
                    slot = Slot::Operator;
                    i += 1;
                }
                (Slot::Left, Element::Op(LogicOperator::Not)) => {
                    node.not_left = !node.not_left;
                    i += 1;
                }
                (Slot::Left, Element::Op(LogicOperator::OpenParen)) => {
                    let close = self.matching_paren(i, end);
                    node.left = Some(Box::new(self.build(i + 1, close)));
                    slot = Slot::Operator;
                    i = (close + 1).min(end);
                }
                (Slot::Right, Element::NodeRef(id)) if i + 1 == end => {
                    node.right_value = self.lookup(id);
                    slot = Slot::Done;
                    i += 1;
                }
                (Slot::Right, Element::Op(LogicOperator::OpenParen))
                    if self.matching_paren(i, end) + 1 == end =>
                {
                    node.right = Some(Box::new(self.build(i + 1, end - 1)));
                    slot = Slot::Done;
                    i = end;
                }
                (Slot::Right, Element::NodeRef(_) | Element::Op(LogicOperator::Not | LogicOperator::OpenParen)) => {
                    node.right = Some(Box::new(self.build(i, end)));
                    slot = Slot::Done;
                    i = end;
                }
                (_, Element::Op(op)) => {
                    self.report(&format!("位置不正确的运算符 {}，已跳过", op), i);
                    i += 1;
                }
                // 运算符位置的操作数已在上面转为隐式 OR
                (Slot::Operator | Slot::Done, Element::NodeRef(_)) => break,
            }
        }

        match slot {
            Slot::Right => self.report("运算符缺少右操作数，按 false 处理", end.saturating_sub(1)),
            Slot::Left if end > start => self.report("子表达式缺少操作数", start),
            _ => {}
        }

        node
    }

    /// 按深度计数寻找与 `open` 匹配的右括号，找不到时返回 `end`
    fn matching_paren(&self, open: usize, end: usize) -> usize {
        let mut depth = 0usize;
        for (offset, element) in self.elements[open..end].iter().enumerate() {
            match element {
                Element::Op(LogicOperator::OpenParen) => depth += 1,
                Element::Op(LogicOperator::CloseParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return open + offset;
                    }
                }
                _ => {}
            }
        }
        end
    }

    fn lookup(&self, id: usize) -> bool {
        self.results.get(&id).copied().unwrap_or(false)
    }

    fn report(&self, message: &str, position: usize) {
        self.diagnostics
            .warn(format!("{} (位置 {})", message, position), "expression tree");
    }
}
