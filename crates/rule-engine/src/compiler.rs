//! 公式编译器
//!
//! 把规则集的组合公式解析成 token 序列，并按语法状态机做修复：非法元素被剔除，
//! 未闭合的括号被补齐，未被引用的条件以 OR 追加在末尾。修复而不是拒绝，
//! 保证单条写错的规则不会影响整个规则集的评估。

use std::collections::HashSet;
use std::fmt;

use crate::diagnostics::Diagnostics;
use crate::error::{Result, RuleError};
use crate::models::{EquationDefinition, TokenDefinition};
use crate::operators::LogicOperator;

/// 紧凑公式中无法用字母表示的编号使用 `#n` 形式
const ID_PREFIX: char = '#';

/// 公式元素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    Op(LogicOperator),
    NodeRef(usize),
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Op(op) => write!(f, "{}", op.symbol()),
            // 'x' 被 Xor 占用
            Self::NodeRef(id) if *id < 26 && *id != 23 => {
                write!(f, "{}", (b'a' + *id as u8) as char)
            }
            Self::NodeRef(id) => write!(f, "{}{}", ID_PREFIX, id),
        }
    }
}

/// 语法状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrammarState {
    Start,
    AfterNodeId,
    AfterLogicOp,
    AfterOpenParen,
    AfterCloseParen,
    AfterNot,
}

impl GrammarState {
    fn accepts(self, element: Element) -> bool {
        use LogicOperator::*;
        match (self, element) {
            (Self::Start | Self::AfterLogicOp | Self::AfterOpenParen, Element::NodeRef(_)) => true,
            (Self::Start | Self::AfterLogicOp | Self::AfterOpenParen, Element::Op(op)) => {
                matches!(op, OpenParen | Not)
            }
            (Self::AfterNodeId | Self::AfterCloseParen, Element::Op(op)) => {
                op == CloseParen || op.is_binary()
            }
            (Self::AfterNodeId | Self::AfterCloseParen, Element::NodeRef(_)) => false,
            (Self::AfterNot, Element::NodeRef(_)) => true,
            (Self::AfterNot, Element::Op(op)) => op == OpenParen,
        }
    }

    fn next(element: Element) -> Self {
        match element {
            Element::NodeRef(_) => Self::AfterNodeId,
            Element::Op(LogicOperator::OpenParen) => Self::AfterOpenParen,
            Element::Op(LogicOperator::CloseParen) => Self::AfterCloseParen,
            Element::Op(LogicOperator::Not) => Self::AfterNot,
            Element::Op(_) => Self::AfterLogicOp,
        }
    }
}

/// 公式
///
/// 调用方提供的元素序列原样保留；修复结果按最大编号单独缓存，
/// 最大编号变化或元素被替换后重新修复。条件被删除再加回时，公式恢复原样。
#[derive(Debug, Clone, Default)]
pub struct Equation {
    elements: Vec<Element>,
    normalized: Vec<Element>,
    validated_for: Option<usize>,
}

impl Equation {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            elements,
            normalized: Vec::new(),
            validated_for: None,
        }
    }

    /// 从紧凑字符串解析，如 `"(a.b)+-c"`
    pub fn parse(formula: &str, diagnostics: &Diagnostics) -> Self {
        Self::new(EquationCompiler::parse_compact(formula, diagnostics))
    }

    pub fn from_definition(def: &EquationDefinition, diagnostics: &Diagnostics) -> Self {
        match def {
            EquationDefinition::Formula { formula } => Self::parse(formula, diagnostics),
            EquationDefinition::Tokens { tokens } => {
                Self::new(EquationCompiler::parse_tokens(tokens, diagnostics))
            }
        }
    }

    /// 调用方提供的原始元素序列
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// 最近一次修复的结果，尚未修复时为 `None`
    pub fn normalized(&self) -> Option<&[Element]> {
        self.validated_for.map(|_| self.normalized.as_slice())
    }

    /// 替换元素序列，下次访问时重新校验
    pub fn set_elements(&mut self, elements: Vec<Element>) {
        self.elements = elements;
        self.normalized.clear();
        self.validated_for = None;
    }

    pub fn is_validated_for(&self, max_id: usize) -> bool {
        self.validated_for == Some(max_id)
    }

    /// 按最大编号校验并修复，返回修复后的元素序列
    pub fn normalize(&mut self, max_id: usize, diagnostics: &Diagnostics) -> &[Element] {
        if !self.is_validated_for(max_id) {
            let context = self.to_string();
            self.normalized =
                EquationCompiler::normalize(&self.elements, max_id, diagnostics, &context);
            self.validated_for = Some(max_id);
        }
        &self.normalized
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.elements))
    }
}

/// 把元素序列写回紧凑字符串
pub fn render(elements: &[Element]) -> String {
    elements.iter().map(Element::to_string).collect()
}

/// 公式编译器
pub struct EquationCompiler;

impl EquationCompiler {
    /// 解析紧凑字符串：`.`=And，`+`=Or，`x`=Xor，`-`=Not，小写字母对应编号 0..25
    pub fn parse_compact(formula: &str, diagnostics: &Diagnostics) -> Vec<Element> {
        let mut elements = Vec::with_capacity(formula.len());
        let mut chars = formula.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            if c.is_whitespace() {
                continue;
            }

            if let Some(op) = LogicOperator::from_symbol(c) {
                elements.push(Element::Op(op));
                continue;
            }

            if c.is_ascii_lowercase() {
                elements.push(Element::NodeRef((c as u8 - b'a') as usize));
                continue;
            }

            if c == ID_PREFIX {
                let mut digits = String::new();
                while let Some((_, d)) = chars.peek().copied().filter(|(_, d)| d.is_ascii_digit()) {
                    digits.push(d);
                    chars.next();
                }
                match digits.parse::<usize>() {
                    Ok(id) => elements.push(Element::NodeRef(id)),
                    Err(_) => diagnostics.warn(
                        format!("公式位置 {} 的 '#' 后缺少编号，已忽略", pos),
                        formula,
                    ),
                }
                continue;
            }

            diagnostics.warn(format!("公式位置 {} 的非法字符 '{}'，已忽略", pos, c), formula);
        }

        elements
    }

    /// 解析显式 token 列表，无法识别的 token 报告后跳过
    pub fn parse_tokens(tokens: &[TokenDefinition], diagnostics: &Diagnostics) -> Vec<Element> {
        let mut elements = Vec::with_capacity(tokens.len());

        for (i, token) in tokens.iter().enumerate() {
            let op = token.op.trim();
            if matches!(op.to_ascii_lowercase().as_str(), "noderef" | "node" | "id") {
                match token.value.as_ref().map(|id| id.index()) {
                    Some(Ok(id)) => elements.push(Element::NodeRef(id)),
                    Some(Err(e)) => diagnostics.warn(format!("token {}: {}", i, e), op),
                    None => diagnostics.warn(format!("token {} 缺少条件编号", i), op),
                }
                continue;
            }

            match op.parse::<LogicOperator>() {
                Ok(op) => elements.push(Element::Op(op)),
                Err(e) => diagnostics.warn(format!("token {}: {}", i, e), op),
            }
        }

        elements
    }

    /// 校验修复，出错时退化为所有条件的 OR
    pub fn normalize(
        elements: &[Element],
        max_id: usize,
        diagnostics: &Diagnostics,
        context: &str,
    ) -> Vec<Element> {
        let mut repaired = match Self::repair(elements, max_id, diagnostics, context) {
            Ok(repaired) => repaired,
            Err(e) => {
                diagnostics.error(format!("{}，退化为全部条件的 OR", e), context);
                Vec::new()
            }
        };

        let appended = Self::append_unreferenced(&mut repaired, max_id);
        if !appended.is_empty() {
            diagnostics.info(format!("未引用的条件以 OR 追加: {}", render(&appended)), context);
        }
        repaired
    }

    fn repair(
        elements: &[Element],
        max_id: usize,
        diagnostics: &Diagnostics,
        context: &str,
    ) -> Result<Vec<Element>> {
        let mut state = GrammarState::Start;
        let mut depth = 0usize;
        let mut illegal = Vec::new();

        for (i, &element) in elements.iter().enumerate() {
            let legal = match element {
                Element::NodeRef(id) if id > max_id => false,
                Element::Op(LogicOperator::CloseParen) => state.accepts(element) && depth > 0,
                _ => state.accepts(element),
            };

            if !legal {
                diagnostics.warn(format!("公式位置 {} 的元素 '{}' 非法，已移除", i, element), context);
                illegal.push(i);
                continue;
            }

            match element {
                Element::Op(LogicOperator::OpenParen) => depth += 1,
                Element::Op(LogicOperator::CloseParen) => depth -= 1,
                _ => {}
            }
            state = GrammarState::next(element);
        }

        let mut repaired = elements.to_vec();
        for &i in illegal.iter().rev() {
            repaired.remove(i);
        }

        // 结尾悬空的运算符没有右操作数
        while let Some(&Element::Op(op)) = repaired.last() {
            if op == LogicOperator::CloseParen {
                break;
            }
            if op == LogicOperator::OpenParen {
                depth -= 1;
            }
            repaired.pop();
        }

        repaired.extend(std::iter::repeat_n(
            Element::Op(LogicOperator::CloseParen),
            depth,
        ));

        if !Self::is_balanced(&repaired) {
            return Err(RuleError::EquationError(format!(
                "括号修复失败: {}",
                Equation::new(repaired)
            )));
        }

        Ok(repaired)
    }

    /// 返回追加的条件
    fn append_unreferenced(elements: &mut Vec<Element>, max_id: usize) -> Vec<Element> {
        let referenced: HashSet<usize> = elements
            .iter()
            .filter_map(|e| match e {
                Element::NodeRef(id) => Some(*id),
                Element::Op(_) => None,
            })
            .collect();

        let missing: Vec<Element> = (0..=max_id)
            .filter(|id| !referenced.contains(id))
            .map(Element::NodeRef)
            .collect();
        for &element in &missing {
            if !elements.is_empty() {
                elements.push(Element::Op(LogicOperator::Or));
            }
            elements.push(element);
        }
        missing
    }

    /// 括号嵌套深度从不为负且最终归零
    pub fn is_balanced(elements: &[Element]) -> bool {
        let mut depth = 0i64;
        for element in elements {
            match element {
                Element::Op(LogicOperator::OpenParen) => depth += 1,
                Element::Op(LogicOperator::CloseParen) => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }
        depth == 0
    }
}
