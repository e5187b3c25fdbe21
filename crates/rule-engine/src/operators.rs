//! 比较符、算术运算符与逻辑运算符定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

/// 条件比较符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    // 关系比较
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // 字符串操作
    Contains,
    StartsWith,
    EndsWith,
    IsOneOf,

    // 恒真，并把左值写入条件名称
    Copy,
}

impl Comparator {
    /// 是否为六种关系比较符之一（日期、时长只支持这些）
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Gt | Self::Le | Self::Ge
        )
    }

    /// 将 `Ordering` 映射为比较结果，非关系比较符返回 `None`
    pub fn test_ordering(self, ordering: std::cmp::Ordering) -> Option<bool> {
        use std::cmp::Ordering::*;
        let matched = match self {
            Self::Eq => ordering == Equal,
            Self::Ne => ordering != Equal,
            Self::Lt => ordering == Less,
            Self::Gt => ordering == Greater,
            Self::Le => ordering != Greater,
            Self::Ge => ordering != Less,
            _ => return None,
        };
        Some(matched)
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "Eq",
            Self::Ne => "Ne",
            Self::Lt => "Lt",
            Self::Gt => "Gt",
            Self::Le => "Le",
            Self::Ge => "Ge",
            Self::Contains => "Contains",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::IsOneOf => "IsOneOf",
            Self::Copy => "Copy",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Comparator {
    type Err = RuleError;

    /// 名称不区分大小写，同时接受常见的符号写法
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let comparator = match s.trim().to_ascii_lowercase().as_str() {
            "eq" | "=" | "==" => Self::Eq,
            "ne" | "neq" | "!=" | "<>" => Self::Ne,
            "lt" | "<" => Self::Lt,
            "gt" | ">" => Self::Gt,
            "le" | "lte" | "<=" => Self::Le,
            "ge" | "gte" | ">=" => Self::Ge,
            "contains" => Self::Contains,
            "startswith" | "starts_with" => Self::StartsWith,
            "endswith" | "ends_with" => Self::EndsWith,
            "isoneof" | "is_one_of" => Self::IsOneOf,
            "copy" => Self::Copy,
            other => {
                return Err(RuleError::ParseError(format!("未知的比较符: '{}'", other)));
            }
        };
        Ok(comparator)
    }
}

/// 复合取值节点的算术运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArithmeticOperator {
    #[default]
    None,
    Plus,
    Minus,
    Times,
    DividedBy,
}

impl ArithmeticOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Times => "*",
            Self::DividedBy => "/",
        }
    }

    /// 数值运算；`None` 直接返回第一个操作数
    pub fn apply(self, a: f64, b: f64) -> Option<f64> {
        match self {
            Self::None => Some(a),
            Self::Plus => Some(a + b),
            Self::Minus => Some(a - b),
            Self::Times => Some(a * b),
            Self::DividedBy if b == 0.0 => None,
            Self::DividedBy => Some(a / b),
        }
    }
}

impl fmt::Display for ArithmeticOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            other => write!(f, "{}", other.symbol()),
        }
    }
}

impl FromStr for ArithmeticOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Self::None,
            "plus" | "+" => Self::Plus,
            "minus" | "-" => Self::Minus,
            "times" | "*" => Self::Times,
            "dividedby" | "divided_by" | "/" => Self::DividedBy,
            other => {
                return Err(RuleError::ParseError(format!("未知的算术运算符: '{}'", other)));
            }
        };
        Ok(op)
    }
}

/// 公式中的逻辑运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicOperator {
    And,
    Or,
    Xor,
    Not,
    OpenParen,
    CloseParen,
}

impl LogicOperator {
    /// 二元组合运算符（And / Or / Xor）
    pub fn is_binary(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }

    /// 紧凑公式中的字符表示
    pub fn symbol(self) -> char {
        match self {
            Self::And => '.',
            Self::Or => '+',
            Self::Xor => 'x',
            Self::Not => '-',
            Self::OpenParen => '(',
            Self::CloseParen => ')',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        let op = match c {
            '.' => Self::And,
            '+' => Self::Or,
            'x' => Self::Xor,
            '-' => Self::Not,
            '(' => Self::OpenParen,
            ')' => Self::CloseParen,
            _ => return None,
        };
        Some(op)
    }

    /// 二元运算
    pub fn combine(self, left: bool, right: bool) -> bool {
        match self {
            Self::And => left && right,
            Self::Xor => left != right,
            _ => left || right,
        }
    }
}

impl fmt::Display for LogicOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LogicOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "and" | "." | "&" => Self::And,
            "or" | "+" | "|" => Self::Or,
            "xor" | "x" | "^" => Self::Xor,
            "not" | "-" | "!" => Self::Not,
            "openparen" | "open_paren" | "(" => Self::OpenParen,
            "closeparen" | "close_paren" | ")" => Self::CloseParen,
            other => {
                return Err(RuleError::ParseError(format!("未知的逻辑运算符: '{}'", other)));
            }
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_comparator_from_str() {
        assert_eq!("Lt".parse::<Comparator>().unwrap(), Comparator::Lt);
        assert_eq!("isoneof".parse::<Comparator>().unwrap(), Comparator::IsOneOf);
        assert_eq!(">=".parse::<Comparator>().unwrap(), Comparator::Ge);
        assert!("between".parse::<Comparator>().is_err());
    }

    #[test]
    fn test_comparator_ordering() {
        assert_eq!(Comparator::Le.test_ordering(Ordering::Equal), Some(true));
        assert_eq!(Comparator::Gt.test_ordering(Ordering::Less), Some(false));
        assert_eq!(Comparator::Contains.test_ordering(Ordering::Equal), None);
    }

    #[test]
    fn test_arithmetic_apply() {
        assert_eq!(ArithmeticOperator::Plus.apply(2.0, 3.0), Some(5.0));
        assert_eq!(ArithmeticOperator::None.apply(2.0, 3.0), Some(2.0));
        assert_eq!(ArithmeticOperator::DividedBy.apply(1.0, 0.0), None);
    }

    #[test]
    fn test_logic_combine() {
        assert!(!LogicOperator::Xor.combine(true, true));
        assert!(LogicOperator::Xor.combine(true, false));
        assert!(LogicOperator::Or.combine(false, true));
        assert!(!LogicOperator::And.combine(false, true));
    }

    #[test]
    fn test_logic_symbols() {
        for c in ['.', '+', 'x', '-', '(', ')'] {
            let op = LogicOperator::from_symbol(c).unwrap();
            assert_eq!(op.symbol(), c);
        }
        assert_eq!(LogicOperator::from_symbol('a'), None);
    }
}
