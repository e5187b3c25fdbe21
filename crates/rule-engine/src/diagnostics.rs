//! 诊断信息输出
//!
//! 引擎内部的定义错误、公式修复和取值失败都会经由 [`Diagnostics`] 报告：
//! 总是写入 tracing 日志，若调用方挂载了 [`DiagnosticSink`] 则同时转发过去。

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// 单条诊断信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 出错位置，例如条件名称或公式
    pub context: String,
    /// 来源别名，通常是规则集名称
    pub alias: Option<String>,
}

/// 外部诊断接收器
#[cfg_attr(test, mockall::automock)]
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// 诊断句柄
///
/// 没有挂载接收器时只写日志，引擎行为不受影响。
#[derive(Clone, Default)]
pub struct Diagnostics {
    sink: Option<Arc<dyn DiagnosticSink>>,
    alias: Option<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    pub fn report(&self, severity: Severity, message: impl Into<String>, context: impl Into<String>) {
        let diagnostic = Diagnostic {
            severity,
            message: message.into(),
            context: context.into(),
            alias: self.alias.clone(),
        };

        let alias = diagnostic.alias.as_deref().unwrap_or("-");
        match severity {
            Severity::Info => {
                info!(alias, context = %diagnostic.context, "{}", diagnostic.message)
            }
            Severity::Warning => {
                warn!(alias, context = %diagnostic.context, "{}", diagnostic.message)
            }
            Severity::Error => {
                error!(alias, context = %diagnostic.context, "{}", diagnostic.message)
            }
        }

        if let Some(sink) = &self.sink {
            sink.report(&diagnostic);
        }
    }

    pub fn info(&self, message: impl Into<String>, context: impl Into<String>) {
        self.report(Severity::Info, message, context);
    }

    pub fn warn(&self, message: impl Into<String>, context: impl Into<String>) {
        self.report(Severity::Warning, message, context);
    }

    pub fn error(&self, message: impl Into<String>, context: impl Into<String>) {
        self.report(Severity::Error, message, context);
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("alias", &self.alias)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
