// error.rs — Structured resolution errors
//
// Every failure of parsing, reconciliation, or splicing is reported as a
// `FreezeError` carrying its kind, a message, the offending override target
// (when there is one), and a span into the override text (when known).

use std::fmt;

use crate::ast::Span;
use crate::diag::{codes, DiagCode, DiagLevel, Diagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed override text.
    Syntax,
    /// Target is neither a declared input nor a node output.
    UnknownInput,
    /// Literal value and shape disagree.
    ShapeMismatch,
    /// Two entries address the same tensor.
    DuplicateOverride,
    /// Literal value cannot be represented in the resolved type.
    TypeCoercion,
    /// Shape override with a negative or zero non-leading dim.
    InvalidShape,
    /// Cut or rewiring cannot be applied to the graph.
    GraphSplice,
}

impl ErrorKind {
    pub fn code(self) -> DiagCode {
        match self {
            ErrorKind::Syntax => codes::SYNTAX,
            ErrorKind::UnknownInput => codes::UNKNOWN_INPUT,
            ErrorKind::ShapeMismatch => codes::SHAPE_MISMATCH,
            ErrorKind::DuplicateOverride => codes::DUPLICATE_OVERRIDE,
            ErrorKind::TypeCoercion => codes::TYPE_COERCION,
            ErrorKind::InvalidShape => codes::INVALID_SHAPE,
            ErrorKind::GraphSplice => codes::GRAPH_SPLICE,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::UnknownInput => "unknown input",
            ErrorKind::ShapeMismatch => "shape mismatch",
            ErrorKind::DuplicateOverride => "duplicate override",
            ErrorKind::TypeCoercion => "type coercion error",
            ErrorKind::InvalidShape => "invalid shape",
            ErrorKind::GraphSplice => "graph splice error",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct FreezeError {
    pub kind: ErrorKind,
    pub message: String,
    /// The override target as spelled by the user.
    pub target: Option<String>,
    pub span: Option<Span>,
}

impl FreezeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            target: None,
            span: None,
        }
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Syntax, message).with_span(span)
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::new(DiagLevel::Error, self.to_string()).with_code(self.kind.code());
        if let Some(span) = self.span {
            diag = diag.with_span(span);
        }
        diag
    }
}

impl fmt::Display for FreezeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{} for '{}': {}", self.kind, target, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FreezeError {}

/// Result type for resolution phases.
pub type Result<T> = std::result::Result<T, FreezeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_target() {
        let e = FreezeError::new(ErrorKind::DuplicateOverride, "also overridden at 0..10")
            .with_target("in1");
        assert_eq!(
            e.to_string(),
            "duplicate override for 'in1': also overridden at 0..10"
        );
    }

    #[test]
    fn diagnostic_carries_code() {
        let e = FreezeError::new(ErrorKind::ShapeMismatch, "[3] vs [4]");
        let d = e.to_diagnostic();
        assert_eq!(d.code, Some(codes::SHAPE_MISMATCH));
        assert_eq!(d.level, DiagLevel::Error);
    }
}
