// diag.rs — Unified diagnostics model
//
// Shared diagnostic types used by every resolution phase. Errors are
// rendered through `FreezeError::to_diagnostic`; warnings (for example a cut
// override that disagrees with producer metadata) are emitted directly.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0001`, `W0001`).
///
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    pub const SYNTAX: DiagCode = DiagCode("E0001");
    pub const UNKNOWN_INPUT: DiagCode = DiagCode("E0002");
    pub const SHAPE_MISMATCH: DiagCode = DiagCode("E0003");
    pub const DUPLICATE_OVERRIDE: DiagCode = DiagCode("E0004");
    pub const TYPE_COERCION: DiagCode = DiagCode("E0005");
    pub const INVALID_SHAPE: DiagCode = DiagCode("E0006");
    pub const GRAPH_SPLICE: DiagCode = DiagCode("E0007");

    /// Cut override type/shape disagrees with the producer's metadata.
    pub const CUT_METADATA_MISMATCH: DiagCode = DiagCode("W0001");
    /// A declared placeholder became unreachable and was pruned.
    pub const PLACEHOLDER_PRUNED: DiagCode = DiagCode("W0002");
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any phase. `span` points into the override text
/// when the problem can be tied to an entry.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Option<Span>,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code, span, or hint.
    pub fn new(level: DiagLevel, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(span) = &self.span {
            write!(f, " (at {}..{})", span.start, span.end)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 3..7)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::new(DiagLevel::Error, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code_and_span() {
        let d = Diagnostic::warning("cut override disagrees")
            .with_code(codes::CUT_METADATA_MISMATCH)
            .with_span(dummy_span());
        assert_eq!(
            format!("{d}"),
            "warning[W0001]: cut override disagrees (at 3..7)"
        );
    }

    #[test]
    fn hint_on_second_line() {
        let d = Diagnostic::new(DiagLevel::Error, "unknown input 'q'")
            .with_code(codes::UNKNOWN_INPUT)
            .with_hint("declared inputs: in1, in2");
        assert_eq!(
            format!("{d}"),
            "error[E0002]: unknown input 'q'\n  hint: declared inputs: in1, in2"
        );
    }
}
