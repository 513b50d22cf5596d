// diag.rs — Unified diagnostics model
//
// Shared diagnostic types used by the front end (parse, resolve) and by the
// symbol engine. Engine diagnostics are warnings about degraded inference;
// they never abort a build.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `W0101`).
///
/// Once assigned, a code keeps its meaning. New conditions get new codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registered diagnostic codes.
pub mod codes {
    use super::DiagCode;

    // Front end
    pub const E0001: DiagCode = DiagCode("E0001"); // syntax error
    pub const E0100: DiagCode = DiagCode("E0100"); // duplicate graph name
    pub const E0101: DiagCode = DiagCode("E0101"); // duplicate value name
    pub const E0102: DiagCode = DiagCode("E0102"); // undefined value
    pub const E0103: DiagCode = DiagCode("E0103"); // call to unknown graph
    pub const E0104: DiagCode = DiagCode("E0104"); // call arity mismatch
    pub const E0105: DiagCode = DiagCode("E0105"); // unknown dtype
    pub const E0106: DiagCode = DiagCode("E0106"); // entry graph not found
    pub const E0107: DiagCode = DiagCode("E0107"); // call through a value that is not a closure
    pub const E0108: DiagCode = DiagCode("E0108"); // switch without condition and two branches

    // Build
    pub const E0200: DiagCode = DiagCode("E0200"); // structural build error

    // Engine warnings
    pub const W0101: DiagCode = DiagCode("W0101"); // argument/parameter kind mismatch
    pub const W0102: DiagCode = DiagCode("W0102"); // parameter type has no symbolic form
    pub const W0103: DiagCode = DiagCode("W0103"); // rule declined, fell back to declared type
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Related span ─────────────────────────────────────────────────────────

/// A secondary source location providing context for a diagnostic.
#[derive(Debug, Clone)]
pub struct RelatedSpan {
    pub span: Span,
    pub label: String,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any phase.
///
/// `span` is `None` for graphs built through the programmatic API.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Option<Span>,
    pub message: String,
    pub hint: Option<String>,
    pub related_spans: Vec<RelatedSpan>,
}

impl Diagnostic {
    pub fn new(level: DiagLevel, span: Option<Span>, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
            related_spans: Vec::new(),
        }
    }

    pub fn error(span: Option<Span>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message)
    }

    pub fn warning(span: Option<Span>, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_related(mut self, span: Span, label: impl Into<String>) -> Self {
        self.related_spans.push(RelatedSpan {
            span,
            label: label.into(),
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
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
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// Render a diagnostic with a `line:col` prefix resolved against `source`.
pub fn render(diag: &Diagnostic, source: &str) -> String {
    match diag.span {
        Some(span) => {
            let (line, col) = line_col(source, span.start);
            format!("{line}:{col}: {diag}")
        }
        None => diag.to_string(),
    }
}

fn line_col(source: &str, offset: usize) -> (usize, usize) {
    let prefix = &source[..offset.min(source.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.rfind('\n').map_or(offset, |nl| offset - nl - 1) + 1;
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_span() -> Span {
        use chumsky::span::Span as _;
        Span::new((), 0..1)
    }

    #[test]
    fn display_without_code() {
        let d = Diagnostic::error(None, "something failed");
        assert_eq!(format!("{d}"), "error: something failed");
    }

    #[test]
    fn display_with_code() {
        let d = Diagnostic::warning(Some(dummy_span()), "rule declined")
            .with_code(codes::W0103);
        assert_eq!(format!("{d}"), "warning[W0103]: rule declined");
    }

    #[test]
    fn builder_chain() {
        let d = Diagnostic::error(Some(dummy_span()), "undefined value `x`")
            .with_code(codes::E0102)
            .with_hint("define `x` before use")
            .with_related(dummy_span(), "graph declared here");

        assert_eq!(d.code, Some(codes::E0102));
        assert_eq!(d.hint.as_deref(), Some("define `x` before use"));
        assert_eq!(d.related_spans.len(), 1);
        assert!(d.is_error());
    }

    #[test]
    fn render_resolves_line_and_column() {
        use chumsky::span::Span as _;
        let source = "graph g() {\n  return x\n}";
        let d = Diagnostic::error(Some(Span::new((), 21..22)), "undefined value `x`");
        assert_eq!(render(&d, source), "2:10: error: undefined value `x`");
    }
}
