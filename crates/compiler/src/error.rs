//! Diagnostics and delayed results.
//!
//! Every semantic routine reports failures as a [`CompileError`] carrying one
//! or more file:line:column anchored diagnostics. Routines that may suspend on
//! another job return [`DelayedResult`], the explicit three-valued
//! `Done / Waiting / Error` shape; the [`ready!`] macro propagates the
//! `Waiting` and `Error` cases the same way `?` propagates errors.

use crate::ast::FileRange;
use crate::constant::ConstantScope;

/// A single file:line:column anchored message.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub path: String,
    pub range: FileRange,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}: error: {}",
            self.path, self.range.first_line, self.range.first_column, self.message
        )
    }
}

/// A failed compilation. Usually a single diagnostic; circular-dependency
/// reports carry one "Here" diagnostic per blocked job.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(path: impl Into<String>, range: FileRange, message: impl Into<String>) -> Self {
        CompileError {
            diagnostics: vec![Diagnostic {
                path: path.into(),
                range,
                message: message.into(),
            }],
        }
    }

    /// A failure that has no useful source anchor (I/O errors, driver errors).
    pub fn message(message: impl Into<String>) -> Self {
        CompileError {
            diagnostics: vec![Diagnostic {
                path: String::new(),
                range: FileRange::default(),
                message: message.into(),
            }],
        }
    }

    /// Append a secondary diagnostic (e.g. "originally declared here").
    pub fn with_note(
        mut self,
        path: impl Into<String>,
        range: FileRange,
        message: impl Into<String>,
    ) -> Self {
        self.diagnostics.push(Diagnostic {
            path: path.into(),
            range,
            message: message.into(),
        });
        self
    }

    /// True if any diagnostic's message contains the given fragment. Used by
    /// tests asserting on specific failures.
    pub fn mentions(&self, fragment: &str) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.message.contains(fragment))
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i != 0 {
                writeln!(f)?;
            }
            if diagnostic.path.is_empty() {
                write!(f, "error: {}", diagnostic.message)?;
            } else {
                write!(f, "{diagnostic}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// Build a diagnostic anchored in the given scope's file.
pub fn error(scope: &ConstantScope, range: FileRange, message: impl Into<String>) -> CompileError {
    CompileError::new(scope.file_path(), range, message)
}

/// The result of a resolution step that may suspend on another job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delayed<T> {
    /// The value is available.
    Done(T),
    /// The caller must suspend until the job with this index is Done, then
    /// retry from the top.
    Waiting(usize),
}

pub type DelayedResult<T> = Result<Delayed<T>, CompileError>;

pub fn done<T>(value: T) -> DelayedResult<T> {
    Ok(Delayed::Done(value))
}

pub fn wait<T>(job: usize) -> DelayedResult<T> {
    Ok(Delayed::Waiting(job))
}

/// Unwrap a [`DelayedResult`], propagating errors and suspensions to the
/// caller. The enclosing function must itself return a `DelayedResult`.
#[macro_export]
macro_rules! ready {
    ($expression:expr) => {
        match $expression? {
            $crate::error::Delayed::Done(value) => value,
            $crate::error::Delayed::Waiting(job) => {
                return Ok($crate::error::Delayed::Waiting(job))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_is_anchored() {
        let error = CompileError::new(
            "src/main.mica",
            FileRange {
                first_line: 3,
                first_column: 7,
                last_line: 3,
                last_column: 12,
            },
            "Cannot find named reference x",
        );
        assert_eq!(
            error.to_string(),
            "src/main.mica:3:7: error: Cannot find named reference x"
        );
    }

    #[test]
    fn notes_render_on_their_own_lines() {
        let error = CompileError::new("a.mica", FileRange::default(), "Duplicate variable name x")
            .with_note("a.mica", FileRange::default(), "Original declared here");
        let rendered = error.to_string();
        assert_eq!(rendered.lines().count(), 2);
        assert!(error.mentions("Original declared here"));
    }
}
