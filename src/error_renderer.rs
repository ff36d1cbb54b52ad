//! Error rendering using miette
//!
//! Turns the diagnostics of an [`Error`] into miette reports: severity,
//! error code, the (event, action) coordinate and help text.

use std::fmt;
use std::io::Write;

use miette::{GraphicalReportHandler, GraphicalTheme};

use crate::{Diagnostic, Error, Severity};

/// Render an error with formatting to stderr
///
/// # Example
/// ```no_run
/// use trigc::{Engine, EngineOptions, TriggerDefinition, render_error};
///
/// let engine = Engine::new(EngineOptions::default());
/// if let Err(e) = engine.compile(&TriggerDefinition::default()) {
///     render_error(&e);
/// }
/// ```
pub fn render_error(error: &Error) {
    let rendered = render_error_to_string(error);
    std::io::stderr().write_all(rendered.as_bytes()).ok();
}

/// Render an error to a String (useful for logs, editor panels, etc.)
pub fn render_error_to_string(error: &Error) -> String {
    render(error, GraphicalTheme::unicode())
}

/// Render an error to a String without color codes (useful for tests)
///
/// This is the same as `render_error_to_string` but without ANSI color codes,
/// making the output easier to compare in tests.
pub fn render_error_to_string_no_color(error: &Error) -> String {
    render(error, GraphicalTheme::unicode_nocolor())
}

/// Render a list of diagnostics, one report each.
pub fn render_diagnostics_to_string(diagnostics: &[Diagnostic], color: bool) -> String {
    let theme = if color {
        GraphicalTheme::unicode()
    } else {
        GraphicalTheme::unicode_nocolor()
    };
    render_all(diagnostics, theme)
}

fn render_all(diagnostics: &[Diagnostic], theme: GraphicalTheme) -> String {
    let handler = GraphicalReportHandler::new_themed(theme).with_width(120);
    let mut out = String::new();
    for diagnostic in diagnostics {
        handler.render_report(&mut out, &Report(diagnostic)).ok();
    }
    out
}

fn render(error: &Error, theme: GraphicalTheme) -> String {
    match error {
        Error::Api(msg) => format!("API error: {}\n", msg),
        Error::Compilation { .. } | Error::Internal { .. } => {
            render_all(error.diagnostics(), theme)
        }
    }
}

/// Adapter exposing a [`Diagnostic`] to miette.
struct Report<'a>(&'a Diagnostic);

impl fmt::Debug for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0, f)
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.coordinate {
            Some(coordinate) => write!(f, "{}: {}", coordinate, self.0.message),
            None => write!(f, "{}", self.0.message),
        }
    }
}

impl std::error::Error for Report<'_> {}

impl miette::Diagnostic for Report<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.0
            .code
            .as_ref()
            .map(|code| Box::new(code) as Box<dyn fmt::Display>)
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.0.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
            Severity::Info => miette::Severity::Advice,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.0
            .help
            .as_ref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display>)
    }
}
