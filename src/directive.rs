//! Directive markers embedded in SQL templates.
//!
//! Three marker kinds are recognized:
//!
//! | Marker | Kind | Behavior |
//! |---|---|---|
//! | `<%= … %>` | [`DirectiveKind::Optional`] | bind-parameterized fragment, dropped unless every referenced parameter is present |
//! | `<R%= … %R>` | [`DirectiveKind::Literal`] | parameter values spliced into the SQL text |
//! | `@@ … @@` | [`DirectiveKind::Parameter`] | always included, markers stripped |
//!
//! Parameters are referenced inside a directive body as `@name`.
//!
//! The reference grammar never reads `@@ROWCOUNT` as a parameter, but extraction pairs
//! any two `@@` markers: a template using two system variables, such as
//! `SELECT @@ROWCOUNT, @@IDENTITY`, holds one malformed parameter directive and fails
//! every resolution. A single system variable is left alone.

use std::ops::Range;

pub mod extract;
pub mod grammar;
pub mod resolve;

pub use extract::{Extraction, extract};
pub use resolve::{ResolveMode, resolve};

/// Which marker pair delimited a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Optional,
    Literal,
    Parameter,
}

impl DirectiveKind {
    #[must_use]
    pub fn open_marker(self) -> &'static str {
        match self {
            DirectiveKind::Optional => "<%=",
            DirectiveKind::Literal => "<R%=",
            DirectiveKind::Parameter => "@@",
        }
    }

    #[must_use]
    pub fn close_marker(self) -> &'static str {
        match self {
            DirectiveKind::Optional => "%>",
            DirectiveKind::Literal => "%R>",
            DirectiveKind::Parameter => "@@",
        }
    }

    /// How the resolver renders a directive of this kind.
    #[must_use]
    pub fn resolve_mode(self) -> ResolveMode {
        match self {
            DirectiveKind::Optional => ResolveMode::BindParameter,
            DirectiveKind::Literal => ResolveMode::LiteralValue,
            DirectiveKind::Parameter => ResolveMode::PassThrough,
        }
    }
}

/// One marker span found in template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveMatch {
    pub kind: DirectiveKind,
    /// Byte range of the whole marker, delimiters included.
    pub span: Range<usize>,
    /// Byte range of the body between the delimiters.
    pub body_span: Range<usize>,
    pub body: String,
    /// Distinct parameter names referenced by the body, in order of first appearance.
    pub params: Vec<String>,
}

impl DirectiveMatch {
    /// The marker text exactly as written in the template.
    #[must_use]
    pub fn marker_text(&self) -> String {
        format!(
            "{}{}{}",
            self.kind.open_marker(),
            self.body,
            self.kind.close_marker()
        )
    }

    #[must_use]
    pub fn is_malformed(&self) -> bool {
        self.params.is_empty()
    }

    #[must_use]
    pub fn contains(&self, other: &DirectiveMatch) -> bool {
        self.body_span.start <= other.span.start && other.span.end <= self.body_span.end
    }
}
