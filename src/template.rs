use std::path::{Path, PathBuf};

use tracing::warn;

use crate::directive::{DirectiveKind, DirectiveMatch, Extraction, extract};
use crate::types::Dialect;

/// Connection name used when neither the template nor the configuration names one.
pub const DEFAULT_CONNECTION_NAME: &str = "DbContext";

/// Hint naming an externally defined result type.
///
/// The core never loads the type; it only carries the hint to a row mapper
/// (see [`crate::mapping::RowMapperRegistry`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultBinding {
    pub assembly: String,
    pub class_name: String,
}

impl ResultBinding {
    pub fn new(assembly: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            assembly: assembly.into(),
            class_name: class_name.into(),
        }
    }
}

/// Raw attributes of one `SqlDefinition`, before directive extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDefinition {
    pub name: String,
    pub dialect: Dialect,
    pub connection_name: Option<String>,
    pub assembly: Option<String>,
    pub model_class_name: Option<String>,
    pub sql: String,
}

/// Reference to a directive in one of the template's three lists, plus its nested directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slot {
    pub kind: DirectiveKind,
    pub index: usize,
    pub children: Vec<Slot>,
}

/// A named SQL skeleton with its extracted directives. Immutable once built.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    key: String,
    dialect: Dialect,
    connection_name: String,
    result_binding: Option<ResultBinding>,
    raw_sql: String,
    directives: Extraction,
    layout: Vec<Slot>,
    malformed: Vec<String>,
    source: Option<PathBuf>,
}

impl Template {
    /// Template with the default connection name and no result binding.
    pub fn new(name: impl Into<String>, dialect: Dialect, sql: impl Into<String>) -> Self {
        Self::from_definition(
            TemplateDefinition {
                name: name.into(),
                dialect,
                connection_name: None,
                assembly: None,
                model_class_name: None,
                sql: sql.into(),
            },
            DEFAULT_CONNECTION_NAME,
            None,
        )
    }

    /// Build a template from a parsed definition.
    ///
    /// A blank connection name falls back to `default_connection_name`. The result
    /// binding is only kept when both the assembly and class name are given.
    #[must_use]
    pub fn from_definition(
        def: TemplateDefinition,
        default_connection_name: &str,
        source: Option<&Path>,
    ) -> Self {
        let connection_name = def
            .connection_name
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| default_connection_name.to_string());
        let result_binding = match (def.assembly, def.model_class_name) {
            (Some(assembly), Some(class_name))
                if !assembly.trim().is_empty() && !class_name.trim().is_empty() =>
            {
                Some(ResultBinding::new(assembly, class_name))
            }
            _ => None,
        };

        let directives = extract(&def.sql);
        let layout = build_layout(&def.name, &directives);
        let malformed = collect_malformed(&directives, &layout);
        for text in &malformed {
            warn!(template = %def.name, directive = %text, "directive has no @parameter reference");
        }

        Self {
            key: def.name.to_lowercase(),
            name: def.name,
            dialect: def.dialect,
            connection_name,
            result_binding,
            raw_sql: def.sql,
            directives,
            layout,
            malformed,
            source: source.map(Path::to_path_buf),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower-cased lookup key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    #[must_use]
    pub fn result_binding(&self) -> Option<&ResultBinding> {
        self.result_binding.as_ref()
    }

    #[must_use]
    pub fn raw_sql(&self) -> &str {
        &self.raw_sql
    }

    #[must_use]
    pub fn optional_directives(&self) -> &[DirectiveMatch] {
        &self.directives.optional
    }

    #[must_use]
    pub fn literal_directives(&self) -> &[DirectiveMatch] {
        &self.directives.literal
    }

    #[must_use]
    pub fn param_directives(&self) -> &[DirectiveMatch] {
        &self.directives.parameter
    }

    #[must_use]
    pub fn has_literal_directives(&self) -> bool {
        !self.directives.literal.is_empty()
    }

    /// Marker text of directives that reference no parameter.
    #[must_use]
    pub fn malformed_directives(&self) -> &[String] {
        &self.malformed
    }

    /// File the template was loaded from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub(crate) fn layout(&self) -> &[Slot] {
        &self.layout
    }

    pub(crate) fn directive(&self, kind: DirectiveKind, index: usize) -> &DirectiveMatch {
        &self.directives.of_kind(kind)[index]
    }
}

// Nest literal/parameter matches under the optional match that contains them.
// Overlaps that are not containment keep the earlier match only.
fn build_layout(name: &str, directives: &Extraction) -> Vec<Slot> {
    let mut all: Vec<(&DirectiveMatch, usize)> = Vec::new();
    for kind in [
        DirectiveKind::Optional,
        DirectiveKind::Literal,
        DirectiveKind::Parameter,
    ] {
        for (index, m) in directives.of_kind(kind).iter().enumerate() {
            all.push((m, index));
        }
    }
    all.sort_by(|(a, _), (b, _)| {
        a.span
            .start
            .cmp(&b.span.start)
            .then(b.span.end.cmp(&a.span.end))
    });

    let mut top: Vec<Slot> = Vec::new();
    let mut top_end = 0usize;
    let mut open: Option<&DirectiveMatch> = None;

    for (m, index) in all {
        let slot = Slot {
            kind: m.kind,
            index,
            children: Vec::new(),
        };

        if let Some(parent) = open {
            if parent.contains(m) {
                if let Some(last) = top.last_mut() {
                    let sibling_end = last
                        .children
                        .last()
                        .map_or(0, |c| directives.of_kind(c.kind)[c.index].span.end);
                    if m.span.start >= sibling_end {
                        last.children.push(slot);
                        continue;
                    }
                }
            }
        }

        if m.span.start < top_end {
            warn!(
                template = %name,
                directive = %m.marker_text(),
                "overlapping directive treated as plain text"
            );
            continue;
        }

        top_end = m.span.end;
        open = (m.kind == DirectiveKind::Optional).then_some(m);
        top.push(slot);
    }

    top
}

fn collect_malformed(directives: &Extraction, layout: &[Slot]) -> Vec<String> {
    let mut out = Vec::new();
    let mut stack: Vec<&Slot> = layout.iter().collect();
    while let Some(slot) = stack.pop() {
        let m = &directives.of_kind(slot.kind)[slot.index];
        if m.is_malformed() {
            out.push(m.marker_text());
        }
        stack.extend(slot.children.iter());
    }
    out.sort();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_lower_cased_name() {
        let t = Template::new("GetOrders", Dialect::MySql, "SELECT 1");
        assert_eq!(t.key(), "getorders");
        assert_eq!(t.name(), "GetOrders");
        assert_eq!(t.connection_name(), DEFAULT_CONNECTION_NAME);
        assert!(t.result_binding().is_none());
    }

    #[test]
    fn result_binding_needs_both_parts() {
        let def = TemplateDefinition {
            name: "x".into(),
            dialect: Dialect::Sqlite,
            connection_name: Some("  ".into()),
            assembly: Some("Shop.Models".into()),
            model_class_name: None,
            sql: "SELECT 1".into(),
        };
        let t = Template::from_definition(def.clone(), "Reporting", None);
        assert_eq!(t.connection_name(), "Reporting");
        assert!(t.result_binding().is_none());

        let t = Template::from_definition(
            TemplateDefinition {
                model_class_name: Some("Order".into()),
                ..def
            },
            "Reporting",
            None,
        );
        assert_eq!(
            t.result_binding(),
            Some(&ResultBinding::new("Shop.Models", "Order"))
        );
    }

    #[test]
    fn nested_directives_sit_under_their_optional_block() {
        let t = Template::new(
            "n",
            Dialect::Sqlite,
            "SELECT 1 <%=AND x=@x ORDER BY <R%=@col%R>%> @@AND y=@y@@",
        );
        let layout = t.layout();
        assert_eq!(layout.len(), 2);
        assert_eq!(layout[0].kind, DirectiveKind::Optional);
        assert_eq!(layout[0].children.len(), 1);
        assert_eq!(layout[0].children[0].kind, DirectiveKind::Literal);
        assert_eq!(layout[1].kind, DirectiveKind::Parameter);
    }

    #[test]
    fn malformed_directives_are_recorded() {
        let t = Template::new("m", Dialect::MySql, "SELECT 1 <%=AND 1=1%> <%=AND a=@a%>");
        assert_eq!(t.malformed_directives(), &["<%=AND 1=1%>".to_string()]);
    }

    #[test]
    fn literal_detection() {
        let t = Template::new("l", Dialect::MySql, "SELECT 1 <R%=ORDER BY @c%R>");
        assert!(t.has_literal_directives());
        assert!(!Template::new("p", Dialect::MySql, "SELECT @a").has_literal_directives());
    }
}
