use std::sync::LazyLock;

use regex::Regex;

use super::grammar::parameter_names;
use super::{DirectiveKind, DirectiveMatch};

static OPTIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<%=(.*?)%>").expect("valid optional pattern"));
static LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<R%=(.*?)%R>").expect("valid literal pattern"));
static PARAMETER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)@@(.*?)@@").expect("valid parameter pattern"));

/// The three independent match lists for one template text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub optional: Vec<DirectiveMatch>,
    pub literal: Vec<DirectiveMatch>,
    pub parameter: Vec<DirectiveMatch>,
}

impl Extraction {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.optional.is_empty() && self.literal.is_empty() && self.parameter.is_empty()
    }

    /// All matches of all kinds, in extraction order.
    pub fn iter(&self) -> impl Iterator<Item = &DirectiveMatch> {
        self.optional
            .iter()
            .chain(self.literal.iter())
            .chain(self.parameter.iter())
    }

    #[must_use]
    pub fn of_kind(&self, kind: DirectiveKind) -> &[DirectiveMatch] {
        match kind {
            DirectiveKind::Optional => &self.optional,
            DirectiveKind::Literal => &self.literal,
            DirectiveKind::Parameter => &self.parameter,
        }
    }
}

/// Scan `text` for optional, literal and parameter markers.
///
/// Each kind is an independent scan over the original text, so a literal or parameter
/// marker inside an optional block is found as well. Markers do not nest within a kind.
#[must_use]
pub fn extract(text: &str) -> Extraction {
    Extraction {
        optional: scan(text, DirectiveKind::Optional),
        literal: scan(text, DirectiveKind::Literal),
        parameter: scan(text, DirectiveKind::Parameter),
    }
}

fn scan(text: &str, kind: DirectiveKind) -> Vec<DirectiveMatch> {
    let pattern: &Regex = match kind {
        DirectiveKind::Optional => &OPTIONAL,
        DirectiveKind::Literal => &LITERAL,
        DirectiveKind::Parameter => &PARAMETER,
    };

    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            Some(DirectiveMatch {
                kind,
                span: whole.range(),
                body_span: body.range(),
                body: body.as_str().to_string(),
                params: parameter_names(body.as_str()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str =
        "SELECT * FROM Orders WHERE 1=1 <%=AND Status=@status%> <R%=ORDER BY @sortCol%R>";

    #[test]
    fn finds_each_kind() {
        let found = extract(ORDERS);
        assert_eq!(found.optional.len(), 1);
        assert_eq!(found.optional[0].body, "AND Status=@status");
        assert_eq!(found.optional[0].params, vec!["status".to_string()]);
        assert_eq!(found.literal.len(), 1);
        assert_eq!(found.literal[0].body, "ORDER BY @sortCol");
        assert!(found.parameter.is_empty());
        assert_eq!(&ORDERS[found.literal[0].span.clone()], "<R%=ORDER BY @sortCol%R>");
    }

    #[test]
    fn shortest_match_across_lines() {
        let sql = "SELECT 1\n<%=AND a=@a\n  AND b=@b%>\n<%=AND c=@c%>";
        let found = extract(sql);
        assert_eq!(found.optional.len(), 2);
        assert_eq!(found.optional[0].params, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(found.optional[1].body, "AND c=@c");
    }

    #[test]
    fn nested_literal_inside_optional_is_found() {
        let sql = "SELECT 1 <%=AND x=@x ORDER BY <R%=@col%R>%>";
        let found = extract(sql);
        assert_eq!(found.literal.len(), 1);
        assert!(found.optional[0].contains(&found.literal[0]));
    }

    #[test]
    fn parameter_markers() {
        let found = extract("UPDATE t SET a=1 @@, b=@b@@ WHERE id=@id");
        assert_eq!(found.parameter.len(), 1);
        assert_eq!(found.parameter[0].body, ", b=@b");
        assert_eq!(found.parameter[0].marker_text(), "@@, b=@b@@");
    }

    #[test]
    fn paired_system_variables_read_as_a_malformed_parameter_directive() {
        let found = extract("SELECT @@ROWCOUNT, @@IDENTITY");
        assert_eq!(found.parameter.len(), 1);
        assert_eq!(found.parameter[0].body, "ROWCOUNT, ");
        assert!(found.parameter[0].is_malformed());

        assert!(extract("SELECT @@ROWCOUNT").is_empty());
    }

    #[test]
    fn extraction_is_repeatable() {
        assert_eq!(extract(ORDERS), extract(ORDERS));
        assert!(extract("SELECT 1").is_empty());
    }
}
