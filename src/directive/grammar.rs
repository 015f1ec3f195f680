use std::sync::LazyLock;

use regex::Regex;

use crate::params::ParamMap;

// `@name` not preceded by `@` or an identifier character; the leading group eats that character.
static PARAM_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^@A-Za-z0-9_])@([A-Za-z_][A-Za-z0-9_]*)").expect("valid parameter pattern")
});

/// One `@name` occurrence inside a directive body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamRef {
    pub name: String,
    /// Byte range of `@name`, relative to the scanned text.
    pub start: usize,
    pub end: usize,
}

/// Every parameter reference in `text`, in order.
#[must_use]
pub fn parameter_refs(text: &str) -> Vec<ParamRef> {
    PARAM_REF
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(2)?;
            Some(ParamRef {
                name: name.as_str().to_string(),
                start: name.start() - 1,
                end: name.end(),
            })
        })
        .collect()
}

/// Distinct referenced names, in order of first appearance.
#[must_use]
pub fn parameter_names(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for r in parameter_refs(text) {
        if !names.contains(&r.name) {
            names.push(r.name);
        }
    }
    names
}

/// True when every reference in `names` is present with a non-blank value.
#[must_use]
pub fn all_present(names: &[String], params: &ParamMap) -> bool {
    names.iter().all(|name| params.is_present(name))
}

/// Replace each reference with the literal text of its value.
///
/// Returns `None` as soon as one referenced value is absent or blank.
#[must_use]
pub fn splice_literals(text: &str, params: &ParamMap) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for r in parameter_refs(text) {
        let value = params.get(&r.name).filter(|v| !v.is_blank())?;
        out.push_str(&text[cursor..r.start]);
        out.push_str(&value.to_literal_sql()?);
        cursor = r.end;
    }
    out.push_str(&text[cursor..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    #[test]
    fn finds_references_with_identifier_boundaries() {
        let refs = parameter_refs("a=@a AND (b=@b_2 OR c=@a)");
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b_2", "a"]);
        assert_eq!(parameter_names("a=@a AND c=@a"), vec!["a".to_string()]);
    }

    #[test]
    fn ignores_system_variables_and_addresses() {
        assert!(parameter_refs("SELECT @@ROWCOUNT").is_empty());
        assert!(parameter_refs("user@example").is_empty());
        assert!(parameter_refs("no refs").is_empty());
        assert_eq!(parameter_names("@first"), vec!["first".to_string()]);
    }

    #[test]
    fn splice_does_not_clobber_longer_names() {
        let params = ParamMap::new()
            .with("status", "A")
            .with("statusCode", RowValues::Int(9));
        assert_eq!(
            splice_literals("@status/@statusCode", &params).as_deref(),
            Some("A/9")
        );
    }

    #[test]
    fn splice_gives_up_on_missing_value() {
        let params = ParamMap::new().with("a", "x");
        assert_eq!(splice_literals("@a @b", &params), None);
    }
}
