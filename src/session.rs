use std::ops::Range;

use tracing::debug;

use crate::directive::{DirectiveKind, grammar, resolve};
use crate::error::SqlTemplateError;
use crate::params::ParamMap;
use crate::template::{ResultBinding, Slot, Template};
use crate::types::Dialect;

/// Final SQL and routing metadata for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStatement {
    /// Lookup key of the template this came from.
    pub key: String,
    pub sql: String,
    pub connection_name: String,
    pub dialect: Dialect,
    pub result_binding: Option<ResultBinding>,
    /// Parameters referenced by the template text kept in `sql`, without `ConnectionPrefix`
    /// or literal-only values. Text spliced in by a literal directive never adds to it.
    pub bind_params: ParamMap,
}

/// A statement shared by every parameter set of a bulk call.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedBatch {
    pub statement: ResolvedStatement,
    /// One bind subset per supplied map, in input order.
    pub param_sets: Vec<ParamMap>,
}

/// Resolve `template` against one call's parameters.
///
/// Optional directives are kept or dropped, literal directives are spliced and parameter
/// directives lose their markers, each at its original position. The template itself is
/// never modified.
///
/// # Errors
/// Returns `SqlTemplateError::Template` if the template holds a malformed directive.
pub fn resolve_statement(
    template: &Template,
    params: &ParamMap,
) -> Result<ResolvedStatement, SqlTemplateError> {
    if let Some(bad) = template.malformed_directives().first() {
        return Err(SqlTemplateError::template(format!(
            "template `{}` has a directive without @parameter reference: {bad}",
            template.name()
        )));
    }

    let raw = template.raw_sql();
    let mut sql = String::with_capacity(raw.len());
    let mut referenced = Vec::new();
    render(
        template,
        template.layout(),
        0..raw.len(),
        params,
        &mut sql,
        &mut referenced,
    )?;

    let connection_name = match params.connection_prefix() {
        Some(prefix) => format!("{prefix}{}", template.connection_name()),
        None => template.connection_name().to_string(),
    };

    let bind_params = params.subset(referenced.iter().map(String::as_str));

    debug!(
        template = %template.name(),
        connection = %connection_name,
        binds = bind_params.len(),
        "resolved template"
    );

    Ok(ResolvedStatement {
        key: template.key().to_string(),
        sql,
        connection_name,
        dialect: template.dialect(),
        result_binding: template.result_binding().cloned(),
        bind_params,
    })
}

/// Resolve `template` once for a bulk call over several parameter maps.
///
/// The SQL text is resolved against the first map and shared by all of them.
///
/// # Errors
/// Returns `SqlTemplateError::Template` if the template contains a literal-substitution
/// directive, since spliced values cannot vary across one shared statement.
pub fn resolve_batch(
    template: &Template,
    batch: &[ParamMap],
) -> Result<ResolvedBatch, SqlTemplateError> {
    if template.has_literal_directives() {
        return Err(SqlTemplateError::template(format!(
            "template `{}` uses literal substitution and cannot run as a batch",
            template.name()
        )));
    }

    let empty = ParamMap::new();
    let first = batch.first().unwrap_or(&empty);
    let statement = resolve_statement(template, first)?;

    let referenced = grammar::parameter_names(&statement.sql);
    let param_sets = batch
        .iter()
        .map(|params| params.subset(referenced.iter().map(String::as_str)))
        .collect();

    Ok(ResolvedBatch {
        statement,
        param_sets,
    })
}

fn render(
    template: &Template,
    slots: &[Slot],
    range: Range<usize>,
    params: &ParamMap,
    out: &mut String,
    referenced: &mut Vec<String>,
) -> Result<(), SqlTemplateError> {
    let raw = template.raw_sql();
    let mut cursor = range.start;

    for slot in slots {
        let m = template.directive(slot.kind, slot.index);
        push_authored(&raw[cursor..m.span.start], out, referenced);
        let rendered = resolve(
            &m.body,
            template.dialect(),
            params,
            slot.kind.resolve_mode(),
        )?;
        match slot.kind {
            DirectiveKind::Optional if !rendered.is_empty() => {
                render(
                    template,
                    &slot.children,
                    m.body_span.clone(),
                    params,
                    out,
                    referenced,
                )?;
            }
            DirectiveKind::Optional => {}
            DirectiveKind::Literal => out.push_str(&rendered),
            DirectiveKind::Parameter => push_authored(&rendered, out, referenced),
        }
        cursor = m.span.end;
    }

    push_authored(&raw[cursor..range.end], out, referenced);
    Ok(())
}

fn push_authored(text: &str, out: &mut String, referenced: &mut Vec<String>) {
    for name in grammar::parameter_names(text) {
        if !referenced.contains(&name) {
            referenced.push(name);
        }
    }
    out.push_str(text);
}
