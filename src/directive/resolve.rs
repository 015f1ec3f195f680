use crate::error::SqlTemplateError;
use crate::params::ParamMap;
use crate::types::Dialect;

use super::grammar::{all_present, parameter_names, splice_literals};

/// How a directive body turns into SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Keep the fragment (bind parameters intact) only if every referenced parameter is present.
    BindParameter,
    /// Splice referenced values into the fragment as SQL text.
    LiteralValue,
    /// Keep the fragment unconditionally.
    PassThrough,
}

/// Render one directive body against a call's parameters.
///
/// Missing parameters never fail; the directive just renders empty. The resolved
/// fragment keeps `@name` bind references for every dialect, placeholder rewriting
/// for the driver happens in [`crate::binding`].
///
/// # Errors
/// Returns `SqlTemplateError::Template` if the body references no parameter.
pub fn resolve(
    body: &str,
    dialect: Dialect,
    params: &ParamMap,
    mode: ResolveMode,
) -> Result<String, SqlTemplateError> {
    let names = parameter_names(body);
    if names.is_empty() {
        return Err(SqlTemplateError::template(format!(
            "directive `{}` for {dialect} has no @parameter reference",
            body.trim()
        )));
    }

    let rendered = match mode {
        ResolveMode::BindParameter => {
            if all_present(&names, params) {
                body.to_string()
            } else {
                String::new()
            }
        }
        ResolveMode::LiteralValue => splice_literals(body, params).unwrap_or_default(),
        ResolveMode::PassThrough => body.to_string(),
    };
    Ok(rendered)
}
