use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

use crate::error::SqlTemplateError;
use crate::template::{Template, TemplateDefinition};
use crate::types::Dialect;

const SQL_DEFINITION: &[u8] = b"SqlDefinition";
const SQL_COMMAND: &[u8] = b"SqlCommand";

/// Every `.xml` file under `root`, recursively, in a stable order.
///
/// # Errors
/// Returns `SqlTemplateError::CacheLoad` if `root` (or a subdirectory) cannot be listed.
pub fn collect_xml_files(root: &Path) -> Result<Vec<PathBuf>, SqlTemplateError> {
    let mut files = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| SqlTemplateError::cache_load(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| SqlTemplateError::cache_load(&dir, e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            } else if is_xml(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
}

/// Read and parse one template file.
///
/// # Errors
/// Returns `SqlTemplateError::CacheLoad` naming `path` if the file cannot be read, is not
/// well-formed XML, or declares an unsupported database type.
pub fn load_file(path: &Path, default_connection_name: &str) -> Result<Vec<Template>, SqlTemplateError> {
    let xml = std::fs::read_to_string(path).map_err(|e| SqlTemplateError::cache_load(path, e))?;
    let definitions = parse_document(&xml).map_err(|cause| SqlTemplateError::cache_load(path, cause))?;
    debug!(file = %path.display(), templates = definitions.len(), "parsed template file");
    Ok(definitions
        .into_iter()
        .map(|def| Template::from_definition(def, default_connection_name, Some(path)))
        .collect())
}

#[derive(Default)]
struct Pending {
    name: String,
    definition: Option<TemplateDefinition>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TextTarget {
    Definition,
    Command,
}

/// Parse a template document: every direct child of the root element that carries a
/// `name` attribute becomes one definition, read from its `SqlDefinition` child.
///
/// The SQL text comes from a `SqlCommand` child of `SqlDefinition` when there is one,
/// otherwise from the text of `SqlDefinition` itself.
///
/// # Errors
/// Returns a description of the first XML or attribute problem found.
pub fn parse_document(xml: &str) -> Result<Vec<TemplateDefinition>, String> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();

    let mut depth = 0usize;
    let mut entry: Option<Pending> = None;
    let mut target: Option<TextTarget> = None;
    let mut definition_text = String::new();
    let mut command_text: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("{e} (at byte {})", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                match depth {
                    2 => {
                        entry = entry_name(&e)?.map(|name| Pending {
                            name,
                            definition: None,
                        });
                    }
                    3 if entry.is_some() && e.local_name().as_ref() == SQL_DEFINITION => {
                        if let Some(pending) = entry.as_mut() {
                            pending.definition = Some(definition_attrs(&pending.name, &e)?);
                        }
                        definition_text.clear();
                        command_text = None;
                        target = Some(TextTarget::Definition);
                    }
                    4 if target == Some(TextTarget::Definition)
                        && e.local_name().as_ref() == SQL_COMMAND =>
                    {
                        command_text = Some(String::new());
                        target = Some(TextTarget::Command);
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if depth == 2 && e.local_name().as_ref() == SQL_DEFINITION {
                    if let Some(pending) = entry.as_mut() {
                        pending.definition = Some(definition_attrs(&pending.name, &e)?);
                    }
                } else if depth == 1 {
                    if let Some(name) = entry_name(&e)? {
                        warn!(template = %name, "template entry has no SqlDefinition; skipped");
                    }
                }
            }
            Event::Text(t) => {
                if let Some(tt) = target {
                    let text = t.unescape().map_err(|e| e.to_string())?;
                    push_text(tt, &text, &mut definition_text, &mut command_text);
                }
            }
            Event::CData(c) => {
                if let Some(tt) = target {
                    let text = std::str::from_utf8(&c).map_err(|e| e.to_string())?;
                    push_text(tt, text, &mut definition_text, &mut command_text);
                }
            }
            Event::End(e) => {
                match depth {
                    2 => {
                        if let Some(pending) = entry.take() {
                            match pending.definition {
                                Some(def) => out.push(def),
                                None => warn!(
                                    template = %pending.name,
                                    "template entry has no SqlDefinition; skipped"
                                ),
                            }
                        }
                    }
                    3 if target.is_some() && e.local_name().as_ref() == SQL_DEFINITION => {
                        let sql = command_text.take().unwrap_or_else(|| definition_text.clone());
                        if let Some(def) = entry.as_mut().and_then(|p| p.definition.as_mut()) {
                            def.sql = sql.trim().to_string();
                        }
                        target = None;
                    }
                    4 if target == Some(TextTarget::Command) => {
                        target = Some(TextTarget::Definition);
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => {
                if depth != 0 {
                    return Err(format!(
                        "unexpected end of document: {depth} unclosed element(s)"
                    ));
                }
                break;
            }
            _ => {}
        }
    }

    Ok(out)
}

fn push_text(target: TextTarget, text: &str, definition: &mut String, command: &mut Option<String>) {
    match target {
        TextTarget::Definition => definition.push_str(text),
        TextTarget::Command => {
            if let Some(buf) = command.as_mut() {
                buf.push_str(text);
            }
        }
    }
}

fn entry_name(e: &BytesStart<'_>) -> Result<Option<String>, String> {
    Ok(attribute(e, "name")?.filter(|n| !n.trim().is_empty()))
}

fn definition_attrs(name: &str, e: &BytesStart<'_>) -> Result<TemplateDefinition, String> {
    let dialect_tag =
        attribute(e, "type")?.ok_or_else(|| format!("SqlDefinition of `{name}` has no type attribute"))?;
    let dialect = dialect_tag
        .parse::<Dialect>()
        .map_err(|_| format!("SqlDefinition of `{name}` has unsupported type `{dialect_tag}`"))?;
    Ok(TemplateDefinition {
        name: name.to_string(),
        dialect,
        connection_name: attribute(e, "ConnStringName")?,
        assembly: attribute(e, "Assembly")?,
        model_class_name: attribute(e, "ModelClassName")?,
        sql: String::new(),
    })
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, String> {
    match e.try_get_attribute(key).map_err(|err| err.to_string())? {
        Some(attr) => {
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<SqlConfig>
  <data name="GetOrders">
    <SqlDefinition type="mysql" ConnStringName="Shop">
      <SqlCommand><![CDATA[
        SELECT * FROM Orders WHERE 1=1 <%=AND Status=@status%> <R%=ORDER BY @sortCol%R>
      ]]></SqlCommand>
    </SqlDefinition>
  </data>
  <data name="CountOrders">
    <SqlDefinition type="sqlite" Assembly="Shop.Models" ModelClassName="OrderCount">SELECT COUNT(*) FROM Orders WHERE total &gt; @min</SqlDefinition>
  </data>
  <comment>ignored: no name attribute</comment>
  <data name="NoDefinition"><Other/></data>
</SqlConfig>"#;

    #[test]
    fn parses_named_entries() {
        let defs = parse_document(DOC).unwrap();
        assert_eq!(defs.len(), 2);

        assert_eq!(defs[0].name, "GetOrders");
        assert_eq!(defs[0].dialect, Dialect::MySql);
        assert_eq!(defs[0].connection_name.as_deref(), Some("Shop"));
        assert_eq!(
            defs[0].sql,
            "SELECT * FROM Orders WHERE 1=1 <%=AND Status=@status%> <R%=ORDER BY @sortCol%R>"
        );

        assert_eq!(defs[1].dialect, Dialect::Sqlite);
        assert_eq!(defs[1].sql, "SELECT COUNT(*) FROM Orders WHERE total > @min");
        assert_eq!(defs[1].assembly.as_deref(), Some("Shop.Models"));
        assert_eq!(defs[1].model_class_name.as_deref(), Some("OrderCount"));
        assert!(defs[1].connection_name.is_none());
    }

    #[test]
    fn unsupported_type_is_an_error() {
        let doc = r#"<root><data name="x"><SqlDefinition type="oracle">SELECT 1</SqlDefinition></data></root>"#;
        let err = parse_document(doc).unwrap_err();
        assert!(err.contains("oracle"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_document("<root><data name=\"x\"></root>").is_err());
    }

    #[test]
    fn truncated_document_is_an_error() {
        let err = parse_document("<SqlConfig><data name=\"x\">").unwrap_err();
        assert!(err.contains("2 unclosed element(s)"), "{err}");
    }

    #[test]
    fn collects_xml_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("orders").join("archive")).unwrap();
        std::fs::write(dir.path().join("a.xml"), "<root/>").unwrap();
        std::fs::write(dir.path().join("orders").join("b.XML"), "<root/>").unwrap();
        std::fs::write(dir.path().join("orders").join("archive").join("c.xml"), "<root/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = collect_xml_files(dir.path()).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| is_xml(p)));
    }
}
