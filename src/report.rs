use crate::collectors::{Field, FieldKind};
use crate::config::PlaceholderSyntax;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("не удалось прочитать шаблон {path}: {source}")]
    TemplateRead {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось записать {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("ошибка сериализации JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Replaces `{{ key }}` (and bare `{key}` with [`PlaceholderSyntax::Both`])
/// in one left-to-right pass. Substituted text is never rescanned and
/// placeholders naming unknown keys stay as written.
pub fn render_template(template: &str, fields: &[Field], syntax: PlaceholderSyntax) -> String {
    let values: HashMap<&str, &str> = fields
        .iter()
        .map(|f| (f.key.as_str(), f.value.as_str()))
        .collect();

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match match_placeholder(tail, &values, syntax) {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn match_placeholder<'v>(
    tail: &str,
    values: &HashMap<&str, &'v str>,
    syntax: PlaceholderSyntax,
) -> Option<(&'v str, usize)> {
    if let Some(inner) = tail.strip_prefix("{{ ") {
        if let Some(end) = inner.find(" }}") {
            if let Some(value) = values.get(&inner[..end]) {
                return Some((*value, "{{ ".len() + end + " }}".len()));
            }
        }
    }

    if syntax == PlaceholderSyntax::Both {
        let inner = &tail[1..];
        let end = inner.find('}')?;
        let key = &inner[..end];
        if is_field_key(key) {
            if let Some(value) = values.get(key) {
                return Some((*value, end + 2));
            }
        }
    }
    None
}

fn is_field_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn render_report(
    template_path: &Path,
    html_path: &Path,
    fields: &[Field],
    syntax: PlaceholderSyntax,
) -> Result<(), ReportError> {
    let template = fs::read_to_string(template_path).map_err(|source| ReportError::TemplateRead {
        path: template_path.display().to_string(),
        source,
    })?;

    let html = render_template(&template, fields, syntax);
    fs::write(html_path, html).map_err(|source| ReportError::Write {
        path: html_path.display().to_string(),
        source,
    })?;
    info!(path = %html_path.display(), "HTML-отчёт сформирован");
    Ok(())
}

/// Pretty JSON object of every non-markup field, in field order.
pub fn json_document(fields: &[Field]) -> Result<Vec<u8>, ReportError> {
    let object: Map<String, Value> = fields
        .iter()
        .filter(|f| f.kind != FieldKind::Markup)
        .map(|f| (f.key.clone(), Value::String(f.value.clone())))
        .collect();

    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    Value::Object(object).serialize(&mut serializer)?;
    Ok(buf)
}

pub fn write_json(path: &Path, fields: &[Field]) -> Result<(), ReportError> {
    let document = json_document(fields)?;
    fs::write(path, document).map_err(|source| ReportError::Write {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "JSON-файл сформирован");
    Ok(())
}
