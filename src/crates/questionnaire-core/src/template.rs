//! Component C3: substitutes `{{ path.to.value }}` placeholders in a source
//! string with JSON-encoded literals drawn from the request context.

use async_trait::async_trait;

use crate::error::Warning;
use crate::value::{PathSegment, TemplateDialect, TemplateValue};

/// Resolves the root segment of a template path.
///
/// Implemented by [`crate::context::VariableResolver`]: the root name is
/// looked up through the scope chain (variable cache, then input
/// parameters, then reserved names), which may trigger a lazy evaluation
/// and therefore needs to be `async`. Every remaining path segment after
/// the root is resolved synchronously against the returned value via
/// [`TemplateValue::get_path`].
#[async_trait]
pub trait TemplateLookup: Send + Sync {
    async fn lookup_root(&mut self, name: &str) -> Option<TemplateValue>;
}

/// Parse a dotted/bracketed path (`a.b[0].c`) into its segments. Whitespace
/// surrounding the path (as found inside `{{ ... }}`) must already be
/// trimmed by the caller.
pub fn parse_path(path: &str) -> Vec<PathSegment> {
    let mut segments = Vec::new();
    let mut current = String::new();

    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(PathSegment::Key(std::mem::take(&mut current)));
                }
                let mut index = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    index.push(c);
                }
                if let Ok(idx) = index.trim().parse::<usize>() {
                    segments.push(PathSegment::Index(idx));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(PathSegment::Key(current));
    }
    segments
}

/// Split a path into its root identifier and the remaining segments, e.g.
/// `a.b[0].c` -> (`a`, [Key("b"), Index(0), Key("c")]).
fn root_and_rest(path: &str) -> (&str, Vec<PathSegment>) {
    let root_end = path
        .find(|c: char| c == '.' || c == '[')
        .unwrap_or(path.len());
    let root = &path[..root_end];
    let rest = parse_path(&path[root_end..]);
    (root, rest)
}

/// Substitutes every `{{ <path> }}` occurrence in `source` with a literal
/// resolved via `lookup`, rendered in `dialect`'s grammar.
///
/// A lookup failure (unknown root, or a path segment that doesn't resolve
/// against the root value) renders as that dialect's null literal and
/// appends a [`Warning`] to `warnings` rather than failing the whole render.
pub async fn render(
    source: &str,
    lookup: &mut dyn TemplateLookup,
    dialect: TemplateDialect,
    warnings: &mut Vec<Warning>,
) -> String {
    let mut output = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            // Unterminated placeholder: emit the remainder verbatim.
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let raw_path = after_open[..end].trim();
        let value = resolve_path(raw_path, lookup).await;
        match value {
            Some(v) => output.push_str(&v.to_literal(dialect)),
            None => {
                output.push_str(&TemplateValue::Null.to_literal(dialect));
                warnings.push(Warning::new(
                    raw_path,
                    format!("template path '{raw_path}' did not resolve"),
                ));
            }
        }
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);
    output
}

async fn resolve_path(path: &str, lookup: &mut dyn TemplateLookup) -> Option<TemplateValue> {
    let (root, segments) = root_and_rest(path);
    let root_value = lookup.lookup_root(root).await?;
    if segments.is_empty() {
        Some(root_value)
    } else {
        root_value.get_path(&segments).cloned()
    }
}
