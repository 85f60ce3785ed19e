//! Textual diffs between dataset snapshots.
//!
//! Both sides are rendered as pretty-printed JSON with sorted keys, then
//! compared line by line. Identical sides produce an empty diff in every
//! format.

use crate::config::DiffConfig;
use crate::context::ActionContext;
use crate::error::{VersionError, VersionResult};
use crate::host::{Dict, HostAction};
use crate::snapshot::SnapshotService;
use crate::versions::{Owner, OwnerRef};
use dsversion_storage::Version;
use dsversion_util::TimingGuard;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use similar::{ChangeTag, DiffTag, TextDiff};
use std::ops::Range;
use tracing::debug;

/// Version reference meaning the live dataset.
pub const CURRENT: &str = "current";

/// Output format of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffFormat {
    Unified,
    Context,
    Html,
}

impl DiffFormat {
    pub fn parse(s: &str) -> VersionResult<Self> {
        match s {
            "unified" => Ok(DiffFormat::Unified),
            "context" => Ok(DiffFormat::Context),
            "html" => Ok(DiffFormat::Html),
            other => Err(VersionError::validation(format!(
                "Format {other} not supported; use one of unified, context, html"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiffFormat::Unified => "unified",
            DiffFormat::Context => "context",
            DiffFormat::Html => "html",
        }
    }
}

/// Result of [`DiffEngine::diff`].
#[derive(Debug, Clone, Serialize)]
pub struct VersionDiff {
    pub package_id: String,
    /// `None` is the live dataset.
    pub version_1: Option<Version>,
    pub version_2: Option<Version>,
    pub format: DiffFormat,
    /// Rendered diff; empty when the snapshots are identical.
    pub diff: String,
}

impl VersionDiff {
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }
}

/// Compares two points in a dataset's history.
#[derive(Clone)]
pub struct DiffEngine {
    snapshots: SnapshotService,
    options: DiffConfig,
}

impl DiffEngine {
    pub fn new(snapshots: SnapshotService) -> Self {
        let options = snapshots.versions().config().diff.clone();
        Self { snapshots, options }
    }

    /// Diff two versions of a dataset. Either reference may be [`CURRENT`].
    pub async fn diff(
        &self,
        ctx: &ActionContext,
        dataset_ref: &str,
        version_1: &str,
        version_2: &str,
        format: &str,
    ) -> VersionResult<VersionDiff> {
        let _timing = TimingGuard::action("version_diff");
        let format = DiffFormat::parse(format)?;

        let versions = self.snapshots.versions();
        let owner = versions
            .resolve_owner(&OwnerRef::dataset(dataset_ref))
            .await?;
        versions
            .authorize(ctx, HostAction::PackageShow, &owner.package_id)
            .await?;

        let (version_1, old) = self.side(&owner, version_1).await?;
        let (version_2, new) = self.side(&owner, version_2).await?;

        let from = label(version_1.as_ref());
        let to = label(version_2.as_ref());
        let old = render_json(&old)?;
        let new = render_json(&new)?;

        let context = self.options.context_lines;
        let diff = match format {
            DiffFormat::Unified => render_unified(&old, &new, &from, &to, context),
            DiffFormat::Context => render_context(&old, &new, &from, &to, context),
            DiffFormat::Html => {
                render_html(&old, &new, &from, &to, context, self.options.wrap_column)
            }
        };
        debug!(
            package_id = %owner.package_id,
            from = %from,
            to = %to,
            format = format.as_str(),
            empty = diff.is_empty(),
            "Computed diff"
        );

        Ok(VersionDiff {
            package_id: owner.package_id,
            version_1,
            version_2,
            format,
            diff,
        })
    }

    async fn side(
        &self,
        owner: &Owner,
        version_ref: &str,
    ) -> VersionResult<(Option<Version>, Dict)> {
        if version_ref == CURRENT {
            let mut package = owner.package.clone();
            self.snapshots.backfill_license(&mut package);
            return Ok((None, package));
        }

        let version = self
            .snapshots
            .versions()
            .lookup(version_ref, Some(owner))
            .await?
            .ok_or_else(|| VersionError::not_found("Version not found"))?;
        if version.package_id != owner.package_id {
            return Err(VersionError::validation(
                "Versions do not belong to the same dataset",
            ));
        }

        let package = self.snapshots.historical_package(&version).await?;
        Ok((Some(version), package))
    }
}

fn label(version: Option<&Version>) -> String {
    version.map_or_else(|| CURRENT.to_string(), |v| v.name.clone())
}

/// Pretty JSON with keys sorted at every level, ending in a newline.
fn render_json(package: &Dict) -> VersionResult<String> {
    let canonical = sort_keys(&Value::Object(package.clone()));
    let mut text = serde_json::to_string_pretty(&canonical)?;
    text.push('\n');
    Ok(text)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys(&map[key.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Unified diff with `@@` hunk headers.
pub fn render_unified(old: &str, new: &str, from: &str, to: &str, context: usize) -> String {
    if old == new {
        return String::new();
    }

    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();
    output.push_str(&format!("--- {from}\n"));
    output.push_str(&format!("+++ {to}\n"));

    for group in diff.grouped_ops(context) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;
        output.push_str(&format!(
            "@@ -{} +{} @@\n",
            unified_range(&old_range),
            unified_range(&new_range)
        ));

        for op in &group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}

fn unified_range(range: &Range<usize>) -> String {
    match range.len() {
        0 => format!("{},0", range.start),
        1 => format!("{}", range.start + 1),
        len => format!("{},{}", range.start + 1, len),
    }
}

/// Context diff: each hunk shows the old lines, then the new lines.
pub fn render_context(old: &str, new: &str, from: &str, to: &str, context: usize) -> String {
    if old == new {
        return String::new();
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let diff = TextDiff::from_lines(old, new);

    let mut output = String::new();
    output.push_str(&format!("*** {from}\n"));
    output.push_str(&format!("--- {to}\n"));

    for group in diff.grouped_ops(context) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        output.push_str("***************\n");
        output.push_str(&format!("*** {} ****\n", context_range(&old_range)));
        if group
            .iter()
            .any(|op| matches!(op.tag(), DiffTag::Replace | DiffTag::Delete))
        {
            for op in &group {
                let prefix = match op.tag() {
                    DiffTag::Equal => "  ",
                    DiffTag::Replace => "! ",
                    DiffTag::Delete => "- ",
                    DiffTag::Insert => continue,
                };
                for line in &old_lines[op.old_range()] {
                    output.push_str(prefix);
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }

        output.push_str(&format!("--- {} ----\n", context_range(&new_range)));
        if group
            .iter()
            .any(|op| matches!(op.tag(), DiffTag::Replace | DiffTag::Insert))
        {
            for op in &group {
                let prefix = match op.tag() {
                    DiffTag::Equal => "  ",
                    DiffTag::Replace => "! ",
                    DiffTag::Insert => "+ ",
                    DiffTag::Delete => continue,
                };
                for line in &new_lines[op.new_range()] {
                    output.push_str(prefix);
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }
    }

    output
}

fn context_range(range: &Range<usize>) -> String {
    let len = range.len();
    let beginning = if len == 0 { range.start } else { range.start + 1 };
    if len <= 1 {
        format!("{beginning}")
    } else {
        format!("{},{}", beginning, beginning + len - 1)
    }
}

/// Side-by-side HTML table. Lines longer than `wrap_column` characters
/// continue on extra rows marked `>`.
pub fn render_html(
    old: &str,
    new: &str,
    from: &str,
    to: &str,
    context: usize,
    wrap_column: usize,
) -> String {
    if old == new {
        return String::new();
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();
    let diff = TextDiff::from_lines(old, new);

    let mut rows = String::new();
    for (idx, group) in diff.grouped_ops(context).iter().enumerate() {
        if idx > 0 {
            rows.push_str("    </tbody>\n    <tbody>\n");
        }

        for op in group {
            let (old_class, new_class) = match op.tag() {
                DiffTag::Equal => (None, None),
                DiffTag::Delete => (Some("diff_sub"), None),
                DiffTag::Insert => (None, Some("diff_add")),
                DiffTag::Replace => (Some("diff_chg"), Some("diff_chg")),
            };
            let old_range = op.old_range();
            let new_range = op.new_range();

            for i in 0..old_range.len().max(new_range.len()) {
                let left = side_line(&old_lines, &old_range, i);
                let right = side_line(&new_lines, &new_range, i);
                push_html_row(
                    &mut rows,
                    (left, old_class),
                    (right, new_class),
                    wrap_column,
                );
            }
        }
    }

    format!(
        "<table class=\"diff\" summary=\"Dataset differences\">\n\
         \x20   <colgroup></colgroup> <colgroup></colgroup>\n\
         \x20   <colgroup></colgroup> <colgroup></colgroup>\n\
         \x20   <thead><tr><th class=\"diff_header\" colspan=\"2\">{}</th>\
         <th class=\"diff_header\" colspan=\"2\">{}</th></tr></thead>\n\
         \x20   <tbody>\n{}    </tbody>\n</table>\n",
        escape_html(from),
        escape_html(to),
        rows
    )
}

/// `(line number, text)` of the `i`th line of a range, if the range has one.
fn side_line<'a>(lines: &[&'a str], range: &Range<usize>, i: usize) -> Option<(usize, &'a str)> {
    let index = range.start + i;
    if index < range.end {
        lines.get(index).map(|text| (index + 1, *text))
    } else {
        None
    }
}

type HtmlSide<'a> = (Option<(usize, &'a str)>, Option<&'static str>);

fn push_html_row(out: &mut String, left: HtmlSide<'_>, right: HtmlSide<'_>, wrap_column: usize) {
    let left_chunks = left.0.map(|(_, text)| wrap_line(text, wrap_column));
    let right_chunks = right.0.map(|(_, text)| wrap_line(text, wrap_column));
    let height = left_chunks
        .as_ref()
        .map_or(0, Vec::len)
        .max(right_chunks.as_ref().map_or(0, Vec::len))
        .max(1);

    for row in 0..height {
        out.push_str("        <tr>");
        push_html_cell(out, left.0.map(|(n, _)| n), left_chunks.as_deref(), row, left.1);
        push_html_cell(out, right.0.map(|(n, _)| n), right_chunks.as_deref(), row, right.1);
        out.push_str("</tr>\n");
    }
}

fn push_html_cell(
    out: &mut String,
    line_number: Option<usize>,
    chunks: Option<&[String]>,
    row: usize,
    class: Option<&str>,
) {
    let chunk = chunks.and_then(|c| c.get(row));
    let header = match (line_number, chunk) {
        (Some(n), Some(_)) if row == 0 => n.to_string(),
        (Some(_), Some(_)) => "&gt;".to_string(),
        _ => String::new(),
    };
    out.push_str(&format!("<td class=\"diff_header\">{header}</td>"));

    let text = chunk.map(|c| escape_html(c)).unwrap_or_default();
    match class {
        Some(class) if chunk.is_some() => out.push_str(&format!(
            "<td nowrap=\"nowrap\"><span class=\"{class}\">{text}</span></td>"
        )),
        _ => out.push_str(&format!("<td nowrap=\"nowrap\">{text}</td>")),
    }
}

fn wrap_line(line: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    if width == 0 || chars.len() <= width {
        return vec![line.to_string()];
    }
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            ' ' => escaped.push_str("&nbsp;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const OLD: &str = "{\n  \"name\": \"roads\",\n  \"notes\": \"old\",\n  \"title\": \"Roads\"\n}\n";
    const NEW: &str = "{\n  \"name\": \"roads\",\n  \"notes\": \"new\",\n  \"title\": \"Roads\"\n}\n";

    #[test]
    fn test_format_parse() {
        assert_eq!(DiffFormat::parse("unified").unwrap(), DiffFormat::Unified);
        assert_eq!(DiffFormat::parse("html").unwrap(), DiffFormat::Html);
        let err = DiffFormat::parse("side-by-side").unwrap_err();
        assert!(matches!(err, VersionError::Validation(_)));
    }

    #[test]
    fn test_render_json_sorts_keys() {
        let package = json!({"title": "Roads", "extras": {"b": 1, "a": 2}, "name": "roads"});
        let text = render_json(package.as_object().unwrap()).unwrap();
        let extras = text.find("\"extras\"").unwrap();
        let name = text.find("\"name\"").unwrap();
        let title = text.find("\"title\"").unwrap();
        assert!(extras < name && name < title);
        assert!(text.find("\"a\"").unwrap() < text.find("\"b\"").unwrap());
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn test_identical_inputs_render_empty() {
        assert_eq!(render_unified(OLD, OLD, "v1", "v1", 3), "");
        assert_eq!(render_context(OLD, OLD, "v1", "v1", 3), "");
        assert_eq!(render_html(OLD, OLD, "v1", "v1", 3, 70), "");
    }

    #[test]
    fn test_unified() {
        let diff = render_unified(OLD, NEW, "v1", "v2", 3);
        assert_eq!(
            diff,
            "--- v1\n+++ v2\n@@ -1,5 +1,5 @@\n {\n   \"name\": \"roads\",\n\
             -  \"notes\": \"old\",\n+  \"notes\": \"new\",\n   \"title\": \"Roads\"\n }\n"
        );
    }

    #[test]
    fn test_unified_hunk_ranges_with_small_context() {
        let diff = render_unified(OLD, NEW, "v1", "v2", 0);
        assert!(diff.contains("@@ -3 +3 @@\n"));
        assert!(!diff.contains("\"name\""));
    }

    #[test]
    fn test_context() {
        let diff = render_context(OLD, NEW, "v1", "v2", 1);
        assert_eq!(
            diff,
            "*** v1\n--- v2\n***************\n*** 2,4 ****\n\
             \x20   \"name\": \"roads\",\n!   \"notes\": \"old\",\n\x20   \"title\": \"Roads\"\n\
             --- 2,4 ----\n\
             \x20   \"name\": \"roads\",\n!   \"notes\": \"new\",\n\x20   \"title\": \"Roads\"\n"
        );
    }

    #[test]
    fn test_context_pure_insert_omits_old_lines() {
        let old = "a\nb\n";
        let new = "a\nb\nc\n";
        let diff = render_context(old, new, "x", "y", 3);
        assert!(diff.contains("*** 1,2 ****\n--- 1,3 ----\n"));
        assert!(diff.contains("+ c\n"));
    }

    #[test]
    fn test_html_marks_changes_and_escapes() {
        let html = render_html(OLD, NEW, "v1", "<current>", 3, 70);
        assert!(html.starts_with("<table class=\"diff\""));
        assert!(html.contains("&lt;current&gt;"));
        assert!(html.contains("<span class=\"diff_chg\">&nbsp;&nbsp;&quot;notes&quot;:&nbsp;&quot;old&quot;,</span>"));
        assert!(html.contains("<span class=\"diff_chg\">&nbsp;&nbsp;&quot;notes&quot;:&nbsp;&quot;new&quot;,</span>"));
    }

    #[test]
    fn test_html_wraps_long_lines() {
        let long = "x".repeat(25);
        let old = format!("{long}\n");
        let new = "short\n";
        let html = render_html(&old, new, "a", "b", 3, 10);

        assert!(html.contains("<td class=\"diff_header\">1</td><td nowrap=\"nowrap\"><span class=\"diff_chg\">xxxxxxxxxx</span></td>"));
        assert_eq!(html.matches("<td class=\"diff_header\">&gt;</td>").count(), 2);
        assert_eq!(html.matches("<td class=\"diff_header\">></td>").count(), 0);
        assert_eq!(html.matches("<tr>").count(), 4);
    }

    #[test]
    fn test_wrap_line() {
        assert_eq!(wrap_line("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(wrap_line("abc", 4), vec!["abc"]);
        assert_eq!(wrap_line("", 4), vec![""]);
        assert_eq!(wrap_line("abcdef", 0), vec!["abcdef"]);
    }
}
