//! Timeline export formatting.
//!
//! # Responsibility
//! - Render day buckets as plain text or a standalone HTML document.
//! - Write rendered output to a file.
//!
//! # Invariants
//! - Output depends only on the buckets and the format.
//! - One date header per non-empty bucket, entries in bucket order.
//! - Empty input renders `NO_MEMOS_MARKER` instead of an empty document.
//! - Markup entries carry their owning record id; text entries do not.

use crate::model::timeline::DateBucket;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

/// Shown when the selection contains no memo.
pub const NO_MEMOS_MARKER: &str = "(No memo recorded for this filter.)";

const MARKUP_STYLE: &str = "<style>
body { font-family: -apple-system, BlinkMacSystemFont, \"Segoe UI\", sans-serif; background-color: #f5f7fb; padding: 16px; }
.memo-date { background-color: #e8efff; color: #1e3a8a; padding: 4px 10px; border-radius: 8px; margin-top: 16px; margin-bottom: 4px; display: inline-block; font-weight: bold; }
.memo-list { list-style-type: disc; margin: 4px 0 0 24px; padding: 0; }
.memo-item { margin: 2px 0; line-height: 1.4; }
</style>";

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Date headers followed by `  - text` lines.
    #[default]
    Text,
    /// Standalone HTML document.
    Markup,
}

impl ExportFormat {
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Markup => "html",
        }
    }
}

#[derive(Debug)]
pub enum ExportError {
    Io(std::io::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to write export: {err}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for ExportError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Renders buckets in the requested format.
pub fn render(buckets: &[DateBucket], format: ExportFormat) -> String {
    match format {
        ExportFormat::Text => render_text(buckets),
        ExportFormat::Markup => render_markup(buckets),
    }
}

/// Renders and writes buckets to `path` as UTF-8.
pub fn export_to_path(
    buckets: &[DateBucket],
    format: ExportFormat,
    path: impl AsRef<Path>,
) -> Result<(), ExportError> {
    let path = path.as_ref();
    let body = render(buckets, format);
    std::fs::write(path, body).map_err(|err| {
        error!(
            "event=export_write module=export status=error format={format:?} path={} error={err}",
            path.display()
        );
        ExportError::Io(err)
    })?;
    info!(
        "event=export_write module=export status=ok format={format:?} days={} path={}",
        non_empty(buckets).count(),
        path.display()
    );
    Ok(())
}

fn non_empty(buckets: &[DateBucket]) -> impl Iterator<Item = &DateBucket> {
    buckets.iter().filter(|bucket| !bucket.entries.is_empty())
}

fn render_text(buckets: &[DateBucket]) -> String {
    let mut lines: Vec<String> = Vec::new();
    for bucket in non_empty(buckets) {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push(bucket.date.format("%Y-%m-%d").to_string());
        for entry in &bucket.entries {
            lines.push(format!("  - {}", entry.memo.text));
        }
    }
    if lines.is_empty() {
        return NO_MEMOS_MARKER.to_string();
    }
    lines.join("\n")
}

fn render_markup(buckets: &[DateBucket]) -> String {
    let mut lines: Vec<String> = vec![
        "<!DOCTYPE html>".to_string(),
        "<html lang='en'>".to_string(),
        "<head>".to_string(),
        "<meta charset='utf-8'>".to_string(),
        "<title>Memo Timeline</title>".to_string(),
        MARKUP_STYLE.to_string(),
        "</head>".to_string(),
        "<body>".to_string(),
    ];

    let mut rendered_any = false;
    for bucket in non_empty(buckets) {
        rendered_any = true;
        lines.push(format!(
            "<div class='memo-date'>{}</div>",
            bucket.date.format("%Y-%m-%d")
        ));
        lines.push("<ul class='memo-list'>".to_string());
        for entry in &bucket.entries {
            let title = entry
                .context
                .as_ref()
                .and_then(|context| context.snippet.as_deref())
                .map(|snippet| format!(" title='{}'", escape_html(snippet)))
                .unwrap_or_default();
            lines.push(format!(
                "<li class='memo-item' data-record-id='{}' data-memo-id='{}'{title}>{}</li>",
                entry.record_id,
                escape_html(entry.memo.id.as_str()),
                escape_html(&entry.memo.text)
            ));
        }
        lines.push("</ul>".to_string());
    }
    if !rendered_any {
        lines.push(format!(
            "<p class='memo-empty'>{}</p>",
            escape_html(NO_MEMOS_MARKER)
        ));
    }

    lines.push("</body>".to_string());
    lines.push("</html>".to_string());
    lines.join("\n")
}

/// Escapes text for HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
