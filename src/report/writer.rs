//! Template-based report output.

use std::path::Path;

use chrono::Utc;
use tera::{Context, Tera};

use crate::error::ReportError;

use super::{ReportRecord, ReportWriter};

const MARKDOWN_TEMPLATE: &str = r#"# Benchmarks

Generated by ben on {{ generated_at }}.
{% for record in records %}
## {{ record.runtime_image }} on {{ record.backend_label }}

- command: `{{ record.command }}`
{%- if record.before %}
- before: `{{ record.before }}`
{%- endif %}

```
{{ record.output | trim }}
```
{% endfor %}"#;

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Benchmarks</title>
</head>
<body>
<h1>Benchmarks</h1>
<p>Generated by ben on {{ generated_at }}.</p>
{% for record in records %}
<section>
<h2>{{ record.runtime_image }} on {{ record.backend_label }}</h2>
<p>command: <code>{{ record.command }}</code></p>
{%- if record.before %}
<p>before: <code>{{ record.before }}</code></p>
{%- endif %}
<pre>{{ record.output | trim }}</pre>
</section>
{% endfor %}
</body>
</html>
"#;

/// Output format, picked from the destination extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Markdown,
    Html,
}

impl ReportFormat {
    pub fn for_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("html") | Some("htm") => ReportFormat::Html,
            _ => ReportFormat::Markdown,
        }
    }

    fn template(self) -> &'static str {
        match self {
            ReportFormat::Markdown => MARKDOWN_TEMPLATE,
            ReportFormat::Html => HTML_TEMPLATE,
        }
    }
}

/// Renders the report with tera.
#[derive(Debug, Clone, Default)]
pub struct TemplateReportWriter {
    /// Fixed timestamp; the current time when `None`.
    generated_at: Option<String>,
}

impl TemplateReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timestamp(mut self, generated_at: impl Into<String>) -> Self {
        self.generated_at = Some(generated_at.into());
        self
    }

    pub fn render(
        &self,
        records: &[ReportRecord],
        format: ReportFormat,
    ) -> Result<String, ReportError> {
        let generated_at = self
            .generated_at
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string());

        let mut context = Context::new();
        context.insert("records", records);
        context.insert("generated_at", &generated_at);

        let autoescape = format == ReportFormat::Html;
        Ok(Tera::one_off(format.template(), &context, autoescape)?)
    }
}

impl ReportWriter for TemplateReportWriter {
    fn write(&self, records: &[ReportRecord], dest: &Path) -> Result<(), ReportError> {
        let rendered = self.render(records, ReportFormat::for_path(dest))?;
        std::fs::write(dest, rendered).map_err(|source| ReportError::Write {
            path: dest.display().to_string(),
            source,
        })
    }
}
