//! Static HTML report for a session document.
//!
//! Session metadata is HTML-escaped by the template; iteration content is
//! treated as Markdown and inserted as rendered HTML.

use std::path::Path;

use chrono::NaiveDateTime;
use minijinja::{context, Environment, Value};
use pulldown_cmark::{html, Options, Parser};

use crate::types::Session;
use crate::{Error, Result};

/// File name used when no output path is given.
pub const DEFAULT_REPORT_NAME: &str = "analysis_report.html";

const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Claude Long Analysis Report</title>
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.1.3/dist/css/bootstrap.min.css" rel="stylesheet">
    <style>
        body { padding: 2rem; }
        .analysis-section { margin-bottom: 2rem; }
        .iteration {
            background-color: #f8f9fa;
            padding: 1rem;
            margin-bottom: 1rem;
            border-radius: 0.25rem;
        }
        .iteration.prompt-update { border-left: 4px solid #0d6efd; }
        .timestamp { color: #6c757d; font-size: 0.875rem; }
        pre { background-color: #f8f9fa; padding: 1rem; border-radius: 0.25rem; }
        .readme-section { margin-top: 3rem; padding-top: 2rem; border-top: 1px solid #dee2e6; }
    </style>
</head>
<body>
    <div class="container">
        <h1 class="mb-4">Claude Long Analysis Report</h1>

        <div class="analysis-section">
            <h2>Analysis Details</h2>
            <p><strong>Session ID:</strong> {{ session_id }}</p>
            <p><strong>Start Time:</strong> {{ start_time }}</p>
            <p><strong>Status:</strong> {{ status }}</p>
            <p><strong>Task:</strong> {{ task }}</p>

            <h3 class="mt-4">Analysis Iterations</h3>
            {%- for it in iterations %}
            <div class="iteration{% if it.kind == "system_prompt_update" %} prompt-update{% endif %}">
                <div class="timestamp mb-2">{{ it.timestamp }}</div>
                <div class="content">
                    {{ it.html }}
                </div>
            </div>
            {%- endfor %}
        </div>

        <div class="readme-section">
            <div class="project-description">
                <h2>About Claude Long Analysis Platform</h2>
                <p>This platform enables extended AI analysis sessions using Claude, featuring:</p>
                <ul>
                    <li>Long-running analysis capabilities with iterative thinking</li>
                    <li>Real-time progress tracking and session management</li>
                    <li>Dynamic system prompts for steering analysis direction</li>
                    <li>HTTP API backend with file-based session storage</li>
                    <li>Automatic rate limiting and persistent storage</li>
                </ul>
            </div>
        </div>
    </div>

    <script src="https://cdn.jsdelivr.net/npm/bootstrap@5.1.3/dist/js/bootstrap.bundle.min.js"></script>
</body>
</html>
"#;

/// Render Markdown to an HTML fragment.
pub fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn display_time(ts: &NaiveDateTime) -> String {
    ts.format(DISPLAY_TIME_FORMAT).to_string()
}

/// Render the full HTML page for `session`.
pub fn render_report(session: &Session) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("report.html", REPORT_TEMPLATE)
        .map_err(|e| Error::Report(format!("invalid report template: {e}")))?;
    let template = env
        .get_template("report.html")
        .map_err(|e| Error::Report(e.to_string()))?;

    let iterations: Vec<Value> = session
        .iterations
        .iter()
        .map(|it| {
            context! {
                timestamp => display_time(&it.timestamp),
                kind => it.kind.as_str(),
                html => Value::from_safe_string(markdown_to_html(&it.content)),
            }
        })
        .collect();

    template
        .render(context! {
            session_id => session.session_id,
            start_time => display_time(&session.start_time),
            status => session.status,
            task => session.task,
            iterations => iterations,
        })
        .map_err(|e| Error::Report(format!("failed to render report: {e}")))
}

/// Read a session document from `json_path` and write its report to `output_path`.
pub fn write_report(json_path: &Path, output_path: &Path) -> Result<Session> {
    let content = std::fs::read_to_string(json_path)?;
    let session: Session = serde_json::from_str(&content)?;
    let html = render_report(&session)?;
    std::fs::write(output_path, html)?;

    tracing::info!(
        session_id = %session.session_id,
        output = %output_path.display(),
        iterations = session.iterations.len(),
        "Wrote report"
    );
    Ok(session)
}
