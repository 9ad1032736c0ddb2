use std::collections::BTreeMap;

use colored::{ColoredString, Colorize};
use serde::Serialize;

use crate::engine::{AggregateValue, FieldRegistry, ViewEngine, ViewResult};
use crate::feeds::FeedKind;

const MAX_CELL: usize = 48;
const MAX_COUNTS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" | "table" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

/// Everything about a rendered view that does not come from the engine.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ViewContext {
    pub feed: String,
    pub page_size: usize,
    pub last_updated: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_years: Vec<i32>,
}

impl ViewContext {
    pub fn new(feed: FeedKind, page_size: usize) -> Self {
        Self {
            feed: feed.label().to_string(),
            page_size,
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
struct JsonView<'a, 'r, R> {
    #[serde(flatten)]
    context: &'a ViewContext,
    filtered_count: usize,
    total_records: usize,
    total_pages: usize,
    current_page: usize,
    items: &'a [&'r R],
    aggregates: &'a BTreeMap<String, AggregateValue>,
}

pub fn render_json<R: Serialize>(
    context: &ViewContext,
    result: &ViewResult<'_, R>,
) -> Result<Vec<u8>, String> {
    let view = JsonView {
        context,
        filtered_count: result.filtered_count,
        total_records: result.total_records,
        total_pages: result.total_pages,
        current_page: result.current_page,
        items: &result.page_items,
        aggregates: &result.aggregates,
    };
    let mut out =
        serde_json::to_vec_pretty(&view).map_err(|e| format!("failed to encode view: {e}"))?;
    out.push(b'\n');
    Ok(out)
}

fn paint(text: &str, color: bool, style: fn(&str) -> ColoredString) -> String {
    if color {
        style(text).to_string()
    } else {
        text.to_string()
    }
}

fn truncate(value: &str, max: usize) -> String {
    let flat: String = value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        return flat;
    }
    let kept: String = flat.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn format_scalar(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value:.2}")
    }
}

fn render_aggregate(name: &str, value: &AggregateValue, color: bool, out: &mut String) {
    let label = paint(name, color, |s| s.bold().white());
    match value {
        AggregateValue::Scalar(v) => {
            out.push_str(&format!(":: {label:<16}: {}\n", format_scalar(*v)));
        }
        AggregateValue::Counts(counts) => {
            let shown: Vec<String> = counts
                .iter()
                .take(MAX_COUNTS)
                .map(|c| format!("{} ({})", c.label, c.count))
                .collect();
            let more = counts.len().saturating_sub(MAX_COUNTS);
            let tail = if more > 0 {
                format!(", +{more} more")
            } else {
                String::new()
            };
            out.push_str(&format!(":: {label:<16}: {}{tail}\n", shown.join(", ")));
        }
        AggregateValue::Series(points) => {
            let shown: Vec<String> = points
                .iter()
                .map(|p| format!("{} {}", p.label, format_scalar(p.value)))
                .collect();
            out.push_str(&format!(":: {label:<16}: {}\n", shown.join(" | ")));
        }
    }
}

pub fn render_text<R>(
    context: &ViewContext,
    engine: &ViewEngine<R>,
    result: &ViewResult<'_, R>,
    color: bool,
) -> Vec<u8> {
    let registry = engine.registry();
    let columns = engine.columns();
    let mut out = String::new();

    let title = format!(
        ":: {} :: page {}/{} :: {} matching :: {} total ::",
        context.feed,
        result.current_page,
        result.total_pages,
        result.filtered_count,
        result.total_records
    );
    out.push_str(&paint(&title, color, |s| s.bold().cyan()));
    out.push('\n');
    if let Some(updated) = context.last_updated.as_deref() {
        out.push_str(&format!(":: updated   : {updated}\n"));
    }
    if !context.available_years.is_empty() {
        let years: Vec<String> = context.available_years.iter().map(i32::to_string).collect();
        out.push_str(&format!(":: years     : {}\n", years.join(", ")));
    }
    if let Some(error) = context.error.as_deref() {
        let line = format!(":: error     : {error} (re-run to retry)");
        out.push_str(&paint(&line, color, |s| s.bold().red()));
        out.push('\n');
    }
    out.push('\n');

    let rows: Vec<Vec<String>> = result
        .page_items
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|key| match registry.get(key) {
                    Ok(field) => truncate(&field.extract(record).display().unwrap_or_default(), MAX_CELL),
                    Err(_) => String::new(),
                })
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, key)| {
            rows.iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(key.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .zip(widths.iter())
        .map(|(key, w)| format!("{:<w$}", key.to_uppercase(), w = *w))
        .collect();
    out.push_str(&paint(header.join("  ").trim_end(), color, |s| s.bold().white()));
    out.push('\n');

    if rows.is_empty() {
        out.push_str("(no matching records)\n");
    }
    for row in rows.iter() {
        let cells: Vec<String> = row
            .iter()
            .zip(widths.iter())
            .map(|(cell, w)| format!("{:<w$}", cell, w = *w))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }

    if !result.aggregates.is_empty() {
        out.push('\n');
        for (name, value) in result.aggregates.iter() {
            render_aggregate(name, value, color, &mut out);
        }
    }
    out.into_bytes()
}

pub fn render_fields<R>(feed: FeedKind, registry: &FieldRegistry<R>) -> String {
    let mut out = format!(":: fields for {feed} ::\n");
    let width = registry.keys().map(str::len).max().unwrap_or(0);
    for field in registry.fields() {
        out.push_str(&format!("  {:<width$}  {}\n", field.key(), field.kind(), width = width));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AggregateSpec, FieldValue, PaginationMode, ValueKind, ViewConfig};

    #[derive(Serialize)]
    struct Row {
        name: &'static str,
        lost: f64,
    }

    fn engine() -> ViewEngine<Row> {
        let registry = FieldRegistry::new()
            .with("name", ValueKind::String, |r: &Row| FieldValue::text(r.name))
            .unwrap()
            .with("lost", ValueKind::Number, |r: &Row| FieldValue::Number(r.lost))
            .unwrap();
        ViewEngine::new(
            ViewConfig::new(registry)
                .searchable(["name"])
                .aggregate("total", AggregateSpec::sum("lost")),
        )
        .unwrap()
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "bridge", lost: 1500.0 },
            Row { name: "a-very-long-project-name-that-keeps-going-and-going-forever", lost: 2.5 },
        ]
    }

    #[test]
    fn text_table_has_header_rows_and_totals() {
        let engine = engine();
        let data = rows();
        let state = engine.initial_state();
        let result = engine.recompute(&data, &state, &PaginationMode::Local).unwrap();
        let ctx = ViewContext::new(FeedKind::Web3Exploits, 20);
        let text = String::from_utf8(render_text(&ctx, &engine, &result, false)).unwrap();
        assert!(text.starts_with(":: web3-exploits :: page 1/1 :: 2 matching :: 2 total ::"));
        assert!(text.contains("NAME"));
        assert!(text.contains("bridge"));
        assert!(text.contains("..."));
        assert!(text.contains("1502.50"));
    }

    #[test]
    fn json_view_flattens_context() {
        let engine = engine();
        let data = rows();
        let result = engine
            .recompute(&data, &engine.initial_state(), &PaginationMode::Local)
            .unwrap();
        let ctx = ViewContext::new(FeedKind::Web3Exploits, 20);
        let bytes = render_json(&ctx, &result).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["feed"], "web3-exploits");
        assert_eq!(value["filtered_count"], 2);
        assert_eq!(value["items"][0]["name"], "bridge");
        assert_eq!(value["aggregates"]["total"]["kind"], "scalar");
    }

    #[test]
    fn formats_parse_and_infer() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("xml"), None);
        assert_eq!(infer_format_from_path("out.json"), Some(OutputFormat::Json));
        assert_eq!(infer_format_from_path("out.csv"), None);
    }
}
