//! Built-in brace template syntax.
//!
//! | Tag                      | Output                                         |
//! |--------------------------|------------------------------------------------|
//! | `{{ a.b }}`              | value at `a.b`, HTML-escaped                   |
//! | `{{{ a.b }}}`            | value at `a.b`, raw                            |
//! | `{{ . }}`                | the whole render data                          |
//! | `{{@body}}`              | body slot: the content this template wraps     |
//! | `{{> page/name }}`       | include another page                           |
//! | `{{> page/name key }}`   | include, passing the value at `key` as data    |
//!
//! Missing values render as empty strings. Objects and arrays render as JSON.

use super::{RenderHost, Template, TemplateCompiler, TemplateError};
use crate::compiler::render::RenderError;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

static RE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\{\s*(.*?)\s*\}\}\}|\{\{\s*(.*?)\s*\}\}").unwrap());

static RE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\.|[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*)$").unwrap());

#[derive(Debug, Default, Clone, Copy)]
pub struct BraceCompiler;

impl TemplateCompiler for BraceCompiler {
    fn compile(&self, page: &str, source: &str) -> Result<Arc<dyn Template>, TemplateError> {
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in RE_TAG.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            last = whole.end();

            let fail = |message: String| TemplateError {
                page: page.to_string(),
                line: line_of(source, whole.start()),
                message,
            };

            let segment = match (caps.get(1), caps.get(2)) {
                (Some(raw), _) => Segment::Value {
                    path: parse_path(raw.as_str()).map_err(fail)?,
                    raw: true,
                },
                (None, Some(tag)) => parse_tag(tag.as_str()).map_err(fail)?,
                (None, None) => continue,
            };
            segments.push(segment);
        }

        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }

        Ok(Arc::new(BraceTemplate { segments }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Value { path: Vec<String>, raw: bool },
    Body,
    Include { page: String, key: Option<Vec<String>> },
}

#[derive(Debug)]
struct BraceTemplate {
    segments: Vec<Segment>,
}

impl Template for BraceTemplate {
    fn render(&self, data: &Value, host: &mut dyn RenderHost) -> Result<String, RenderError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Value { path, raw } => {
                    let text = lookup(data, path).map(stringify).unwrap_or_default();
                    if *raw {
                        out.push_str(&text);
                    } else {
                        out.push_str(&escape_html(&text));
                    }
                }
                Segment::Body => out.push_str(&host.body()?),
                Segment::Include { page, key } => {
                    let include_data = key.as_ref().and_then(|key| lookup(data, key));
                    out.push_str(&host.include(page, include_data)?);
                }
            }
        }
        Ok(out)
    }
}

fn parse_tag(tag: &str) -> Result<Segment, String> {
    if let Some(directive) = tag.strip_prefix('@') {
        return match directive.trim() {
            "body" => Ok(Segment::Body),
            other => Err(format!("unknown directive `@{other}`")),
        };
    }

    if let Some(include) = tag.strip_prefix('>') {
        let mut parts = include.split_whitespace();
        let page = parts.next().ok_or("include without a page name")?;
        let key = parts.next().map(parse_path).transpose()?;
        if parts.next().is_some() {
            return Err(format!("unexpected tokens in include `{tag}`"));
        }
        return Ok(Segment::Include {
            page: page.trim_matches('/').to_string(),
            key,
        });
    }

    Ok(Segment::Value {
        path: parse_path(tag)?,
        raw: false,
    })
}

fn parse_path(expr: &str) -> Result<Vec<String>, String> {
    if !RE_PATH.is_match(expr) {
        return Err(format!("invalid expression `{expr}`"));
    }
    if expr == "." {
        return Ok(Vec::new());
    }
    Ok(expr.split('.').map(str::to_string).collect())
}

fn lookup<'a>(data: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(data, |value, key| match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 1-based line number of a byte offset.
fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}
