//! Field mapping evaluation.
//!
//! Each destination field is mapped by a template evaluated against the
//! source record. The evaluator sits behind [`FieldMapper`]; the engine only
//! consumes its output through [`FieldResolver`], which turns the raw string
//! into a [`ResolvedValue`] so "clear", "empty" and "not mapped" stay
//! distinguishable.
//!
//! Template syntax understood by [`TemplateMapper`]:
//!
//! ```text
//!   {{.serial}}                         column value
//!   {{index . "Serial Number"}}         column with spaces
//!   {{.name | Upper}}                   Upper, Lower
//!   {{.purchased | epoch}}              unix seconds -> YYYY-MM-DD HH:MM:SS
//!   {{.retired | epoch_clear}}          as epoch, clear sentinel when empty/0
//!   {{.bought | date_conversion "%d/%m/%Y %H:%M"}}
//!   {{.bought | date_conversion_clear "%d/%m/%Y"}}
//! ```

use assetsync_registry::value::{FieldValue, Record};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::error::{SyncError, SyncResult};

/// Mapped value meaning "explicitly unset this field on the destination".
pub const CLEAR_SENTINEL: &str = "__clear__";

/// Mapping that resolves to the configured asset type name.
pub const ASSET_TYPE_MAPPING: &str = "__hbassettype__";

/// Rendering of a missing column.
pub const NO_VALUE: &str = "<no value>";

/// Output format for every normalised date.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}").expect("DATE_RE is a valid regex pattern")
});

/// Evaluates a mapping template against a record.
pub trait FieldMapper: Send + Sync {
    /// Render the template. Never fails; unknown columns render [`NO_VALUE`].
    fn evaluate(&self, template: &str, record: &Record) -> String;

    /// Check that a template can be evaluated.
    fn validate(&self, _template: &str) -> Result<(), String> {
        Ok(())
    }
}

/// Outcome of resolving one mapped field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedValue {
    /// No template configured for the field; nothing is written.
    Unmapped,
    /// Template resolved to nothing; nothing is written.
    Empty,
    /// Template resolved to the clear sentinel; a null marker is written.
    Clear,
    Value(String),
}

/// Resolves mapped fields for one asset type.
#[derive(Clone)]
pub struct FieldResolver {
    mapper: Arc<dyn FieldMapper>,
    asset_type: String,
}

impl FieldResolver {
    #[must_use]
    pub fn new(mapper: Arc<dyn FieldMapper>, asset_type: impl Into<String>) -> Self {
        Self {
            mapper,
            asset_type: asset_type.into(),
        }
    }

    /// Resolve the value for destination field `key`.
    #[must_use]
    pub fn resolve(&self, key: &str, template: &str, record: &Record) -> ResolvedValue {
        if template.is_empty() {
            return ResolvedValue::Unmapped;
        }
        let mut value = if template == ASSET_TYPE_MAPPING {
            self.asset_type.clone()
        } else {
            self.mapper.evaluate(template, record)
        };
        if value == NO_VALUE {
            value.clear();
        }
        if value == CLEAR_SENTINEL {
            return ResolvedValue::Clear;
        }
        if !value.is_empty() && is_date_field(key) {
            value = normalize_date(&value);
        }
        if value.is_empty() {
            ResolvedValue::Empty
        } else {
            ResolvedValue::Value(value)
        }
    }
}

impl std::fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldResolver")
            .field("asset_type", &self.asset_type)
            .finish_non_exhaustive()
    }
}

/// Whether a destination field holds a date that must be normalised.
#[must_use]
pub fn is_date_field(key: &str) -> bool {
    let lower = key.to_lowercase();
    lower.contains("date") || lower == "h_last_logged_on"
}

/// Keep only the first `YYYY-MM-DD HH:MM:SS` substring, or nothing.
#[must_use]
pub fn normalize_date(value: &str) -> String {
    DATE_RE
        .find(value)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Default template evaluator.
#[derive(Debug, Clone, Default)]
pub struct TemplateMapper;

impl TemplateMapper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Parse a template into literal and action segments.
    pub fn compile(template: &str) -> SyncResult<Template> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| SyncError::template(template, "unclosed action"))?;
            segments.push(Segment::Action(parse_action(&after[..end]).map_err(
                |message| SyncError::template(template, message),
            )?));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Template { segments })
    }
}

impl FieldMapper for TemplateMapper {
    fn evaluate(&self, template: &str, record: &Record) -> String {
        match Self::compile(template) {
            Ok(compiled) => compiled.render(record),
            Err(_) => String::new(),
        }
    }

    fn validate(&self, template: &str) -> Result<(), String> {
        Self::compile(template).map(|_| ()).map_err(|e| e.to_string())
    }
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    #[must_use]
    pub fn render(&self, record: &Record) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Action(action) => out.push_str(&action.render(record)),
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Action(Action),
}

#[derive(Debug, Clone, PartialEq)]
struct Action {
    field: String,
    filters: Vec<Filter>,
}

impl Action {
    fn render(&self, record: &Record) -> String {
        let mut value = match record.get(&self.field) {
            None | Some(FieldValue::Null) => NO_VALUE.to_string(),
            Some(v) => v.as_text(),
        };
        for filter in &self.filters {
            value = filter.apply(&value);
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Upper,
    Lower,
    Epoch { clear: bool },
    DateConversion { format: String, clear: bool },
}

impl Filter {
    fn apply(&self, value: &str) -> String {
        match self {
            Filter::Upper => value.to_uppercase(),
            Filter::Lower => value.to_lowercase(),
            Filter::Epoch { clear } => {
                let fallback = if *clear { CLEAR_SENTINEL } else { "" };
                if value.is_empty() || value == "0" {
                    return fallback.to_string();
                }
                value
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map_or_else(
                        || fallback.to_string(),
                        |dt| dt.naive_utc().format(DATE_FORMAT).to_string(),
                    )
            }
            Filter::DateConversion { format, clear } => {
                let fallback = if *clear { CLEAR_SENTINEL } else { "" };
                NaiveDateTime::parse_from_str(value, format)
                    .or_else(|_| {
                        NaiveDate::parse_from_str(value, format)
                            .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
                    })
                    .map_or_else(
                        |_| fallback.to_string(),
                        |dt| dt.format(DATE_FORMAT).to_string(),
                    )
            }
        }
    }
}

fn parse_action(body: &str) -> Result<Action, String> {
    let mut stages = body.split('|').map(str::trim);
    let head = stages.next().unwrap_or_default();
    let field = parse_field(head)?;

    let mut filters = Vec::new();
    for stage in stages {
        filters.push(parse_filter(stage)?);
    }
    Ok(Action { field, filters })
}

fn parse_field(head: &str) -> Result<String, String> {
    if let Some(rest) = head.strip_prefix("index . ") {
        return unquote(rest.trim()).ok_or_else(|| format!("invalid index expression: {head}"));
    }
    match head.strip_prefix('.') {
        Some(name) if !name.is_empty() && !name.contains(char::is_whitespace) => {
            Ok(name.to_string())
        }
        _ => Err(format!("expected a field reference, found '{head}'")),
    }
}

fn parse_filter(stage: &str) -> Result<Filter, String> {
    let (name, arg) = match stage.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim())),
        None => (stage, None),
    };
    let format_arg = || {
        arg.and_then(unquote)
            .ok_or_else(|| format!("{name} needs a quoted format argument"))
    };
    match name {
        "Upper" => Ok(Filter::Upper),
        "Lower" => Ok(Filter::Lower),
        "epoch" => Ok(Filter::Epoch { clear: false }),
        "epoch_clear" => Ok(Filter::Epoch { clear: true }),
        "date_conversion" => Ok(Filter::DateConversion {
            format: format_arg()?,
            clear: false,
        }),
        "date_conversion_clear" => Ok(Filter::DateConversion {
            format: format_arg()?,
            clear: true,
        }),
        other => Err(format!("function \"{other}\" not defined")),
    }
}

fn unquote(s: &str) -> Option<String> {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::to_string)
}
