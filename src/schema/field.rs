//! Typed fields and their value transforms.

use crate::error::{DataError, DataResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Name of the implicit primary field
pub const PRIMARY_FIELD: &str = "id";

/// Named actions and contexts that `fillable`/`hidden` can be scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Read,
    Table,
    Form,
    Submit,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Read => "read",
            Action::Table => "table",
            Action::Form => "form",
            Action::Submit => "submit",
        }
    }
}

/// `true`/`false` for every action, or only the listed actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Toggle {
    All(bool),
    Only(BTreeSet<Action>),
}

impl Toggle {
    pub fn only(actions: impl IntoIterator<Item = Action>) -> Self {
        Toggle::Only(actions.into_iter().collect())
    }

    /// For a set, an unqualified question (`action == None`) answers `unqualified`
    fn answers(&self, action: Option<Action>, unqualified: bool) -> bool {
        match (self, action) {
            (Toggle::All(flag), _) => *flag,
            (Toggle::Only(_), None) => unqualified,
            (Toggle::Only(set), Some(action)) => set.contains(&action),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimaryFormat {
    #[default]
    Integer,
    Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    #[default]
    Date,
    DateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regular expression the whole value must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip)]
    compiled: OnceCell<Regex>,
}

impl PartialEq for TextConfig {
    fn eq(&self, other: &Self) -> bool {
        self.min_length == other.min_length
            && self.max_length == other.max_length
            && self.pattern == other.pattern
    }
}

impl TextConfig {
    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self.compiled = OnceCell::new();
        self
    }

    /// The anchored pattern, compiled on first use
    pub fn regex(&self) -> Result<Option<&Regex>, regex::Error> {
        match &self.pattern {
            Some(pattern) => self
                .compiled
                .get_or_try_init(|| Regex::new(&format!("^(?:{pattern})$")))
                .map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple_of: Option<f64>,
}

impl NumberConfig {
    pub fn minimum(mut self, n: f64) -> Self {
        self.minimum = Some(n);
        self
    }

    pub fn maximum(mut self, n: f64) -> Self {
        self.maximum = Some(n);
        self
    }

    pub fn multiple_of(mut self, n: f64) -> Self {
        self.multiple_of = Some(n);
        self
    }
}

/// What a field stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    Primary {
        #[serde(default)]
        format: PrimaryFormat,
    },
    Text(TextConfig),
    Number(NumberConfig),
    Boolean,
    Date {
        #[serde(default)]
        format: DateFormat,
    },
    #[serde(rename = "enum")]
    Enumeration { options: Vec<String> },
    Json,
    /// Foreign key to `target`'s primary field
    Relation {
        target: String,
        #[serde(default)]
        format: PrimaryFormat,
    },
}

impl From<TextConfig> for FieldKind {
    fn from(config: TextConfig) -> Self {
        FieldKind::Text(config)
    }
}

impl From<NumberConfig> for FieldKind {
    fn from(config: NumberConfig) -> Self {
        FieldKind::Number(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "fillable_default")]
    pub fillable: Toggle,
    #[serde(default = "hidden_default")]
    pub hidden: Toggle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Computed field without a column
    #[serde(default, rename = "virtual")]
    pub virtual_field: bool,
}

fn fillable_default() -> Toggle {
    Toggle::All(true)
}

fn hidden_default() -> Toggle {
    Toggle::All(false)
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            label: None,
            description: None,
            required: false,
            fillable: fillable_default(),
            hidden: hidden_default(),
            default_value: None,
            virtual_field: false,
        }
    }
}

/// Projection context for [`Field::get_value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueContext {
    /// Never null; absent values become `""`
    Form,
    /// Form input back toward the storage domain; `""` becomes null
    Submit,
    /// Display text
    Table,
    Plain,
}

/// Storage column type for DDL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// The primary key column, typed by format
    Primary(PrimaryFormat),
    BigInteger,
    Double,
    Boolean,
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub config: FieldConfig,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: impl Into<FieldKind>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            config: FieldConfig::default(),
        }
    }

    pub fn primary(format: PrimaryFormat) -> Self {
        let mut field = Self::new(PRIMARY_FIELD, FieldKind::Primary { format });
        field.config.required = true;
        field.config.fillable = Toggle::All(false);
        field
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, TextConfig::default())
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, NumberConfig::default())
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Date {
                format: DateFormat::Date,
            },
        )
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Date {
                format: DateFormat::DateTime,
            },
        )
    }

    pub fn enumeration<S: Into<String>>(
        name: impl Into<String>,
        options: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::new(
            name,
            FieldKind::Enumeration {
                options: options.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Json)
    }

    pub fn relation(name: impl Into<String>, target: impl Into<String>, format: PrimaryFormat) -> Self {
        Self::new(
            name,
            FieldKind::Relation {
                target: target.into(),
                format,
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.config.required = true;
        self
    }

    pub fn fillable(mut self, fillable: Toggle) -> Self {
        self.config.fillable = fillable;
        self
    }

    pub fn hidden(mut self, hidden: Toggle) -> Self {
        self.config.hidden = hidden;
        self
    }

    /// Reject definitions that could never accept a value, such as a text
    /// pattern that does not compile
    pub fn validate_definition(&self) -> DataResult<()> {
        if let FieldKind::Text(cfg) = &self.kind {
            self.pattern_regex(cfg)?;
        }
        Ok(())
    }

    fn pattern_regex<'c>(&self, cfg: &'c TextConfig) -> DataResult<Option<&'c Regex>> {
        cfg.regex().map_err(|e| {
            let pattern = cfg.pattern.as_deref().unwrap_or_default();
            self.invalid("pattern", format!("invalid pattern {pattern:?}: {e}"))
        })
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.config.default_value = Some(value.into());
        self
    }

    pub fn virtual_field(mut self) -> Self {
        self.config.virtual_field = true;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = Some(description.into());
        self
    }

    pub fn is_primary(&self) -> bool {
        matches!(self.kind, FieldKind::Primary { .. })
    }

    pub fn is_fillable(&self, action: Option<Action>) -> bool {
        !self.is_primary() && self.config.fillable.answers(action, true)
    }

    pub fn is_hidden(&self, action: Option<Action>) -> bool {
        !self.is_primary() && self.config.hidden.answers(action, false)
    }

    pub fn is_required(&self) -> bool {
        self.is_primary() || self.config.required
    }

    pub fn is_virtual(&self) -> bool {
        self.config.virtual_field
    }

    pub fn has_default(&self) -> bool {
        self.config.default_value.is_some()
    }

    pub fn get_default(&self) -> Option<&Value> {
        self.config.default_value.as_ref()
    }

    /// Pre-generated value for uuid primaries
    pub fn get_new_value(&self) -> Option<Value> {
        match self.kind {
            FieldKind::Primary {
                format: PrimaryFormat::Uuid,
            } => Some(Value::String(uuid::Uuid::new_v4().to_string())),
            _ => None,
        }
    }

    fn invalid(&self, constraint: &str, message: impl Into<String>) -> DataError {
        DataError::validation(&self.name, constraint, message)
    }

    /// Validate and coerce a value right before it is written
    ///
    /// `None` means the key was absent from the input. The result is `None`
    /// when nothing should be written for this field.
    pub fn transform_persist(&self, value: Option<&Value>, action: Action) -> DataResult<Option<Value>> {
        if self.is_primary() {
            return match value {
                Some(v) if !v.is_null() => Err(self.invalid(
                    "primary",
                    "primary key values are generated and cannot be set",
                )),
                _ => Ok(None),
            };
        }
        if self.is_virtual() {
            return Ok(None);
        }

        match value {
            None => match action {
                Action::Create => match self.get_default() {
                    Some(default) => Ok(Some(default.clone())),
                    None if self.is_required() => Err(self.invalid("required", "is required")),
                    None => Ok(None),
                },
                _ => Ok(None),
            },
            Some(Value::Null) if self.is_required() => {
                Err(self.invalid("required", "cannot be null"))
            }
            Some(Value::Null) => Ok(Some(Value::Null)),
            Some(v) => self.validate_value(v).map(Some),
        }
    }

    fn validate_value(&self, value: &Value) -> DataResult<Value> {
        match &self.kind {
            FieldKind::Primary { .. } => Err(self.invalid("primary", "cannot be set")),
            FieldKind::Text(cfg) => {
                let text = value
                    .as_str()
                    .ok_or_else(|| self.invalid("type", "must be a string"))?;
                let len = text.chars().count();
                if let Some(min) = cfg.min_length {
                    if len < min {
                        return Err(self.invalid(
                            "minLength",
                            format!("must be at least {min} characters"),
                        ));
                    }
                }
                if let Some(max) = cfg.max_length {
                    if len > max {
                        return Err(self.invalid(
                            "maxLength",
                            format!("must be at most {max} characters"),
                        ));
                    }
                }
                if let Some(re) = self.pattern_regex(cfg)? {
                    if !re.is_match(text) {
                        let pattern = cfg.pattern.as_deref().unwrap_or_default();
                        return Err(self.invalid("pattern", format!("must match {pattern:?}")));
                    }
                }
                Ok(value.clone())
            }
            FieldKind::Number(cfg) => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| self.invalid("type", "must be a number"))?;
                if let Some(min) = cfg.minimum {
                    if n < min {
                        return Err(self.invalid("minimum", format!("must be at least {min}")));
                    }
                }
                if let Some(max) = cfg.maximum {
                    if n > max {
                        return Err(self.invalid("maximum", format!("must be at most {max}")));
                    }
                }
                if let Some(step) = cfg.multiple_of {
                    let ratio = n / step;
                    if step != 0.0 && (ratio - ratio.round()).abs() > 1e-9 {
                        return Err(self.invalid(
                            "multipleOf",
                            format!("must be a multiple of {step}"),
                        ));
                    }
                }
                Ok(value.clone())
            }
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::Number(n) if n.as_i64() == Some(0) => Ok(Value::Bool(false)),
                Value::Number(n) if n.as_i64() == Some(1) => Ok(Value::Bool(true)),
                _ => Err(self.invalid("type", "must be a boolean")),
            },
            FieldKind::Date { format } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| self.invalid("type", "must be a date string"))?;
                normalize_date(text, *format)
                    .map(Value::String)
                    .ok_or_else(|| self.invalid("format", format!("{text:?} is not a valid date")))
            }
            FieldKind::Enumeration { options } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| self.invalid("type", "must be a string"))?;
                if options.iter().any(|o| o == text) {
                    Ok(value.clone())
                } else {
                    Err(self.invalid("enum", format!("must be one of {}", options.join(", "))))
                }
            }
            FieldKind::Json => Ok(value.clone()),
            FieldKind::Relation { format, .. } => match format {
                PrimaryFormat::Integer => value
                    .as_i64()
                    .map(Value::from)
                    .ok_or_else(|| self.invalid("type", "must be an integer id")),
                PrimaryFormat::Uuid => value
                    .as_str()
                    .filter(|s| uuid::Uuid::parse_str(s).is_ok())
                    .map(|_| value.clone())
                    .ok_or_else(|| self.invalid("format", "must be a uuid")),
            },
        }
    }

    /// Shape a stored value back into the field's logical type
    pub fn transform_retrieve(&self, value: Value) -> Value {
        match (&self.kind, value) {
            (FieldKind::Json, Value::String(text)) => {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            }
            (FieldKind::Boolean, Value::Number(n)) => match n.as_i64() {
                Some(0) => Value::Bool(false),
                Some(1) => Value::Bool(true),
                _ => Value::Number(n),
            },
            // REAL columns hand integral values back as floats
            (FieldKind::Number(_), Value::Number(n)) => match n.as_f64() {
                Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                    Value::from(f as i64)
                }
                _ => Value::Number(n),
            },
            (_, value) => value,
        }
    }

    /// Context-sensitive projection of a raw value
    pub fn get_value(&self, raw: Option<&Value>, context: ValueContext) -> Value {
        let raw = raw.cloned().unwrap_or(Value::Null);
        match context {
            ValueContext::Form => match raw {
                Value::Null => Value::String(String::new()),
                Value::Object(_) | Value::Array(_) if matches!(self.kind, FieldKind::Json) => {
                    Value::String(raw.to_string())
                }
                other => other,
            },
            ValueContext::Submit => self.from_submit(raw),
            ValueContext::Table => match (&self.kind, raw) {
                (_, Value::Null) => Value::Null,
                (FieldKind::Boolean, Value::Bool(b)) => {
                    Value::String(if b { "yes" } else { "no" }.to_string())
                }
                (FieldKind::Json, v) => Value::String(v.to_string()),
                (FieldKind::Date { format: DateFormat::DateTime }, Value::String(s)) => {
                    match parse_datetime(&s) {
                        Some(dt) => Value::String(dt.format("%Y-%m-%d %H:%M").to_string()),
                        None => Value::String(s),
                    }
                }
                (_, v) => v,
            },
            ValueContext::Plain => match (&self.kind, raw) {
                (FieldKind::Date { format }, Value::String(s)) => {
                    Value::String(normalize_date(&s, *format).unwrap_or(s))
                }
                (_, v) => v,
            },
        }
    }

    fn from_submit(&self, raw: Value) -> Value {
        let text = match raw {
            Value::String(s) => s,
            other => return other,
        };
        if text.is_empty() {
            return Value::Null;
        }
        match &self.kind {
            FieldKind::Number(_) => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| text.trim().parse::<f64>().ok().map(Value::from))
                .unwrap_or(Value::String(text)),
            FieldKind::Boolean => {
                Value::Bool(matches!(text.as_str(), "true" | "1" | "on" | "yes"))
            }
            FieldKind::Relation {
                format: PrimaryFormat::Integer,
                ..
            } => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::String(text)),
            FieldKind::Json => serde_json::from_str(&text).unwrap_or(Value::String(text)),
            _ => Value::String(text),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match &self.kind {
            FieldKind::Primary { format } => ColumnType::Primary(*format),
            FieldKind::Relation {
                format: PrimaryFormat::Integer,
                ..
            } => ColumnType::BigInteger,
            FieldKind::Relation {
                format: PrimaryFormat::Uuid,
                ..
            } => ColumnType::Text,
            FieldKind::Number(_) => ColumnType::Double,
            FieldKind::Boolean => ColumnType::Boolean,
            FieldKind::Json => ColumnType::Json,
            FieldKind::Text(_) | FieldKind::Date { .. } | FieldKind::Enumeration { .. } => {
                ColumnType::Text
            }
        }
    }

    /// Convert a logical value into a typed bind value
    pub fn to_db_value(&self, value: &Value) -> DataResult<sea_query::Value> {
        use sea_query::Value as Sv;

        let column = self.column_type();
        if value.is_null() {
            return Ok(match column {
                ColumnType::Primary(PrimaryFormat::Integer) | ColumnType::BigInteger => {
                    Sv::BigInt(None)
                }
                ColumnType::Primary(PrimaryFormat::Uuid) | ColumnType::Text => Sv::String(None),
                ColumnType::Double => Sv::Double(None),
                ColumnType::Boolean => Sv::Bool(None),
                ColumnType::Json => Sv::Json(None),
            });
        }
        match column {
            ColumnType::Json => Ok(Sv::from(value.clone())),
            ColumnType::Primary(PrimaryFormat::Integer) | ColumnType::BigInteger => value
                .as_i64()
                .map(Sv::from)
                .ok_or_else(|| self.invalid("type", "must be an integer")),
            ColumnType::Double => match value.as_i64() {
                Some(i) => Ok(Sv::from(i)),
                None => value
                    .as_f64()
                    .map(Sv::from)
                    .ok_or_else(|| self.invalid("type", "must be a number")),
            },
            ColumnType::Boolean => match value {
                Value::Bool(b) => Ok(Sv::from(*b)),
                Value::Number(n) if n.as_i64() == Some(0) => Ok(Sv::from(false)),
                Value::Number(n) if n.as_i64() == Some(1) => Ok(Sv::from(true)),
                _ => Err(self.invalid("type", "must be a boolean")),
            },
            ColumnType::Primary(PrimaryFormat::Uuid) | ColumnType::Text => match value {
                Value::String(s) => Ok(Sv::from(s.clone())),
                Value::Number(n) => Ok(Sv::from(n.to_string())),
                _ => Err(self.invalid("type", "must be a string")),
            },
        }
    }

    /// JSON schema fragment describing this field
    pub fn schema(&self) -> Value {
        let mut schema = match &self.kind {
            FieldKind::Primary { format } | FieldKind::Relation { format, .. } => match format {
                PrimaryFormat::Integer => json!({"type": "integer"}),
                PrimaryFormat::Uuid => json!({"type": "string", "format": "uuid"}),
            },
            FieldKind::Text(cfg) => {
                let mut s = json!({"type": "string"});
                if let Some(n) = cfg.min_length {
                    s["minLength"] = json!(n);
                }
                if let Some(n) = cfg.max_length {
                    s["maxLength"] = json!(n);
                }
                if let Some(p) = &cfg.pattern {
                    s["pattern"] = json!(p);
                }
                s
            }
            FieldKind::Number(cfg) => {
                let mut s = json!({"type": "number"});
                if let Some(n) = cfg.minimum {
                    s["minimum"] = json!(n);
                }
                if let Some(n) = cfg.maximum {
                    s["maximum"] = json!(n);
                }
                if let Some(n) = cfg.multiple_of {
                    s["multipleOf"] = json!(n);
                }
                s
            }
            FieldKind::Boolean => json!({"type": "boolean"}),
            FieldKind::Date { format } => json!({
                "type": "string",
                "format": match format {
                    DateFormat::Date => "date",
                    DateFormat::DateTime => "date-time",
                },
            }),
            FieldKind::Enumeration { options } => json!({"type": "string", "enum": options}),
            FieldKind::Json => json!({}),
        };
        if let Value::Object(map) = &mut schema {
            if let Some(label) = &self.config.label {
                map.insert("title".into(), json!(label));
            }
            if let Some(description) = &self.config.description {
                map.insert("description".into(), json!(description));
            }
            if let Some(default) = self.get_default() {
                map.insert("default".into(), default.clone());
            }
            map.insert("nullable".into(), json!(!self.is_required()));
        }
        schema
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// ISO form for the format: `YYYY-MM-DD` or RFC 3339 in UTC
fn normalize_date(text: &str, format: DateFormat) -> Option<String> {
    match format {
        DateFormat::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .or_else(|| parse_datetime(text).map(|dt| dt.date_naive()))
            .map(|d| d.format("%Y-%m-%d").to_string()),
        DateFormat::DateTime => parse_datetime(text)
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| naive.and_utc())
            })
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    }
}
