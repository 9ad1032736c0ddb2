use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;

use super::dates;
use super::ConfigurationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Number,
    Date,
    Boolean,
    Nullable,
}

impl ValueKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Boolean => "boolean",
            Self::Nullable => "nullable",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single extracted cell. Date fields may hand back raw `Text`; it is
/// resolved lazily through [`dates::parse_date`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
    Bool(bool),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn from_opt_str(value: Option<&str>) -> Self {
        match value {
            Some(v) => Self::Text(v.to_string()),
            None => Self::Null,
        }
    }

    pub fn from_opt_f64(value: Option<f64>) -> Self {
        match value {
            Some(v) if !v.is_nan() => Self::Number(v),
            _ => Self::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String form used for search haystacks and categorical equality.
    pub fn display(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(v) => Some(v.clone()),
            Self::Number(v) => Some(format_number(*v)),
            Self::Date(v) => Some(format_datetime(v)),
            Self::Bool(v) => Some(v.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        let n = match self {
            Self::Number(v) => *v,
            Self::Text(v) => v.trim().parse::<f64>().ok()?,
            Self::Bool(v) => f64::from(u8::from(*v)),
            Self::Null | Self::Date(_) => return None,
        };
        if n.is_nan() {
            None
        } else {
            Some(n)
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Date(v) => Some(*v),
            Self::Text(v) => dates::parse_date(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Text(v) => match v.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn format_datetime(v: &NaiveDateTime) -> String {
    if v.hour() == 0 && v.minute() == 0 && v.second() == 0 {
        v.format("%Y-%m-%d").to_string()
    } else {
        v.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

pub type Accessor<R> = Arc<dyn Fn(&R) -> FieldValue + Send + Sync>;

pub struct FieldDescriptor<R> {
    key: String,
    kind: ValueKind,
    accessor: Accessor<R>,
}

impl<R> Clone for FieldDescriptor<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<R> fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .finish()
    }
}

impl<R> FieldDescriptor<R> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn extract(&self, record: &R) -> FieldValue {
        (self.accessor)(record)
    }
}

/// Column keys to accessors for one view. Lookups of unknown keys fail with
/// [`ConfigurationError::UnknownField`]; keys are known statically per view so
/// this surfaces during setup.
pub struct FieldRegistry<R> {
    fields: Vec<FieldDescriptor<R>>,
    index: HashMap<String, usize>,
}

impl<R> Default for FieldRegistry<R> {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<R> Clone for FieldRegistry<R> {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.clone(),
            index: self.index.clone(),
        }
    }
}

impl<R> fmt::Debug for FieldRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fields.iter()).finish()
    }
}

impl<R> FieldRegistry<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(
        &mut self,
        key: &str,
        kind: ValueKind,
        accessor: F,
    ) -> Result<(), ConfigurationError>
    where
        F: Fn(&R) -> FieldValue + Send + Sync + 'static,
    {
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigurationError::EmptyFieldKey);
        }
        if self.index.contains_key(key) {
            return Err(ConfigurationError::DuplicateField {
                key: key.to_string(),
            });
        }
        self.index.insert(key.to_string(), self.fields.len());
        self.fields.push(FieldDescriptor {
            key: key.to_string(),
            kind,
            accessor: Arc::new(accessor),
        });
        Ok(())
    }

    /// Chaining form of [`FieldRegistry::register`].
    pub fn with<F>(
        mut self,
        key: &str,
        kind: ValueKind,
        accessor: F,
    ) -> Result<Self, ConfigurationError>
    where
        F: Fn(&R) -> FieldValue + Send + Sync + 'static,
    {
        self.register(key, kind, accessor)?;
        Ok(self)
    }

    pub fn get(&self, key: &str) -> Result<&FieldDescriptor<R>, ConfigurationError> {
        self.index
            .get(key)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| ConfigurationError::UnknownField {
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor<R>> {
        self.fields.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
