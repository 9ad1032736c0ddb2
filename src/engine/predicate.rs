use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::fields::{FieldDescriptor, FieldRegistry, ValueKind};
use super::ConfigurationError;

/// Choice for one categorical column. `All` is a variant rather than a magic
/// string, so a real category literally named "all" still filters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryFilter {
    #[default]
    All,
    Only(String),
}

impl CategoryFilter {
    pub fn only(value: impl Into<String>) -> Self {
        Self::Only(value.into())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Inclusive calendar-day bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_active(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start.map_or(true, |s| day >= s) && self.end.map_or(true, |e| day <= e)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    pub free_text: String,
    pub categorical: BTreeMap<String, CategoryFilter>,
    pub date_range: DateRange,
}

impl FilterState {
    pub fn is_empty(&self) -> bool {
        self.free_text.trim().is_empty()
            && self.categorical.values().all(CategoryFilter::is_all)
            && !self.date_range.is_active()
    }
}

/// Compiled filter. Every active clause must hold; the free-text clause is an
/// OR over the searchable fields.
pub struct Predicate<'a, R> {
    needle: Option<String>,
    search_fields: Vec<&'a FieldDescriptor<R>>,
    categories: Vec<(&'a FieldDescriptor<R>, &'a str)>,
    date: Option<(&'a FieldDescriptor<R>, DateRange)>,
}

pub fn compile<'a, R>(
    filter: &'a FilterState,
    registry: &'a FieldRegistry<R>,
    searchable: &[String],
    date_field: Option<&str>,
) -> Result<Predicate<'a, R>, ConfigurationError> {
    let search_fields = searchable
        .iter()
        .map(|key| registry.get(key))
        .collect::<Result<Vec<_>, _>>()?;

    let needle = filter.free_text.trim();
    let needle = if needle.is_empty() {
        None
    } else {
        Some(needle.to_lowercase())
    };

    let mut categories = Vec::new();
    for (key, choice) in filter.categorical.iter() {
        let field = registry.get(key)?;
        if let CategoryFilter::Only(value) = choice {
            categories.push((field, value.as_str()));
        }
    }

    let date = if filter.date_range.is_active() {
        let key = date_field.ok_or(ConfigurationError::MissingDateField)?;
        let field = registry.get(key)?;
        if field.kind() != ValueKind::Date {
            return Err(ConfigurationError::FieldKindMismatch {
                key: key.to_string(),
                expected: ValueKind::Date.label(),
                actual: field.kind().label(),
            });
        }
        Some((field, filter.date_range))
    } else {
        None
    };

    Ok(Predicate {
        needle,
        search_fields,
        categories,
        date,
    })
}

impl<R> Predicate<'_, R> {
    pub fn matches(&self, record: &R) -> bool {
        if let Some((field, range)) = self.date.as_ref() {
            match field.extract(record).as_datetime() {
                Some(dt) if range.contains(dt.date()) => {}
                _ => return false,
            }
        }

        for (field, expected) in self.categories.iter() {
            match field.extract(record).display() {
                Some(actual) if actual == *expected => {}
                _ => return false,
            }
        }

        if let Some(needle) = self.needle.as_ref() {
            let haystack = self
                .search_fields
                .iter()
                .filter_map(|f| f.extract(record).display())
                .join(" ")
                .to_lowercase();
            if !haystack.contains(needle.as_str()) {
                return false;
            }
        }

        true
    }

    pub fn apply<'r>(&self, records: &'r [R]) -> Vec<&'r R> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}
