use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::fields::{FieldDescriptor, FieldRegistry, ValueKind};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Some(Self::Asc),
            "desc" | "descending" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub key: String,
    pub direction: SortDirection,
}

impl SortState {
    pub fn ascending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Column-header click: the active column flips, any other column starts
    /// ascending.
    pub fn toggled(current: Option<&SortState>, key: &str) -> SortState {
        match current {
            Some(active) if active.key == key => SortState {
                key: active.key.clone(),
                direction: active.direction.flipped(),
            },
            _ => SortState::ascending(key),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum SortKey {
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl SortKey {
    fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

fn compare_present(a: &SortKey, b: &SortKey) -> Ordering {
    match (a, b) {
        (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
        (SortKey::Number(a), SortKey::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (SortKey::Bool(a), SortKey::Bool(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

fn compare_keys(a: &SortKey, b: &SortKey, direction: SortDirection) -> Ordering {
    // Nulls go last whichever way the column is sorted.
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => match direction {
            SortDirection::Asc => compare_present(a, b),
            SortDirection::Desc => compare_present(a, b).reverse(),
        },
    }
}

pub struct Comparator<'a, R> {
    field: &'a FieldDescriptor<R>,
    direction: SortDirection,
}

impl<'a, R> Comparator<'a, R> {
    /// `None` when the sort key is not registered; callers keep the original
    /// order in that case.
    pub fn build(state: &SortState, registry: &'a FieldRegistry<R>) -> Option<Self> {
        let field = registry.get(&state.key).ok()?;
        Some(Self {
            field,
            direction: state.direction,
        })
    }

    fn key_for(&self, record: &R) -> SortKey {
        let value = self.field.extract(record);
        let key = match self.field.kind() {
            ValueKind::String | ValueKind::Nullable => {
                value.display().map(|s| SortKey::Text(s.to_lowercase()))
            }
            ValueKind::Number => value.as_number().map(SortKey::Number),
            ValueKind::Date => value
                .as_datetime()
                .map(|dt| SortKey::Number(dt.and_utc().timestamp_millis() as f64)),
            ValueKind::Boolean => value.as_bool().map(SortKey::Bool),
        };
        key.unwrap_or(SortKey::Null)
    }

    pub fn compare(&self, a: &R, b: &R) -> Ordering {
        compare_keys(&self.key_for(a), &self.key_for(b), self.direction)
    }

    /// Stable sort; equal keys keep their incoming order.
    pub fn sort(&self, items: &mut Vec<&R>) {
        let mut keyed: Vec<(SortKey, &R)> = items.iter().map(|r| (self.key_for(r), *r)).collect();
        keyed.sort_by(|(a, _), (b, _)| compare_keys(a, b, self.direction));
        items.clear();
        items.extend(keyed.into_iter().map(|(_, r)| r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fields::FieldValue;

    struct Product {
        name: &'static str,
        released: Option<&'static str>,
    }

    fn registry() -> FieldRegistry<Product> {
        FieldRegistry::new()
            .with("name", ValueKind::String, |r: &Product| FieldValue::text(r.name))
            .unwrap()
            .with("released", ValueKind::Date, |r: &Product| {
                FieldValue::from_opt_str(r.released)
            })
            .unwrap()
    }

    fn sorted<'a>(rows: &'a [Product], state: &SortState, reg: &FieldRegistry<Product>) -> Vec<&'a str> {
        let mut items: Vec<&Product> = rows.iter().collect();
        Comparator::build(state, reg).unwrap().sort(&mut items);
        items.iter().map(|p| p.name).collect()
    }

    #[test]
    fn strings_compare_case_insensitively() {
        let reg = registry();
        let rows = vec![
            Product { name: "nginx", released: None },
            Product { name: "Apache", released: None },
            Product { name: "bind", released: None },
        ];
        assert_eq!(
            sorted(&rows, &SortState::ascending("name"), &reg),
            vec!["Apache", "bind", "nginx"]
        );
    }

    #[test]
    fn unparsable_dates_sort_last_both_ways() {
        let reg = registry();
        let rows = vec![
            Product { name: "a", released: Some("2021-06-01") },
            Product { name: "b", released: Some("unknown") },
            Product { name: "c", released: Some("2023-02-10") },
        ];
        assert_eq!(sorted(&rows, &SortState::ascending("released"), &reg), vec!["a", "c", "b"]);
        assert_eq!(sorted(&rows, &SortState::descending("released"), &reg), vec!["c", "a", "b"]);
    }

    #[test]
    fn unknown_key_builds_no_comparator() {
        let reg = registry();
        assert!(Comparator::build(&SortState::ascending("vendor"), &reg).is_none());
    }

    #[test]
    fn toggle_rules() {
        let first = SortState::toggled(None, "name");
        assert_eq!(first.direction, SortDirection::Asc);
        let second = SortState::toggled(Some(&first), "name");
        assert_eq!(second.direction, SortDirection::Desc);
        let third = SortState::toggled(Some(&second), "released");
        assert_eq!(third, SortState::ascending("released"));
    }
}
