use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::dates;
use super::fields::{FieldRegistry, ValueKind};
use super::ConfigurationError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AggregateSpec {
    Count,
    CountBy {
        field: String,
    },
    Sum {
        field: String,
    },
    Average {
        field: String,
    },
    /// Monthly buckets over `date_field`; counts records unless a value
    /// field is given, in which case it sums that field.
    MonthlySeries {
        date_field: String,
        value_field: Option<String>,
    },
}

impl AggregateSpec {
    pub fn count_by(field: &str) -> Self {
        Self::CountBy {
            field: field.to_string(),
        }
    }

    pub fn sum(field: &str) -> Self {
        Self::Sum {
            field: field.to_string(),
        }
    }

    pub fn average(field: &str) -> Self {
        Self::Average {
            field: field.to_string(),
        }
    }

    pub fn monthly(date_field: &str, value_field: Option<&str>) -> Self {
        Self::MonthlySeries {
            date_field: date_field.to_string(),
            value_field: value_field.map(str::to_string),
        }
    }

    pub(crate) fn validate<R>(&self, registry: &FieldRegistry<R>) -> Result<(), ConfigurationError> {
        match self {
            Self::Count => Ok(()),
            Self::CountBy { field } => registry.get(field).map(|_| ()),
            Self::Sum { field } | Self::Average { field } => {
                expect_kind(registry, field, ValueKind::Number)
            }
            Self::MonthlySeries {
                date_field,
                value_field,
            } => {
                expect_kind(registry, date_field, ValueKind::Date)?;
                match value_field {
                    Some(v) => expect_kind(registry, v, ValueKind::Number),
                    None => Ok(()),
                }
            }
        }
    }
}

fn expect_kind<R>(
    registry: &FieldRegistry<R>,
    key: &str,
    expected: ValueKind,
) -> Result<(), ConfigurationError> {
    let field = registry.get(key)?;
    if field.kind() != expected {
        return Err(ConfigurationError::FieldKindMismatch {
            key: key.to_string(),
            expected: expected.label(),
            actual: field.kind().label(),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub year: i32,
    pub month: u32,
    pub value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AggregateValue {
    Scalar(f64),
    Counts(Vec<CategoryCount>),
    Series(Vec<SeriesPoint>),
}

impl AggregateValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_counts(&self) -> Option<&[CategoryCount]> {
        match self {
            Self::Counts(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&[SeriesPoint]> {
        match self {
            Self::Series(v) => Some(v),
            _ => None,
        }
    }
}

/// Reduces the filtered (not paginated) records.
pub fn compute<R>(
    spec: &AggregateSpec,
    registry: &FieldRegistry<R>,
    records: &[&R],
) -> Result<AggregateValue, ConfigurationError> {
    let value = match spec {
        AggregateSpec::Count => AggregateValue::Scalar(records.len() as f64),
        AggregateSpec::CountBy { field } => {
            let field = registry.get(field)?;
            let mut counts: HashMap<String, usize> = HashMap::new();
            for r in records {
                if let Some(label) = field.extract(r).display() {
                    *counts.entry(label).or_default() += 1;
                }
            }
            let mut counts: Vec<CategoryCount> = counts
                .into_iter()
                .map(|(label, count)| CategoryCount { label, count })
                .collect();
            counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
            AggregateValue::Counts(counts)
        }
        AggregateSpec::Sum { field } => {
            let field = registry.get(field)?;
            let sum = records
                .iter()
                .filter_map(|r| field.extract(r).as_number())
                .sum::<f64>();
            AggregateValue::Scalar(sum)
        }
        AggregateSpec::Average { field } => {
            let field = registry.get(field)?;
            let (sum, count) = records
                .iter()
                .filter_map(|r| field.extract(r).as_number())
                .fold((0.0_f64, 0_usize), |(s, c), v| (s + v, c + 1));
            let avg = if count == 0 { 0.0 } else { sum / count as f64 };
            AggregateValue::Scalar(avg)
        }
        AggregateSpec::MonthlySeries {
            date_field,
            value_field,
        } => {
            let date_field = registry.get(date_field)?;
            let value_field = match value_field {
                Some(key) => Some(registry.get(key)?),
                None => None,
            };
            // BTreeMap keyed by (year, month) keeps buckets chronological.
            let mut buckets: BTreeMap<(i32, u32), f64> = BTreeMap::new();
            for r in records {
                let Some(dt) = date_field.extract(r).as_datetime() else {
                    continue;
                };
                let amount = match value_field {
                    Some(f) => f.extract(r).as_number().unwrap_or(0.0),
                    None => 1.0,
                };
                *buckets.entry(dates::month_key(&dt)).or_default() += amount;
            }
            AggregateValue::Series(
                buckets
                    .into_iter()
                    .map(|((year, month), value)| SeriesPoint {
                        label: dates::month_label(year, month),
                        year,
                        month,
                        value,
                    })
                    .collect(),
            )
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fields::FieldValue;

    struct Exploit {
        chain: Option<&'static str>,
        lost: Option<f64>,
        date: &'static str,
    }

    fn registry() -> FieldRegistry<Exploit> {
        FieldRegistry::new()
            .with("chain", ValueKind::Nullable, |r: &Exploit| FieldValue::from_opt_str(r.chain))
            .unwrap()
            .with("lost", ValueKind::Number, |r: &Exploit| FieldValue::from_opt_f64(r.lost))
            .unwrap()
            .with("date", ValueKind::Date, |r: &Exploit| FieldValue::text(r.date))
            .unwrap()
    }

    fn rows() -> Vec<Exploit> {
        vec![
            Exploit { chain: Some("ETH"), lost: Some(100.0), date: "2024-01-15" },
            Exploit { chain: Some("BSC"), lost: None, date: "2023-12-01" },
            Exploit { chain: Some("ETH"), lost: Some(50.0), date: "2024-01-02" },
            Exploit { chain: None, lost: Some(10.0), date: "?" },
        ]
    }

    #[test]
    fn average_skips_nulls_and_handles_empty() {
        let reg = registry();
        let data = rows();
        let refs: Vec<&Exploit> = data.iter().collect();
        let avg = compute(&AggregateSpec::average("lost"), &reg, &refs).unwrap();
        assert_eq!(avg.as_scalar(), Some(160.0 / 3.0));
        let none = compute(&AggregateSpec::average("lost"), &reg, &[]).unwrap();
        assert_eq!(none.as_scalar(), Some(0.0));
    }

    #[test]
    fn count_by_orders_by_count_then_label() {
        let reg = registry();
        let data = rows();
        let refs: Vec<&Exploit> = data.iter().collect();
        let counts = compute(&AggregateSpec::count_by("chain"), &reg, &refs).unwrap();
        let counts = counts.as_counts().unwrap();
        assert_eq!(counts[0], CategoryCount { label: "ETH".to_string(), count: 2 });
        assert_eq!(counts[1], CategoryCount { label: "BSC".to_string(), count: 1 });
        assert_eq!(counts.len(), 2);
    }

    #[test]
    fn monthly_sum_skips_undated_and_zero_fills_nulls() {
        let reg = registry();
        let data = rows();
        let refs: Vec<&Exploit> = data.iter().collect();
        let series = compute(&AggregateSpec::monthly("date", Some("lost")), &reg, &refs).unwrap();
        let series = series.as_series().unwrap();
        let labels: Vec<_> = series.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["Dec 2023", "Jan 2024"]);
        assert_eq!(series[0].value, 0.0);
        assert_eq!(series[1].value, 150.0);
    }

    #[test]
    fn sum_requires_a_number_field() {
        let reg = registry();
        assert!(matches!(
            AggregateSpec::sum("chain").validate(&reg),
            Err(ConfigurationError::FieldKindMismatch { .. })
        ));
        assert!(AggregateSpec::monthly("date", None).validate(&reg).is_ok());
    }
}
