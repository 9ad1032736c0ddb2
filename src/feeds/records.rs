use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Accepts a JSON number, a numeric string (`"$1,200,000"`), or null.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

pub(crate) fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | ',' | '_' | ' '))
                .collect();
            cleaned.parse::<f64>().ok().filter(|v| !v.is_nan())
        }
        _ => None,
    }
}

/// Strings pass through; numbers and booleans are rendered; anything else
/// is treated as missing.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn year_from_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

/// Years arrive as numbers or as file-stem strings (`"2024"`).
pub(crate) fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(year_from_value))
}

pub(crate) fn lenient_years<'de, D>(deserializer: D) -> Result<Vec<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .iter()
        .filter_map(year_from_value)
        .collect())
}

/// `scam_type` shows up either as a string or as `{ "type": ... }`.
fn scam_type<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Object(map)) => map
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct CveRecord {
    #[serde(default, alias = "cveId")]
    pub cve_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub severity_en: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub score: Option<f64>,
    #[serde(default, rename = "publishedDate")]
    pub published_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub vendor: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub product: Option<String>,
}

impl CveRecord {
    /// English label when present, the raw one otherwise.
    pub fn severity_label(&self) -> Option<&str> {
        self.severity_en
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.severity.as_deref())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LeakRecord {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub references: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EolCycle {
    #[serde(default, deserialize_with = "lenient_text")]
    pub cycle: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub eol: Option<String>,
    #[serde(default, rename = "releaseDate", deserialize_with = "lenient_text")]
    pub release_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub latest: Option<String>,
    #[serde(default, rename = "latestReleaseDate", deserialize_with = "lenient_text")]
    pub latest_release_date: Option<String>,
    #[serde(default)]
    pub lts: Value,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct EolProduct {
    pub product: String,
    #[serde(default)]
    pub versions: Vec<EolCycle>,
}

/// One table row per product release cycle.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EolRow {
    pub product: String,
    pub cycle: Option<String>,
    pub eol: Option<String>,
    pub release_date: Option<String>,
    pub latest: Option<String>,
    pub latest_release_date: Option<String>,
    pub lts: bool,
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Web3Exploit {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub name_categories: Value,
    #[serde(default)]
    pub website_link: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub funds_lost: Option<f64>,
    #[serde(default, deserialize_with = "scam_type")]
    pub scam_type: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub root_cause: Option<String>,
    #[serde(default)]
    pub quick_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub chain: Option<String>,
    #[serde(default)]
    pub token_name: Option<String>,
    #[serde(default)]
    pub token_address: Option<String>,
    #[serde(default)]
    pub proof_link: Option<String>,
}

impl Web3Exploit {
    /// `name_categories` is a list in newer snapshots and a string in older
    /// ones.
    pub fn categories(&self) -> Option<String> {
        match &self.name_categories {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Array(items) => {
                let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                if names.is_empty() {
                    None
                } else {
                    Some(names.join(", "))
                }
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Web3Release {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub release_url: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    #[serde(default)]
    pub release_type: Option<String>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub draft: Option<bool>,
    #[serde(default)]
    pub prerelease: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct NewsItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, rename = "pubDate")]
    pub pub_date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_cve_text_fields_decode_as_missing() {
        let page: Vec<CveRecord> = serde_json::from_str(
            r#"[{"cve_id": "CVE-2024-0001", "description": {"en": "nested"},
                 "vendor": ["acme"], "product": 42, "severity": "HIGH"},
                {"cve_id": "CVE-2024-0002", "description": "plain", "score": 5.0}]"#,
        )
        .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].description, None);
        assert_eq!(page[0].vendor, None);
        assert_eq!(page[0].product.as_deref(), Some("42"));
        assert_eq!(page[0].severity_label(), Some("HIGH"));
        assert_eq!(page[1].description.as_deref(), Some("plain"));
    }

    #[test]
    fn funds_lost_accepts_numbers_and_money_strings() {
        let a: Web3Exploit = serde_json::from_str(r#"{"funds_lost": 1500000}"#).unwrap();
        let b: Web3Exploit = serde_json::from_str(r#"{"funds_lost": "$2,500,000"}"#).unwrap();
        let c: Web3Exploit = serde_json::from_str(r#"{"funds_lost": null}"#).unwrap();
        let d: Web3Exploit = serde_json::from_str(r#"{"funds_lost": "unknown"}"#).unwrap();
        assert_eq!(a.funds_lost, Some(1_500_000.0));
        assert_eq!(b.funds_lost, Some(2_500_000.0));
        assert_eq!(c.funds_lost, None);
        assert_eq!(d.funds_lost, None);
    }

    #[test]
    fn scam_type_accepts_both_shapes() {
        let legacy: Web3Exploit =
            serde_json::from_str(r#"{"scam_type": {"type": "Rugpull"}}"#).unwrap();
        let flat: Web3Exploit = serde_json::from_str(r#"{"scam_type": "Exploit"}"#).unwrap();
        assert_eq!(legacy.scam_type.as_deref(), Some("Rugpull"));
        assert_eq!(flat.scam_type.as_deref(), Some("Exploit"));
    }

    #[test]
    fn cve_fields_and_severity_label() {
        let cve: CveRecord = serde_json::from_str(
            r#"{"cve_id": "CVE-2024-0001", "score": "9.8", "severity": "krytyczna",
                "severity_en": "CRITICAL", "publishedDate": "2024-01-15T10:00:00.000"}"#,
        )
        .unwrap();
        assert_eq!(cve.score, Some(9.8));
        assert_eq!(cve.severity_label(), Some("CRITICAL"));
        assert_eq!(cve.published_date.as_deref(), Some("2024-01-15T10:00:00.000"));
    }

    #[test]
    fn eol_cycle_tolerates_boolean_dates() {
        let product: EolProduct = serde_json::from_str(
            r#"{"product": "nodejs", "versions": [{"cycle": 18, "eol": false, "lts": true}]}"#,
        )
        .unwrap();
        assert_eq!(product.versions[0].cycle.as_deref(), Some("18"));
        assert_eq!(product.versions[0].eol.as_deref(), Some("false"));
    }
}
