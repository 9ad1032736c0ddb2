//! Preconfigured views, one per dashboard page.

use crate::engine::{
    AggregateSpec, ConfigurationError, FieldRegistry, FieldValue, SortState, ValueKind, ViewConfig,
};
use crate::feeds::records::{CveRecord, EolRow, LeakRecord, NewsItem, Web3Exploit, Web3Release};

fn opt(value: &Option<String>) -> FieldValue {
    FieldValue::from_opt_str(value.as_deref())
}

fn opt_bool(value: Option<bool>) -> FieldValue {
    value.map_or(FieldValue::Null, FieldValue::Bool)
}

pub fn cve_view() -> Result<ViewConfig<CveRecord>, ConfigurationError> {
    let registry = FieldRegistry::new()
        .with("cve_id", ValueKind::String, |r: &CveRecord| opt(&r.cve_id))?
        .with("severity", ValueKind::Nullable, |r: &CveRecord| {
            FieldValue::from_opt_str(r.severity_label())
        })?
        .with("score", ValueKind::Number, |r: &CveRecord| FieldValue::from_opt_f64(r.score))?
        .with("published", ValueKind::Date, |r: &CveRecord| opt(&r.published_date))?
        .with("vendor", ValueKind::Nullable, |r: &CveRecord| opt(&r.vendor))?
        .with("product", ValueKind::Nullable, |r: &CveRecord| opt(&r.product))?
        .with("description", ValueKind::Nullable, |r: &CveRecord| opt(&r.description))?;
    Ok(ViewConfig::new(registry)
        .searchable(["cve_id", "description", "vendor", "product"])
        .columns(["cve_id", "severity", "score", "published", "vendor", "product"])
        .date_field("published")
        .aggregate("count", AggregateSpec::Count)
        .aggregate("by_severity", AggregateSpec::count_by("severity"))
        .aggregate("average_score", AggregateSpec::average("score"))
        .aggregate("per_month", AggregateSpec::monthly("published", None))
        .default_sort(SortState::descending("published")))
}

pub fn leak_view() -> Result<ViewConfig<LeakRecord>, ConfigurationError> {
    let registry = FieldRegistry::new()
        .with("date", ValueKind::Date, |r: &LeakRecord| opt(&r.date))?
        .with("domain", ValueKind::Nullable, |r: &LeakRecord| opt(&r.domain))?
        .with("title", ValueKind::Nullable, |r: &LeakRecord| opt(&r.title))?
        .with("category", ValueKind::Nullable, |r: &LeakRecord| opt(&r.category))?
        .with("country", ValueKind::Nullable, |r: &LeakRecord| opt(&r.country))?
        .with("description", ValueKind::Nullable, |r: &LeakRecord| opt(&r.description))?
        .with("references", ValueKind::Number, |r: &LeakRecord| {
            FieldValue::Number(r.references.as_ref().map_or(0, Vec::len) as f64)
        })?;
    Ok(ViewConfig::new(registry)
        .searchable(["domain", "title", "description", "category"])
        .columns(["date", "domain", "title", "category", "country"])
        .date_field("date")
        .aggregate("count", AggregateSpec::Count)
        .aggregate("by_category", AggregateSpec::count_by("category"))
        .aggregate("by_country", AggregateSpec::count_by("country"))
        .aggregate("per_month", AggregateSpec::monthly("date", None))
        .default_sort(SortState::descending("date")))
}

pub fn eol_view() -> Result<ViewConfig<EolRow>, ConfigurationError> {
    let registry = FieldRegistry::new()
        .with("product", ValueKind::String, |r: &EolRow| FieldValue::text(r.product.as_str()))?
        .with("cycle", ValueKind::Nullable, |r: &EolRow| opt(&r.cycle))?
        .with("status", ValueKind::Nullable, |r: &EolRow| opt(&r.status))?
        .with("eol", ValueKind::Date, |r: &EolRow| opt(&r.eol))?
        .with("release_date", ValueKind::Date, |r: &EolRow| opt(&r.release_date))?
        .with("latest", ValueKind::Nullable, |r: &EolRow| opt(&r.latest))?
        .with("latest_release_date", ValueKind::Date, |r: &EolRow| {
            opt(&r.latest_release_date)
        })?
        .with("lts", ValueKind::Boolean, |r: &EolRow| FieldValue::Bool(r.lts))?;
    Ok(ViewConfig::new(registry)
        .searchable(["product", "cycle", "latest"])
        .columns(["product", "cycle", "status", "eol", "latest", "lts"])
        .date_field("eol")
        .aggregate("count", AggregateSpec::Count)
        .aggregate("by_status", AggregateSpec::count_by("status"))
        .aggregate("by_product", AggregateSpec::count_by("product"))
        .default_sort(SortState::ascending("eol")))
}

pub fn web3_exploit_view() -> Result<ViewConfig<Web3Exploit>, ConfigurationError> {
    let registry = FieldRegistry::new()
        .with("date", ValueKind::Date, |r: &Web3Exploit| opt(&r.date))?
        .with("project", ValueKind::Nullable, |r: &Web3Exploit| opt(&r.project_name))?
        .with("chain", ValueKind::Nullable, |r: &Web3Exploit| opt(&r.chain))?
        .with("scam_type", ValueKind::Nullable, |r: &Web3Exploit| opt(&r.scam_type))?
        .with("funds_lost", ValueKind::Number, |r: &Web3Exploit| {
            FieldValue::from_opt_f64(r.funds_lost)
        })?
        .with("categories", ValueKind::Nullable, |r: &Web3Exploit| {
            FieldValue::from_opt_str(r.categories().as_deref())
        })?
        .with("root_cause", ValueKind::Nullable, |r: &Web3Exploit| opt(&r.root_cause))?
        .with("summary", ValueKind::Nullable, |r: &Web3Exploit| opt(&r.quick_summary))?
        .with("token", ValueKind::Nullable, |r: &Web3Exploit| opt(&r.token_name))?;
    Ok(ViewConfig::new(registry)
        .searchable(["project", "chain", "categories", "root_cause", "summary", "token"])
        .columns(["date", "project", "chain", "scam_type", "funds_lost"])
        .date_field("date")
        .aggregate("count", AggregateSpec::Count)
        .aggregate("total_lost", AggregateSpec::sum("funds_lost"))
        .aggregate("average_lost", AggregateSpec::average("funds_lost"))
        .aggregate("by_scam_type", AggregateSpec::count_by("scam_type"))
        .aggregate("by_chain", AggregateSpec::count_by("chain"))
        .aggregate("monthly_losses", AggregateSpec::monthly("date", Some("funds_lost")))
        .default_sort(SortState::descending("date")))
}

pub fn web3_release_view() -> Result<ViewConfig<Web3Release>, ConfigurationError> {
    let registry = FieldRegistry::new()
        .with("created_at", ValueKind::Date, |r: &Web3Release| opt(&r.created_at))?
        .with("framework", ValueKind::Nullable, |r: &Web3Release| opt(&r.framework))?
        .with("name", ValueKind::Nullable, |r: &Web3Release| opt(&r.name))?
        .with("tag", ValueKind::Nullable, |r: &Web3Release| opt(&r.tag_name))?
        .with("release_type", ValueKind::Nullable, |r: &Web3Release| opt(&r.release_type))?
        .with("author", ValueKind::Nullable, |r: &Web3Release| opt(&r.author))?
        .with("prerelease", ValueKind::Boolean, |r: &Web3Release| opt_bool(r.prerelease))?
        .with("url", ValueKind::Nullable, |r: &Web3Release| opt(&r.release_url))?;
    Ok(ViewConfig::new(registry)
        .searchable(["framework", "name", "tag", "author"])
        .columns(["created_at", "framework", "name", "tag", "release_type"])
        .date_field("created_at")
        .aggregate("count", AggregateSpec::Count)
        .aggregate("by_framework", AggregateSpec::count_by("framework"))
        .aggregate("by_release_type", AggregateSpec::count_by("release_type"))
        .aggregate("per_month", AggregateSpec::monthly("created_at", None))
        .default_sort(SortState::descending("created_at")))
}

pub fn news_view() -> Result<ViewConfig<NewsItem>, ConfigurationError> {
    let registry = FieldRegistry::new()
        .with("published", ValueKind::Date, |r: &NewsItem| opt(&r.pub_date))?
        .with("source", ValueKind::Nullable, |r: &NewsItem| opt(&r.source))?
        .with("title", ValueKind::Nullable, |r: &NewsItem| opt(&r.title))?
        .with("link", ValueKind::Nullable, |r: &NewsItem| opt(&r.link))?
        .with("description", ValueKind::Nullable, |r: &NewsItem| opt(&r.description))?;
    Ok(ViewConfig::new(registry)
        .searchable(["title", "description", "source"])
        .columns(["published", "source", "title"])
        .date_field("published")
        .aggregate("count", AggregateSpec::Count)
        .aggregate("by_source", AggregateSpec::count_by("source"))
        .default_sort(SortState::descending("published")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CategoryFilter, PaginationMode, TableView, ViewEngine};

    #[test]
    fn every_preset_validates() {
        assert!(ViewEngine::new(cve_view().unwrap()).is_ok());
        assert!(ViewEngine::new(leak_view().unwrap()).is_ok());
        assert!(ViewEngine::new(eol_view().unwrap()).is_ok());
        assert!(ViewEngine::new(web3_exploit_view().unwrap()).is_ok());
        assert!(ViewEngine::new(web3_release_view().unwrap()).is_ok());
        assert!(ViewEngine::new(news_view().unwrap()).is_ok());
    }

    #[test]
    fn exploit_view_totals_follow_the_filter() {
        let rows: Vec<Web3Exploit> = serde_json::from_str(
            r#"[
                {"project_name": "Bridge", "chain": "ETH", "funds_lost": 1000, "date": "2024-01-10"},
                {"project_name": "Dex", "chain": "BSC", "funds_lost": "$500", "date": "2024-02-03"},
                {"project_name": "Vault", "chain": "ETH", "funds_lost": null, "date": "2024-02-20"}
            ]"#,
        )
        .unwrap();
        let engine = ViewEngine::new(web3_exploit_view().unwrap()).unwrap();
        let mut view = TableView::new(engine).with_records(rows);
        view.set_category("chain", CategoryFilter::only("ETH")).unwrap();
        let result = view.view().unwrap();
        assert_eq!(result.filtered_count, 2);
        assert_eq!(result.aggregates["total_lost"].as_scalar(), Some(1000.0));
        let months = result.aggregates["monthly_losses"].as_series().unwrap();
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].label, "Jan 2024");
        assert_eq!(view.mode(), PaginationMode::Local);
    }

    #[test]
    fn cve_view_sorts_newest_first() {
        let rows: Vec<CveRecord> = serde_json::from_str(
            r#"[
                {"cve_id": "CVE-2024-1", "publishedDate": "2024-01-01T00:00:00", "score": 5.0},
                {"cve_id": "CVE-2024-2", "publishedDate": "2024-03-01T00:00:00", "score": 9.0},
                {"cve_id": "CVE-2024-3", "score": 7.0}
            ]"#,
        )
        .unwrap();
        let engine = ViewEngine::new(cve_view().unwrap()).unwrap();
        let mut view = TableView::new(engine).with_records(rows);
        let result = view.view().unwrap();
        let ids: Vec<_> = result
            .page_items
            .iter()
            .filter_map(|r| r.cve_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["CVE-2024-2", "CVE-2024-1", "CVE-2024-3"]);
        assert_eq!(result.aggregates["average_score"].as_scalar(), Some(7.0));
    }
}
