use std::sync::OnceLock;

use chrono::{Duration, NaiveDateTime};
use regex::Regex;
use tracing::debug;

use super::records::{CveRecord, EolProduct, EolRow, LeakRecord, NewsItem, Web3Exploit};
use crate::engine::dates;

static ANCHOR_RE: OnceLock<Regex> = OnceLock::new();
static HREF_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();
static SPACE_RE: OnceLock<Regex> = OnceLock::new();

fn anchor_re() -> &'static Regex {
    ANCHOR_RE.get_or_init(|| {
        Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a\s*>").expect("anchor pattern")
    })
}

fn href_re() -> &'static Regex {
    HREF_RE.get_or_init(|| {
        Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#).expect("href pattern")
    })
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag pattern"))
}

fn space_re() -> &'static Regex {
    SPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern"))
}

/// A CVE is shown unless it was rejected, carries a "none" severity, or has
/// neither score nor severity.
pub fn is_displayable_cve(cve: &CveRecord) -> bool {
    if cve
        .description
        .as_deref()
        .is_some_and(|d| d.contains("Rejected reason"))
    {
        return false;
    }
    let is_none_label = |s: Option<&str>| matches!(s, Some("brak") | Some("none"));
    if is_none_label(cve.severity.as_deref()) || is_none_label(cve.severity_en.as_deref()) {
        return false;
    }
    let has_severity = cve.severity.as_deref().is_some_and(|s| !s.is_empty());
    cve.score.is_some() || has_severity
}

pub fn retain_displayable_cves(cves: Vec<CveRecord>) -> Vec<CveRecord> {
    let before = cves.len();
    let kept: Vec<CveRecord> = cves.into_iter().filter(is_displayable_cve).collect();
    debug!(dropped = before - kept.len(), "filtered non-displayable CVEs");
    kept
}

pub fn drop_honeypots(exploits: Vec<Web3Exploit>) -> Vec<Web3Exploit> {
    exploits
        .into_iter()
        .filter(|e| {
            !e.scam_type
                .as_deref()
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("honeypot"))
        })
        .collect()
}

/// Drops items dated more than a day past `now`; scheduled posts and feed
/// glitches. Undated items are kept.
pub fn drop_future_news(items: Vec<NewsItem>, now: NaiveDateTime) -> Vec<NewsItem> {
    let cutoff = now + Duration::hours(24);
    let before = items.len();
    let kept: Vec<NewsItem> = items
        .into_iter()
        .filter(|item| {
            item.pub_date
                .as_deref()
                .and_then(dates::parse_date)
                .map_or(true, |published| published <= cutoff)
        })
        .collect();
    debug!(dropped = before - kept.len(), "filtered future-dated news");
    kept
}

pub fn flatten_eol(products: Vec<EolProduct>) -> Vec<EolRow> {
    let mut rows = Vec::new();
    for product in products {
        for cycle in product.versions {
            let lts = match &cycle.lts {
                serde_json::Value::Bool(b) => *b,
                serde_json::Value::String(s) => !s.is_empty(),
                _ => false,
            };
            rows.push(EolRow {
                product: product.product.clone(),
                cycle: cycle.cycle,
                eol: cycle.eol,
                release_date: cycle.release_date,
                latest: cycle.latest,
                latest_release_date: cycle.latest_release_date,
                lts,
                status: cycle.status,
            });
        }
    }
    rows
}

/// Strips markup from an HTML description. Every anchor takes a number,
/// with or without a target; links become `[n]` markers and their targets are returned as references, except links back to
/// the record's own domain, which keep only their text.
pub fn sanitize_description(description: &str, domain: Option<&str>) -> (String, Vec<String>) {
    let mut references = Vec::new();
    let mut index = 0usize;
    let linked = anchor_re().replace_all(description, |caps: &regex::Captures<'_>| {
        index += 1;
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let href = href_re()
            .captures(attrs)
            .and_then(|c| c.get(1))
            .map_or("", |m| m.as_str());
        let text = caps.get(2).map_or("", |m| m.as_str());
        let own_domain = match (domain, reqwest::Url::parse(href)) {
            (Some(d), Ok(url)) if !d.is_empty() => url.host_str().is_some_and(|h| h.contains(d)),
            _ => false,
        };
        if href.is_empty() || own_domain {
            return text.to_string();
        }
        references.push(href.to_string());
        format!("{text} [{index}]")
    });
    let stripped = tag_re().replace_all(&linked, "");
    let text = space_re().replace_all(&stripped, " ").trim().to_string();
    (text, references)
}

pub fn normalize_leaks(leaks: Vec<LeakRecord>) -> Vec<LeakRecord> {
    leaks
        .into_iter()
        .map(|mut leak| {
            if let Some(description) = leak.description.take() {
                let (text, refs) = sanitize_description(&description, leak.domain.as_deref());
                leak.description = Some(text);
                if !refs.is_empty() {
                    leak.references = Some(refs);
                }
            }
            leak
        })
        .collect()
}

/// Case-insensitive exact match against a phishing domain list.
pub fn domain_listed(domains: &[String], domain: &str) -> bool {
    let needle = domain.trim();
    domains.iter().any(|d| d.eq_ignore_ascii_case(needle))
}
