//! Feed contract: record shapes, envelopes, the HTTP client and the
//! normalization rules applied before records reach a view.

pub mod client;
pub mod normalize;
pub mod records;
pub mod slot;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::ServerPage;

pub use client::{ClientOptions, CveQuery, FeedClient, FeedError, FeedLoad};
pub use records::{
    CveRecord, EolCycle, EolProduct, EolRow, LeakRecord, NewsItem, Web3Exploit, Web3Release,
};
pub use slot::{FeedSlot, LoadState};

/// Standard `{ last_updated, total_records, data }` wrapper.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FeedEnvelope<T> {
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_records: Option<usize>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for FeedEnvelope<T> {
    fn default() -> Self {
        Self {
            last_updated: None,
            total_records: None,
            data: Vec::new(),
        }
    }
}

/// Server-paginated CVE envelope.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CvePage<T> {
    #[serde(default, deserialize_with = "records::lenient_year")]
    pub year: Option<i32>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_records: usize,
    #[serde(default)]
    pub total_pages: usize,
    #[serde(default = "first_page")]
    pub current_page: usize,
    #[serde(default)]
    pub page_size: usize,
    #[serde(default, deserialize_with = "records::lenient_years")]
    pub available_years: Vec<i32>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

fn first_page() -> usize {
    1
}

impl<T> CvePage<T> {
    pub fn server_page(&self) -> ServerPage {
        ServerPage {
            total_records: self.total_records,
            total_pages: self.total_pages.max(1),
            current_page: self.current_page.max(1),
            page_size: self.page_size.max(1),
        }
    }
}

/// Answer of the phishing `/search?domain=` lookup.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DomainLookup {
    pub domain: String,
    pub exists: bool,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Cves,
    Leaks,
    Eol,
    Web3Exploits,
    Web3Releases,
    News,
}

impl FeedKind {
    pub fn all() -> [FeedKind; 6] {
        [
            Self::Cves,
            Self::Leaks,
            Self::Eol,
            Self::Web3Exploits,
            Self::Web3Releases,
            Self::News,
        ]
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Cves => "/get-cves",
            Self::Leaks => "/leaks",
            Self::Eol => "/eol",
            Self::Web3Exploits => "/web3-threats",
            Self::Web3Releases => "/web3-releases",
            Self::News => "/news",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Cves => "cves",
            Self::Leaks => "leaks",
            Self::Eol => "eol",
            Self::Web3Exploits => "web3-exploits",
            Self::Web3Releases => "web3-releases",
            Self::News => "news",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cve" | "cves" => Some(Self::Cves),
            "leak" | "leaks" => Some(Self::Leaks),
            "eol" => Some(Self::Eol),
            "web3" | "web3-exploits" | "web3-threats" => Some(Self::Web3Exploits),
            "web3-releases" | "releases" => Some(Self::Web3Releases),
            "news" => Some(Self::News),
            _ => None,
        }
    }
}

impl fmt::Display for FeedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_kind_parses_aliases() {
        assert_eq!(FeedKind::parse("CVE"), Some(FeedKind::Cves));
        assert_eq!(FeedKind::parse("web3-threats"), Some(FeedKind::Web3Exploits));
        assert_eq!(FeedKind::parse("weather"), None);
        for kind in FeedKind::all() {
            assert_eq!(FeedKind::parse(kind.label()), Some(kind));
        }
    }

    #[test]
    fn cve_page_maps_to_server_page() {
        let page: CvePage<CveRecord> = serde_json::from_str(
            r#"{"total_records": 2500, "total_pages": 25, "current_page": 3,
                "page_size": 100, "available_years": [2024, 2023], "data": []}"#,
        )
        .unwrap();
        let sp = page.server_page();
        assert_eq!((sp.total_records, sp.total_pages, sp.current_page), (2500, 25, 3));
        assert_eq!(page.available_years, vec![2024, 2023]);
    }

    #[test]
    fn cve_page_accepts_string_years() {
        let all: CvePage<CveRecord> = serde_json::from_str(
            r#"{"last_updated": "2024-06-01T10:00:00", "total_records": 1,
                "total_pages": 1, "current_page": 1, "page_size": 100,
                "available_years": ["2023", "2024"],
                "data": [{"cve_id": "CVE-2024-0001", "score": 7.5}]}"#,
        )
        .unwrap();
        assert_eq!(all.year, None);
        assert_eq!(all.available_years, vec![2023, 2024]);
        assert_eq!(all.data.len(), 1);

        let filtered: CvePage<CveRecord> = serde_json::from_str(
            r#"{"year": "2024", "total_records": 0, "total_pages": 0, "current_page": 1,
                "page_size": 100, "available_years": ["2024", "2023"], "data": []}"#,
        )
        .unwrap();
        assert_eq!(filtered.year, Some(2024));
        assert_eq!(filtered.available_years, vec![2024, 2023]);
    }
}
