use chrono::NaiveDate;

use crate::cli::args::{CliArgs, Command, ViewArgs};
use crate::engine::dates;
use crate::feeds::FeedKind;

pub fn parse_feed(raw: &str) -> Result<FeedKind, String> {
    FeedKind::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = FeedKind::all().iter().map(|k| k.label()).collect();
        format!("unknown feed '{raw}', expected one of: {}", known.join(", "))
    })
}

/// `KEY=VALUE`; the value may itself contain `=`.
pub fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("invalid --filter '{raw}', expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid --filter '{raw}', empty key"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

pub fn parse_day(flag: &str, raw: &str) -> Result<NaiveDate, String> {
    dates::parse_date(raw)
        .map(|dt| dt.date())
        .ok_or_else(|| format!("invalid --{flag} '{raw}', expected YYYY-MM-DD"))
}

fn validate_view(args: &ViewArgs) -> Result<(), String> {
    parse_feed(&args.feed)?;
    for raw in args.filter.iter() {
        parse_filter(raw)?;
    }
    let from = args.from.as_deref().map(|r| parse_day("from", r)).transpose()?;
    let to = args.to.as_deref().map(|r| parse_day("to", r)).transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(format!("invalid date range, --from {from} is after --to {to}"));
        }
    }
    if args.page == Some(0) {
        return Err("invalid page, expected positive integer".to_string());
    }
    if args.page_size == Some(0) {
        return Err("invalid page-size, expected positive integer".to_string());
    }
    if let Some(year) = args.year {
        if !(1999..=9999).contains(&year) {
            return Err(format!("invalid year {year}"));
        }
    }
    if let Some(raw) = args.format.as_deref() {
        crate::output::OutputFormat::parse(raw)
            .ok_or_else(|| format!("invalid --format '{raw}', expected text or json"))?;
    }
    Ok(())
}

pub fn validate(args: &CliArgs) -> Result<(), String> {
    if args.timeout == Some(0) {
        return Err("invalid timeout, expected positive integer".to_string());
    }
    match &args.command {
        Command::View(view) => validate_view(view),
        Command::Fields { feed } => parse_feed(feed).map(|_| ()),
        Command::Lookup { domain, .. } if domain.trim().is_empty() => {
            Err("domain must not be empty".to_string())
        }
        Command::Lookup { .. } | Command::Proxy(_) | Command::Init => Ok(()),
    }
}
