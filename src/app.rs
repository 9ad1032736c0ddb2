use std::time::Duration;

use chrono::Local;
use clap::{error::ErrorKind, Parser};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::args::{CliArgs, Command, ProxyArgs, ViewArgs};
use crate::cli::validation;
use crate::config::{self, ConfigFile};
use crate::engine::{
    pagination, CategoryFilter, ConfigurationError, DateRange, PaginationMode, TableView,
    ViewConfig, ViewEngine,
};
use crate::feeds::normalize;
use crate::feeds::records::{CveRecord, EolProduct, LeakRecord, NewsItem, Web3Exploit, Web3Release};
use crate::feeds::{
    ClientOptions, CveQuery, DomainLookup, FeedClient, FeedEnvelope, FeedKind, FeedLoad, FeedSlot,
    LoadState,
};
use crate::output::{self, OutputFormat, ViewContext};
use crate::proxy::{self, ProxyConfig};
use crate::state::AppStore;
use crate::views;

const DEFAULT_API: &str = "http://127.0.0.1:8000";
const DEFAULT_CVE_PAGE_SIZE: usize = 100;

fn format_kv_line(label: &str, value: &str) {
    println!(":: {:<10}: {}", label, value);
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("menaxa={level},tower_http={level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Clone, Debug)]
struct RunConfig {
    api_base_url: String,
    timeout: u64,
    page_size: usize,
    cve_page_size: usize,
    output_format: Option<OutputFormat>,
    no_color: bool,
    proxy: ProxyConfig,
    config_path: Option<std::path::PathBuf>,
    command: Command,
}

fn build_run_config(args: CliArgs, cfg: ConfigFile) -> Result<RunConfig, String> {
    validation::validate(&args)?;

    let no_color = args.no_color || cfg.no_color.unwrap_or(false);
    let timeout = args.timeout.or(cfg.timeout).unwrap_or(10);
    let api_base_url = args
        .api
        .or(cfg.api_base_url)
        .unwrap_or_else(|| DEFAULT_API.to_string());

    let page_size = cfg.page_size.unwrap_or(pagination::DEFAULT_PAGE_SIZE);
    if page_size == 0 {
        return Err("invalid page_size in config, expected positive integer".to_string());
    }
    let cve_page_size = cfg.cve_page_size.unwrap_or(DEFAULT_CVE_PAGE_SIZE);
    if cve_page_size == 0 || cve_page_size > crate::feeds::client::MAX_CVE_PAGE_SIZE {
        return Err("invalid cve_page_size in config, expected 1-1000".to_string());
    }

    let output_format = match cfg.output_format.as_deref() {
        Some(raw) => Some(
            OutputFormat::parse(raw)
                .ok_or_else(|| format!("invalid output_format '{raw}' in config"))?,
        ),
        None => None,
    };

    let mut proxy = ProxyConfig {
        origin_base_url: cfg.origin_base_url,
        upstream_token: cfg.upstream_token,
        timeout_seconds: timeout.max(1),
        ..Default::default()
    };
    if let Some(listen) = cfg.listen {
        proxy.listen = listen;
    }

    Ok(RunConfig {
        api_base_url,
        timeout,
        page_size,
        cve_page_size,
        output_format,
        no_color,
        proxy,
        config_path: args
            .config
            .as_deref()
            .map(config::expand_tilde)
            .or_else(config::default_config_path),
        command: args.command,
    })
}

/// File values first, then environment, then flags.
fn resolve_proxy_config(base: &ProxyConfig, args: &ProxyArgs) -> ProxyConfig {
    let mut cfg = base.clone().from_env();
    if let Some(listen) = args.listen.clone() {
        cfg.listen = listen;
    }
    if let Some(origin) = args.origin.clone() {
        cfg.origin_base_url = Some(origin);
    }
    if let Some(token) = args.token.clone() {
        cfg.upstream_token = Some(token);
    }
    cfg
}

fn spinner(message: String) -> Result<ProgressBar, String> {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_style(
        ProgressStyle::with_template(":: {spinner} {msg} [{elapsed_precise}]")
            .map_err(|e| format!("failed to build spinner style: {e}"))?,
    );
    pb.set_message(message);
    Ok(pb)
}

fn is_url(source: &str) -> bool {
    let lower = source.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Loads a client-paginated feed through a [`FeedSlot`]; failures come back
/// as an empty load carrying the error.
async fn load_feed<T>(
    client: &FeedClient,
    feed: FeedKind,
    source: Option<&str>,
) -> Result<FeedLoad<T>, String>
where
    T: DeserializeOwned + Clone + Send + 'static,
{
    let slot: FeedSlot<T> = FeedSlot::new(feed);
    let client = client.clone();
    let source = source.map(str::to_string);
    let handle = slot.spawn_load(async move {
        match source {
            Some(src) if is_url(&src) => client.fetch_url(&src).await,
            Some(path) => crate::feeds::client::read_feed_file(&path).await,
            None => client.fetch_feed(feed).await,
        }
    });
    let pb = spinner(format!("loading {feed}"))?;
    let stored = handle
        .await
        .map_err(|e| format!("feed task for {feed} failed: {e}"))?;
    pb.finish_and_clear();
    match slot.snapshot() {
        LoadState::Loaded(load) if stored => Ok(load),
        _ => Err(format!("feed {feed} finished without data")),
    }
}

fn category_choice(value: &str) -> CategoryFilter {
    if value == "*" {
        CategoryFilter::All
    } else {
        CategoryFilter::only(value)
    }
}

/// Applies the view flags through the same setters an interactive page uses.
/// The requested page goes last because every other setter resets it.
fn apply_view_args<R>(view: &mut TableView<R>, args: &ViewArgs) -> Result<(), String> {
    if let Some(text) = args.search.as_deref() {
        view.set_search(text);
    }
    for raw in args.filter.iter() {
        let (key, value) = validation::parse_filter(raw)?;
        view.set_category(&key, category_choice(&value))
            .map_err(|e| format!("invalid --filter '{raw}': {e}"))?;
    }
    let start = args
        .from
        .as_deref()
        .map(|r| validation::parse_day("from", r))
        .transpose()?;
    let end = args
        .to
        .as_deref()
        .map(|r| validation::parse_day("to", r))
        .transpose()?;
    view.set_date_range(DateRange::new(start, end))
        .map_err(|e| e.to_string())?;
    for key in args.sort.iter() {
        let state = view
            .toggle_sort(key)
            .map_err(|e| format!("invalid --sort '{key}': {e}"))?;
        debug!(key = %state.key, direction = state.direction.label(), "sort toggled");
    }
    if let Some(size) = args.page_size {
        view.set_page_size(size).map_err(|e| e.to_string())?;
    }
    if let Some(page) = args.page {
        view.set_page(page);
    }
    Ok(())
}

struct Presentation {
    context: ViewContext,
    format: OutputFormat,
    color: bool,
}

fn setup_error(e: ConfigurationError) -> String {
    format!("invalid view setup: {e}")
}

fn present<R: Serialize>(
    config: ViewConfig<R>,
    records: Vec<R>,
    mode: PaginationMode,
    args: &ViewArgs,
    mut presentation: Presentation,
) -> Result<Vec<u8>, String> {
    let engine = ViewEngine::new(config).map_err(setup_error)?;
    let mut view = TableView::new(engine);
    apply_view_args(&mut view, args)?;
    view.replace_records(records, mode);
    view.sync_page().map_err(|e| e.to_string())?;
    presentation.context.page_size = view.state().pagination.page_size();

    let result = view.current().map_err(|e| e.to_string())?;
    info!(
        feed = %presentation.context.feed,
        matching = result.filtered_count,
        page = result.current_page,
        pages = result.total_pages,
        "view computed"
    );
    match presentation.format {
        OutputFormat::Json => output::render_json(&presentation.context, &result),
        OutputFormat::Text => Ok(output::render_text(
            &presentation.context,
            view.engine(),
            &result,
            presentation.color,
        )),
    }
}

/// Client-paginated feeds: the whole record set is local.
fn present_load<R: Serialize>(
    config: Result<ViewConfig<R>, ConfigurationError>,
    records: Vec<R>,
    last_updated: Option<String>,
    error: Option<String>,
    args: &ViewArgs,
    mut presentation: Presentation,
) -> Result<Vec<u8>, String> {
    presentation.context.last_updated = last_updated;
    presentation.context.error = error;
    let config = config
        .map_err(setup_error)?
        .page_size(presentation.context.page_size);
    present(config, records, PaginationMode::Local, args, presentation)
}

async fn present_cve_page(
    client: &FeedClient,
    run: &RunConfig,
    args: &ViewArgs,
    mut presentation: Presentation,
) -> Result<Vec<u8>, String> {
    let query = CveQuery {
        year: args.year,
        page: args.page.unwrap_or(1),
        page_size: args.page_size.unwrap_or(run.cve_page_size),
    };
    query.validate().map_err(|e| e.to_string())?;
    let pb = spinner(format!("loading cves page {}", query.page))?;
    let fetched = client.fetch_cves(&query).await;
    pb.finish_and_clear();
    let config = views::cve_view()
        .map_err(setup_error)?
        .page_size(query.page_size);
    match fetched {
        Ok(page) => {
            let mode = PaginationMode::Server(page.server_page());
            presentation.context.last_updated = page.last_updated;
            presentation.context.available_years = page.available_years;
            let records = normalize::retain_displayable_cves(page.data);
            present(config, records, mode, args, presentation)
        }
        Err(e) => {
            let load: FeedLoad<CveRecord> = FeedLoad::from_result(FeedKind::Cves, Err(e));
            presentation.context.error = load.error;
            present(config, load.records, PaginationMode::Local, args, presentation)
        }
    }
}

async fn run_view(run: &RunConfig, args: &ViewArgs, store: &AppStore) -> Result<(), String> {
    let feed = validation::parse_feed(&args.feed)?;
    let client = FeedClient::new(&ClientOptions {
        base_url: run.api_base_url.clone(),
        timeout_seconds: run.timeout,
        ..Default::default()
    })
    .map_err(|e| e.to_string())?;

    let format = args
        .format
        .as_deref()
        .and_then(OutputFormat::parse)
        .or_else(|| args.output.as_deref().and_then(output::infer_format_from_path))
        .or(run.output_format)
        .unwrap_or(OutputFormat::Text);
    let page_size = store
        .preferred_page_size()
        .unwrap_or(pagination::DEFAULT_PAGE_SIZE);
    let presentation = Presentation {
        context: ViewContext::new(feed, page_size),
        format,
        color: !run.no_color && args.output.is_none(),
    };
    let source = args.source.as_deref();

    let rendered = match feed {
        FeedKind::Cves if source.is_none() => {
            present_cve_page(&client, run, args, presentation).await?
        }
        FeedKind::Cves => {
            let load: FeedLoad<CveRecord> = load_feed(&client, feed, source).await?;
            let records = normalize::retain_displayable_cves(load.records);
            present_load(
                views::cve_view(),
                records,
                load.last_updated,
                load.error,
                args,
                presentation,
            )?
        }
        FeedKind::Leaks => {
            let load: FeedLoad<LeakRecord> = load_feed(&client, feed, source).await?;
            let records = normalize::normalize_leaks(load.records);
            present_load(
                views::leak_view(),
                records,
                load.last_updated,
                load.error,
                args,
                presentation,
            )?
        }
        FeedKind::Eol => {
            let load: FeedLoad<EolProduct> = load_feed(&client, feed, source).await?;
            let records = normalize::flatten_eol(load.records);
            present_load(
                views::eol_view(),
                records,
                load.last_updated,
                load.error,
                args,
                presentation,
            )?
        }
        FeedKind::Web3Exploits => {
            let load: FeedLoad<Web3Exploit> = load_feed(&client, feed, source).await?;
            let records = normalize::drop_honeypots(load.records);
            present_load(
                views::web3_exploit_view(),
                records,
                load.last_updated,
                load.error,
                args,
                presentation,
            )?
        }
        FeedKind::Web3Releases => {
            let load: FeedLoad<Web3Release> = load_feed(&client, feed, source).await?;
            present_load(
                views::web3_release_view(),
                load.records,
                load.last_updated,
                load.error,
                args,
                presentation,
            )?
        }
        FeedKind::News => {
            let load: FeedLoad<NewsItem> = load_feed(&client, feed, source).await?;
            let records = normalize::drop_future_news(load.records, Local::now().naive_local());
            present_load(
                views::news_view(),
                records,
                load.last_updated,
                load.error,
                args,
                presentation,
            )?
        }
    };

    match args.output.as_deref() {
        Some(path) => {
            let path = config::expand_tilde_string(path);
            let mut outfile = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .await
                .map_err(|e| format!("failed to open output file: {e}"))?;
            outfile
                .write_all(&rendered)
                .await
                .map_err(|e| format!("failed to write output file: {e}"))?;
            format_kv_line("Output", &path);
        }
        None => print!("{}", String::from_utf8_lossy(&rendered)),
    }
    Ok(())
}

fn fields_listing<R>(
    feed: FeedKind,
    config: Result<ViewConfig<R>, ConfigurationError>,
) -> Result<String, String> {
    let engine = ViewEngine::new(config.map_err(setup_error)?).map_err(setup_error)?;
    Ok(output::render_fields(feed, engine.registry()))
}

fn run_fields(feed: &str) -> Result<(), String> {
    let feed = validation::parse_feed(feed)?;
    let listing = match feed {
        FeedKind::Cves => fields_listing(feed, views::cve_view())?,
        FeedKind::Leaks => fields_listing(feed, views::leak_view())?,
        FeedKind::Eol => fields_listing(feed, views::eol_view())?,
        FeedKind::Web3Exploits => fields_listing(feed, views::web3_exploit_view())?,
        FeedKind::Web3Releases => fields_listing(feed, views::web3_release_view())?,
        FeedKind::News => fields_listing(feed, views::news_view())?,
    };
    print!("{listing}");
    Ok(())
}

async fn run_lookup(run: &RunConfig, domain: &str, source: Option<&str>) -> Result<(), String> {
    let lookup = match source {
        Some(path) => {
            let list: FeedEnvelope<String> = crate::feeds::client::read_feed_file(path)
                .await
                .map_err(|e| e.to_string())?;
            DomainLookup {
                domain: domain.trim().to_string(),
                exists: normalize::domain_listed(&list.data, domain),
                last_updated: list.last_updated,
            }
        }
        None => {
            let client = FeedClient::new(&ClientOptions {
                base_url: run.api_base_url.clone(),
                timeout_seconds: run.timeout,
                ..Default::default()
            })
            .map_err(|e| e.to_string())?;
            let pb = spinner(format!("looking up {domain}"))?;
            let result = client.lookup_domain(domain).await;
            pb.finish_and_clear();
            result.map_err(|e| e.to_string())?
        }
    };
    format_kv_line("Domain", &lookup.domain);
    format_kv_line(
        "Phishing",
        if lookup.exists { "listed" } else { "not listed" },
    );
    if let Some(updated) = lookup.last_updated.as_deref() {
        format_kv_line("Updated", updated);
    }
    Ok(())
}

fn run_init(run: &RunConfig) -> Result<(), String> {
    let path = run
        .config_path
        .clone()
        .ok_or_else(|| "could not determine home directory for the config file".to_string())?;
    if config::ensure_default_config_file(&path).map_err(|e| e.to_string())? {
        format_kv_line("Config", &format!("written to {}", path.display()));
    } else {
        format_kv_line("Config", &format!("{} already exists", path.display()));
    }
    Ok(())
}

async fn run_async(run: RunConfig) -> Result<(), String> {
    if run.no_color {
        colored::control::set_override(false);
    }
    let mut store = AppStore::new();
    store
        .set_preferred_page_size(run.page_size)
        .map_err(|e| e.to_string())?;

    match &run.command {
        Command::View(args) => run_view(&run, args, &store).await,
        Command::Fields { feed } => run_fields(feed),
        Command::Lookup { domain, source } => {
            run_lookup(&run, domain, source.as_deref()).await
        }
        Command::Proxy(args) => {
            let cfg = resolve_proxy_config(&run.proxy, args);
            format_kv_line("Listen", &cfg.listen);
            format_kv_line("Origin", cfg.origin_base_url.as_deref().unwrap_or("(not set)"));
            format_kv_line("Token", if cfg.upstream_token.is_some() { "required" } else { "off" });
            proxy::serve(cfg).await.map_err(|e| e.to_string())
        }
        Command::Init => run_init(&run),
    }
}

pub fn run_cli() -> Result<(), String> {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{e}");
                return Ok(());
            }
            _ => return Err(e.to_string()),
        },
    };

    init_tracing(args.verbose);

    let user_config_path = args.config.clone().map(|p| config::expand_tilde(&p));
    let cfg = match user_config_path.as_ref() {
        Some(path) => config::load_config(path, false).map_err(|e| e.to_string())?,
        None => match config::default_config_path() {
            Some(path) => config::load_config(&path, true).map_err(|e| e.to_string())?,
            None => ConfigFile::default(),
        },
    };

    let run = build_run_config(args, cfg)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to build runtime: {e}"))?;

    rt.block_on(run_async(run))?;
    Ok(())
}
