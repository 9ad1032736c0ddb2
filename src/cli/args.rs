use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "menaxa",
    version,
    about = "threat-intelligence feed views and a year-keyed edge proxy",
    long_about = "menaxa renders the CVE, leak, EOL, Web3 and news feeds as filterable, sortable, paginated tables with summary statistics, and runs the edge proxy for year-keyed CVE snapshots.\n\nExamples:\n  menaxa view cves --year 2024 --search openssl\n  menaxa view web3 --filter chain=ETH --from 2024-01-01 --sort funds_lost --sort funds_lost\n  menaxa view leaks --source ./leaks.json --format json --output leaks.json\n  menaxa proxy --origin https://data.example.org --token s3cret\n\nTip: Use --config to persist the API URL and proxy settings."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help_heading = "Output",
        help = "Increase verbosity (-v, -vv, -vvv)."
    )]
    pub verbose: u8,

    #[arg(
        long = "no-color",
        global = true,
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        global = true,
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.menaxa/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "api",
        value_name = "URL",
        global = true,
        help_heading = "Input",
        help = "Feed API base URL."
    )]
    pub api: Option<String>,

    #[arg(
        long = "timeout",
        value_name = "SECONDS",
        global = true,
        help_heading = "Performance",
        help = "HTTP request timeout in seconds."
    )]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Render a feed as a filtered, sorted, paginated table.
    View(ViewArgs),
    /// List the fields a feed view can filter and sort on.
    Fields {
        #[arg(value_name = "FEED", help = "cves, leaks, eol, web3-exploits, web3-releases, news")]
        feed: String,
    },
    /// Run the edge proxy for year-keyed CVE snapshots.
    Proxy(ProxyArgs),
    /// Check whether a domain is on the phishing list.
    Lookup {
        #[arg(value_name = "DOMAIN")]
        domain: String,
        /// Check against a local JSON list of domains instead of the API.
        #[arg(long, value_name = "FILE")]
        source: Option<String>,
    },
    /// Write the default config file if it does not exist.
    Init,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    #[arg(value_name = "FEED", help = "cves, leaks, eol, web3-exploits, web3-releases, news")]
    pub feed: String,

    #[arg(
        short = 's',
        long = "source",
        value_name = "URL|FILE",
        help_heading = "Input",
        help = "Read the feed from a JSON file or a full URL instead of the API."
    )]
    pub source: Option<String>,

    #[arg(
        short = 'q',
        long = "search",
        value_name = "TEXT",
        help_heading = "Filters",
        help = "Case-insensitive free-text search over the searchable fields."
    )]
    pub search: Option<String>,

    #[arg(
        short = 'f',
        long = "filter",
        value_name = "KEY=VALUE",
        action = ArgAction::Append,
        help_heading = "Filters",
        help = "Exact match on a field (repeatable). VALUE '*' means all."
    )]
    pub filter: Vec<String>,

    #[arg(
        long = "from",
        value_name = "YYYY-MM-DD",
        help_heading = "Filters",
        help = "Inclusive start of the date range."
    )]
    pub from: Option<String>,

    #[arg(
        long = "to",
        value_name = "YYYY-MM-DD",
        help_heading = "Filters",
        help = "Inclusive end of the date range."
    )]
    pub to: Option<String>,

    #[arg(
        long = "sort",
        value_name = "KEY",
        action = ArgAction::Append,
        help_heading = "Sorting",
        help = "Sort column (repeatable; repeating a column flips its direction)."
    )]
    pub sort: Vec<String>,

    #[arg(
        short = 'p',
        long = "page",
        value_name = "N",
        help_heading = "Pagination",
        help = "Page to show (clamped to the last page)."
    )]
    pub page: Option<usize>,

    #[arg(
        long = "page-size",
        value_name = "N",
        help_heading = "Pagination",
        help = "Rows per page."
    )]
    pub page_size: Option<usize>,

    #[arg(
        long = "year",
        value_name = "YYYY",
        help_heading = "Input",
        help = "CVE year (server-paginated feed only)."
    )]
    pub year: Option<i32>,

    #[arg(
        long = "format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output format: text or json."
    )]
    pub format: Option<String>,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write the rendered view to a file."
    )]
    pub output: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProxyArgs {
    #[arg(
        short = 'l',
        long = "listen",
        value_name = "ADDR",
        help = "Listen address (default 127.0.0.1:8787)."
    )]
    pub listen: Option<String>,

    #[arg(long = "origin", value_name = "URL", help = "Origin base URL.")]
    pub origin: Option<String>,

    #[arg(
        long = "token",
        value_name = "SECRET",
        help = "Shared secret expected in the x-upstream-token header."
    )]
    pub token: Option<String>,
}
