#![forbid(unsafe_code)]

//! Command-line argument parsing for the `qgrid` driver.
//!
//! Parses args by hand. Environment variables with the `QGRID_DEMO_*` prefix
//! supply defaults; explicit flags override them.

use std::env;
use std::fmt;
use std::process;
use std::str::FromStr;

use qgrid_mock::SampleSource;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
qgrid: browse a large query result through a sparse row window

USAGE:
    qgrid [OPTIONS]

OPTIONS:
    --sample=N|NAME      Sample query, 1-4 or by table name (default: 1, users)
    --sql=TEXT           Run TEXT instead of a sample query
    --scroll=A:B,...     Visible ranges to scroll through, in order
                         (default: 0:29,40:70,480:530)
    --scroll-gap-ms=N    Pause between scroll steps (default: 100)
    --poll-ms=N          Status polling interval (default: 500)
    --latency-ms=N       Simulated page fetch latency (default: 200)
    --time-scale=F       Multiply simulated execution time by F (default: 1.0)
    --fail-offset=N      Fail the first fetch of the page at offset N (repeatable)
    --page-size=N        Rows per page (default: QGRID_PAGE_SIZE or 50)
    --debounce-ms=N      Range debounce delay (default: QGRID_DEBOUNCE_MS or 550)
    --help, -h           Show this help message
    --version, -V        Show version

SAMPLES:
    1  users         1,000 rows, completes after 2s
    2  analytics     times out after 15s
    3  products      25,000 rows, 15 columns
    4  transactions  100,000 rows

ENVIRONMENT VARIABLES:
    QGRID_DEMO_SAMPLE         Override --sample
    QGRID_DEMO_SQL            Override --sql
    QGRID_DEMO_SCROLL         Override --scroll
    QGRID_DEMO_POLL_MS        Override --poll-ms
    QGRID_DEMO_LATENCY_MS     Override --latency-ms
    QGRID_DEMO_TIME_SCALE     Override --time-scale
    QGRID_PAGE_SIZE           Rows per page
    QGRID_DEBOUNCE_MS         Range debounce delay
    QGRID_PRIME_FIRST_PAGE    Fetch page 0 on completion (1/true, 0/false)
    RUST_LOG                  Log filter (default: info)";

/// Parsed command-line options.
#[derive(Debug, Clone, PartialEq)]
pub struct Opts {
    /// Sample source to query when no SQL is given.
    pub sample: SampleSource,
    /// Explicit SQL, overriding `sample`.
    pub sql: Option<String>,
    /// Inclusive visible ranges, replayed in order.
    pub scroll: Vec<(usize, usize)>,
    pub scroll_gap_ms: u64,
    pub poll_ms: u64,
    pub latency_ms: u64,
    pub time_scale: f64,
    /// Page offsets whose first fetch fails.
    pub fail_offsets: Vec<usize>,
    /// Overrides the environment's page size.
    pub page_size: Option<usize>,
    /// Overrides the environment's debounce delay.
    pub debounce_ms: Option<u64>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            sample: SampleSource::Users,
            sql: None,
            scroll: vec![(0, 29), (40, 70), (480, 530)],
            scroll_gap_ms: 100,
            poll_ms: 500,
            latency_ms: 200,
            time_scale: 1.0,
            fail_offsets: Vec::new(),
            page_size: None,
            debounce_ms: None,
        }
    }
}

/// Why argument parsing stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    Help,
    Version,
    InvalidValue { flag: &'static str, value: String },
    UnknownArg(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Help => f.write_str("help requested"),
            Self::Version => f.write_str("version requested"),
            Self::InvalidValue { flag, value } => write!(f, "invalid {flag} value: {value}"),
            Self::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl Opts {
    /// Parse command-line arguments and environment variables, exiting on
    /// `--help`, `--version`, or bad input.
    pub fn parse() -> Self {
        match Self::parse_from_env_and_args(env::args().skip(1), |key| env::var(key).ok()) {
            Ok(opts) => opts,
            Err(CliError::Help) => {
                println!("{HELP_TEXT}");
                process::exit(0);
            }
            Err(CliError::Version) => {
                println!("qgrid {VERSION}");
                process::exit(0);
            }
            Err(err @ CliError::InvalidValue { .. }) => {
                eprintln!("{err}");
                process::exit(2);
            }
            Err(err @ CliError::UnknownArg(_)) => {
                eprintln!("{err}");
                eprintln!("Run with --help for usage information.");
                process::exit(2);
            }
        }
    }

    pub fn parse_from_env_and_args<I, S, F>(args: I, get_env: F) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        // Environment first; unparsable values are ignored.
        if let Some(val) = get_env("QGRID_DEMO_SAMPLE")
            && let Some(sample) = parse_sample(&val)
        {
            opts.sample = sample;
        }
        if let Some(val) = get_env("QGRID_DEMO_SQL")
            && !val.trim().is_empty()
        {
            opts.sql = Some(val);
        }
        if let Some(val) = get_env("QGRID_DEMO_SCROLL")
            && let Some(scroll) = parse_scroll(&val)
        {
            opts.scroll = scroll;
        }
        if let Some(val) = get_env("QGRID_DEMO_POLL_MS")
            && let Ok(n) = val.trim().parse()
        {
            opts.poll_ms = n;
        }
        if let Some(val) = get_env("QGRID_DEMO_LATENCY_MS")
            && let Ok(n) = val.trim().parse()
        {
            opts.latency_ms = n;
        }
        if let Some(val) = get_env("QGRID_DEMO_TIME_SCALE")
            && let Ok(n) = val.trim().parse::<f64>()
            && n.is_finite()
            && n >= 0.0
        {
            opts.time_scale = n;
        }

        for arg in args {
            let arg = arg.as_ref();
            match arg {
                "--help" | "-h" => return Err(CliError::Help),
                "--version" | "-V" => return Err(CliError::Version),
                other => {
                    let Some((flag, val)) = other.split_once('=') else {
                        return Err(CliError::UnknownArg(other.to_owned()));
                    };
                    match flag {
                        "--sample" => {
                            opts.sample = parse_sample(val).ok_or_else(|| invalid("--sample", val))?;
                        }
                        "--sql" => {
                            if val.trim().is_empty() {
                                return Err(invalid("--sql", val));
                            }
                            opts.sql = Some(val.to_owned());
                        }
                        "--scroll" => {
                            opts.scroll = parse_scroll(val).ok_or_else(|| invalid("--scroll", val))?;
                        }
                        "--scroll-gap-ms" => opts.scroll_gap_ms = parse_value("--scroll-gap-ms", val)?,
                        "--poll-ms" => opts.poll_ms = parse_value("--poll-ms", val)?,
                        "--latency-ms" => opts.latency_ms = parse_value("--latency-ms", val)?,
                        "--time-scale" => {
                            let scale: f64 = parse_value("--time-scale", val)?;
                            if !scale.is_finite() || scale < 0.0 {
                                return Err(invalid("--time-scale", val));
                            }
                            opts.time_scale = scale;
                        }
                        "--fail-offset" => {
                            opts.fail_offsets.push(parse_value("--fail-offset", val)?);
                        }
                        "--page-size" => {
                            let n: usize = parse_value("--page-size", val)?;
                            if n == 0 {
                                return Err(invalid("--page-size", val));
                            }
                            opts.page_size = Some(n);
                        }
                        "--debounce-ms" => opts.debounce_ms = Some(parse_value("--debounce-ms", val)?),
                        _ => return Err(CliError::UnknownArg(other.to_owned())),
                    }
                }
            }
        }

        Ok(opts)
    }

    /// SQL to submit.
    #[must_use]
    pub fn query(&self) -> &str {
        self.sql
            .as_deref()
            .unwrap_or_else(|| self.sample.sample_sql())
    }
}

fn invalid(flag: &'static str, value: &str) -> CliError {
    CliError::InvalidValue {
        flag,
        value: value.to_owned(),
    }
}

fn parse_value<T: FromStr>(flag: &'static str, value: &str) -> Result<T, CliError> {
    value.trim().parse().map_err(|_| invalid(flag, value))
}

/// `1`-`4` or a table name.
fn parse_sample(value: &str) -> Option<SampleSource> {
    let value = value.trim();
    match value.parse::<usize>() {
        Ok(n) => n.checked_sub(1).and_then(|i| SampleSource::ALL.get(i).copied()),
        Err(_) => SampleSource::from_name(value),
    }
}

/// `A:B,C:D` into inclusive pairs. Each pair must satisfy `A <= B`.
fn parse_scroll(value: &str) -> Option<Vec<(usize, usize)>> {
    let ranges = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (start, end) = part.split_once(':')?;
            let start: usize = start.trim().parse().ok()?;
            let end: usize = end.trim().parse().ok()?;
            (start <= end).then_some((start, end))
        })
        .collect::<Option<Vec<_>>>()?;
    (!ranges.is_empty()).then_some(ranges)
}
