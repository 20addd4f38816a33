use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;
use thiserror::Error;

use super::aggregate::Aggregation;
use super::model::Observation;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Everything that can go wrong while turning benchmark output into
/// observations. Every variant names the offending input.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: malformed report file name: {reason}", path.display())]
    FileName { path: PathBuf, reason: String },

    #[error("{}:{line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("{}: no line mentions metric '{metric}'", path.display())]
    MissingMetric { path: PathBuf, metric: String },

    #[error("{}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: no observations found", path.display())]
    NoObservations { path: PathBuf },
}

type Result<T> = std::result::Result<T, LoadError>;

fn io_error(path: &Path, source: io::Error) -> LoadError {
    if source.kind() == io::ErrorKind::NotFound {
        LoadError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        LoadError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(LoadError::NotFound {
            path: path.to_path_buf(),
        })
    }
}

/// Build an observation, rejecting values that cannot be charted.
fn checked(thread_count: u32, hash_bits: u32, value: f64) -> std::result::Result<Observation, String> {
    if thread_count == 0 {
        return Err("thread count must be at least 1".to_string());
    }
    if !value.is_finite() {
        return Err(format!("metric value {value} is not finite"));
    }
    Ok(Observation::new(thread_count, hash_bits, value))
}

// ---------------------------------------------------------------------------
// Extractor strategy
// ---------------------------------------------------------------------------

/// Which kind of benchmark output an extractor reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    PerfReports,
    ResultsCsv,
    ThroughputLog,
}

impl SourceKind {
    /// Aggregation each source has always used: the perf and CSV inputs
    /// carry one row per configuration, the log repeats configurations.
    pub fn default_aggregation(self) -> Aggregation {
        match self {
            SourceKind::PerfReports | SourceKind::ResultsCsv => Aggregation::Retain,
            SourceKind::ThroughputLog => Aggregation::Mean,
        }
    }
}

/// A parsing strategy producing a flat list of observations.
pub trait Extractor {
    /// File or directory this extractor reads.
    fn input(&self) -> &Path;

    fn kind(&self) -> SourceKind;

    /// Read the input. Any malformed record aborts the whole run.
    fn extract(&self) -> Result<Vec<Observation>>;
}

/// Run an extractor and insist on at least one observation.
pub fn load(extractor: &dyn Extractor) -> Result<Vec<Observation>> {
    let observations = extractor.extract()?;
    if observations.is_empty() {
        return Err(LoadError::NoObservations {
            path: extractor.input().to_path_buf(),
        });
    }
    info!(
        "read {} observations from {}",
        observations.len(),
        extractor.input().display()
    );
    Ok(observations)
}

// ---------------------------------------------------------------------------
// perf stat reports
// ---------------------------------------------------------------------------

const PERF_PREFIX: &str = "perf_stat_";
const PERF_SUFFIX: &str = ".txt";

/// Directory of `perf stat` outputs named `perf_stat_<threads>_<bits>.txt`.
#[derive(Debug, Clone)]
pub struct PerfReportDir {
    pub dir: PathBuf,
    /// Label of the counter to extract, e.g. `context-switches`.
    pub metric: String,
}

impl PerfReportDir {
    pub fn new(dir: impl Into<PathBuf>, metric: impl Into<String>) -> Self {
        PerfReportDir {
            dir: dir.into(),
            metric: metric.into(),
        }
    }

    fn read_report(&self, path: &Path, threads: u32, bits: u32) -> Result<Vec<Observation>> {
        let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;

        let mut out = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let parse_err = |reason: String| LoadError::Parse {
                path: path.to_path_buf(),
                line: idx as u64 + 1,
                reason,
            };
            if !line.contains(self.metric.as_str()) {
                continue;
            }
            let value = metric_value(line, &self.metric).ok_or_else(|| {
                parse_err(format!("no numeric value on '{}' line", self.metric))
            })?;
            out.push(checked(threads, bits, value).map_err(parse_err)?);
        }

        if out.is_empty() {
            return Err(LoadError::MissingMetric {
                path: path.to_path_buf(),
                metric: self.metric.clone(),
            });
        }
        Ok(out)
    }
}

impl Extractor for PerfReportDir {
    fn input(&self) -> &Path {
        &self.dir
    }

    fn kind(&self) -> SourceKind {
        SourceKind::PerfReports
    }

    fn extract(&self) -> Result<Vec<Observation>> {
        ensure_exists(&self.dir)?;
        let mut entries = fs::read_dir(&self.dir)
            .map_err(|e| io_error(&self.dir, e))?
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| io_error(&self.dir, e))?;
        // read_dir order is platform dependent
        entries.sort_by_key(|e| e.file_name());

        let mut observations = Vec::new();
        for entry in entries {
            let path = entry.path();
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                debug!("skipping non UTF-8 file name {}", path.display());
                continue;
            };
            let Some(parsed) = parse_report_name(&name) else {
                debug!("skipping {}", path.display());
                continue;
            };
            let (threads, bits) = parsed.map_err(|reason| LoadError::FileName {
                path: path.clone(),
                reason,
            })?;
            if !path.is_file() {
                debug!("skipping non-file {}", path.display());
                continue;
            }
            observations.extend(self.read_report(&path, threads, bits)?);
        }
        Ok(observations)
    }
}

/// Split `perf_stat_<threads>_<bits>[_...].txt` into its two numbers.
///
/// `None` when the name does not follow the convention at all,
/// `Some(Err)` when it does but the numbers are unusable.
pub fn parse_report_name(name: &str) -> Option<std::result::Result<(u32, u32), String>> {
    let stem = name.strip_prefix(PERF_PREFIX)?.strip_suffix(PERF_SUFFIX)?;
    let mut fields = stem.split('_');

    let mut next_number = |what: &str| -> std::result::Result<u32, String> {
        let raw = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| format!("missing {what} field"))?;
        raw.parse::<u32>()
            .map_err(|_| format!("{what} field '{raw}' is not a non-negative integer"))
    };

    let parsed = next_number("threads").and_then(|t| Ok((t, next_number("hash bits")?)));
    Some(parsed)
}

/// Value of a counter line, either perf style (`1,234  context-switches`)
/// or labelled (`context-switches: 1,234`).
fn metric_value(line: &str, metric: &str) -> Option<f64> {
    let (before, after) = line.split_once(metric)?;
    let token = before
        .split_whitespace()
        .next()
        .or_else(|| after.trim_start().trim_start_matches(':').split_whitespace().next())?;
    parse_grouped_number(token)
}

/// Parse a number that may carry `,` thousands separators (`1,234,567.8`).
/// Separators must split the integer part into groups of three digits.
fn parse_grouped_number(token: &str) -> Option<f64> {
    if !token.contains(',') {
        return token.parse::<f64>().ok();
    }
    let (int_part, frac_part) = match token.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (token, None),
    };
    let mut groups = int_part.split(',');
    let lead = groups.next()?;
    let lead_ok = (1..=3).contains(&lead.len()) && lead.bytes().all(|b| b.is_ascii_digit());
    if !lead_ok || !groups.all(|g| g.len() == 3 && g.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let mut digits = int_part.replace(',', "");
    if let Some(frac) = frac_part {
        digits.push('.');
        digits.push_str(frac);
    }
    digits.parse::<f64>().ok()
}

// ---------------------------------------------------------------------------
// CSV results table
// ---------------------------------------------------------------------------

/// CSV with a header row and positional columns `threads, hash_bits, throughput`.
#[derive(Debug, Clone)]
pub struct ResultsCsv {
    pub path: PathBuf,
}

const CSV_COLUMNS: [&str; 3] = ["threads", "hash_bits", "throughput"];

impl ResultsCsv {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ResultsCsv { path: path.into() }
    }
}

impl Extractor for ResultsCsv {
    fn input(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ResultsCsv
    }

    fn extract(&self) -> Result<Vec<Observation>> {
        ensure_exists(&self.path)?;
        let csv_err = |source| LoadError::Csv {
            path: self.path.clone(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(csv_err)?;

        let mut observations = Vec::new();
        for result in reader.records() {
            let record = result.map_err(csv_err)?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let parse_err = |reason: String| LoadError::Parse {
                path: self.path.clone(),
                line,
                reason,
            };

            if record.len() != CSV_COLUMNS.len() {
                return Err(parse_err(format!(
                    "expected {} columns ({}), found {}",
                    CSV_COLUMNS.len(),
                    CSV_COLUMNS.join(", "),
                    record.len()
                )));
            }

            let field = |idx: usize| record.get(idx).unwrap_or("");
            let threads = field(0).parse::<u32>().map_err(|_| {
                parse_err(format!("column '{}': '{}' is not an integer", CSV_COLUMNS[0], field(0)))
            })?;
            let bits = field(1).parse::<u32>().map_err(|_| {
                parse_err(format!("column '{}': '{}' is not an integer", CSV_COLUMNS[1], field(1)))
            })?;
            let throughput = field(2).parse::<f64>().map_err(|_| {
                parse_err(format!("column '{}': '{}' is not a number", CSV_COLUMNS[2], field(2)))
            })?;

            observations.push(checked(threads, bits, throughput).map_err(parse_err)?);
        }
        Ok(observations)
    }
}

// ---------------------------------------------------------------------------
// Free-text throughput log
// ---------------------------------------------------------------------------

const LOG_MARKER: &str = "Threads:";
// The throughput token runs to the next whitespace so `1.2.3` or `12abc`
// reach the number parser whole and get rejected.
static LOG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Threads:\s*(\d+),\s*Hash Bits:\s*(\d+),\s*Throughput:\s*(\S+)")
        .expect("throughput log pattern is valid")
});

/// Benchmark log with lines `Threads: N, Hash Bits: M, Throughput: X MTuple/s`.
/// Unrelated lines are ignored.
#[derive(Debug, Clone)]
pub struct ThroughputLog {
    pub path: PathBuf,
}

impl ThroughputLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ThroughputLog { path: path.into() }
    }
}

impl Extractor for ThroughputLog {
    fn input(&self) -> &Path {
        &self.path
    }

    fn kind(&self) -> SourceKind {
        SourceKind::ThroughputLog
    }

    fn extract(&self) -> Result<Vec<Observation>> {
        let text = fs::read_to_string(&self.path).map_err(|e| io_error(&self.path, e))?;

        let mut observations = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let parse_err = |reason: String| LoadError::Parse {
                path: self.path.clone(),
                line: idx as u64 + 1,
                reason,
            };

            let Some(caps) = LOG_PATTERN.captures(line) else {
                if line.contains(LOG_MARKER) {
                    return Err(parse_err(
                        "expected 'Threads: <int>, Hash Bits: <int>, Throughput: <number>'".to_string(),
                    ));
                }
                continue;
            };

            let threads = caps[1]
                .parse::<u32>()
                .map_err(|_| parse_err(format!("thread count '{}' out of range", &caps[1])))?;
            let bits = caps[2]
                .parse::<u32>()
                .map_err(|_| parse_err(format!("hash bits '{}' out of range", &caps[2])))?;
            let throughput = caps[3]
                .parse::<f64>()
                .map_err(|_| parse_err(format!("throughput '{}' is not a number", &caps[3])))?;

            observations.push(checked(threads, bits, throughput).map_err(parse_err)?);
        }
        Ok(observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn report_names() {
        assert_eq!(parse_report_name("perf_stat_4_16.txt"), Some(Ok((4, 16))));
        assert_eq!(parse_report_name("perf_stat_1_0_run2.txt"), Some(Ok((1, 0))));
        assert_eq!(parse_report_name("notes.txt"), None);
        assert_eq!(parse_report_name("perf_stat_4_16.log"), None);
        assert!(matches!(parse_report_name("perf_stat_four_16.txt"), Some(Err(_))));
        assert!(matches!(parse_report_name("perf_stat_4.txt"), Some(Err(_))));
    }

    #[test]
    fn counter_lines_in_both_layouts() {
        assert_eq!(
            metric_value("context-switches: 1,234", "context-switches"),
            Some(1234.0)
        );
        assert_eq!(
            metric_value(
                "         1,234,567      context-switches          #    1.234 K/sec",
                "context-switches"
            ),
            Some(1_234_567.0)
        );
        assert_eq!(
            metric_value("     <not counted>      context-switches", "context-switches"),
            None
        );
    }

    #[test]
    fn thousands_separators_must_split_groups_of_three() {
        assert_eq!(parse_grouped_number("1,234"), Some(1234.0));
        assert_eq!(parse_grouped_number("12,345,678"), Some(12_345_678.0));
        assert_eq!(parse_grouped_number("1,234.50"), Some(1234.5));
        assert_eq!(parse_grouped_number("987.25"), Some(987.25));
        assert_eq!(parse_grouped_number("1,2,,3"), None);
        assert_eq!(parse_grouped_number("1,23"), None);
        assert_eq!(parse_grouped_number("1234,567"), None);
        assert_eq!(parse_grouped_number(",123"), None);
    }

    #[test]
    fn perf_report_with_misplaced_separators_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("perf_stat_4_16.txt"), "1,2,,3 context-switches\n").unwrap();
        let err = load(&PerfReportDir::new(dir.path(), "context-switches")).unwrap_err();
        assert!(matches!(err, LoadError::Parse { line: 1, .. }));
    }

    #[test]
    fn perf_dir_yields_one_observation_per_report() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("perf_stat_4_16.txt"), "context-switches: 1,234\n").unwrap();
        fs::write(
            dir.path().join("perf_stat_1_2.txt"),
            " Performance counter stats:\n\n            17      context-switches   #  0.5 K/sec\n",
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a report").unwrap();

        let extractor = PerfReportDir::new(dir.path(), "context-switches");
        let mut got = load(&extractor).unwrap();
        got.sort_by_key(|o| o.thread_count);
        assert_eq!(
            got,
            vec![Observation::new(1, 2, 17.0), Observation::new(4, 16, 1234.0)]
        );
    }

    #[test]
    fn perf_report_without_metric_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("perf_stat_2_8.txt"), "cycles: 10\n").unwrap();
        let err = load(&PerfReportDir::new(dir.path(), "context-switches")).unwrap_err();
        assert!(matches!(err, LoadError::MissingMetric { .. }));
        assert!(err.to_string().contains("perf_stat_2_8.txt"));
    }

    #[test]
    fn perf_report_with_bad_name_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("perf_stat_x_8.txt"), "context-switches: 1\n").unwrap();
        let err = load(&PerfReportDir::new(dir.path(), "context-switches")).unwrap_err();
        assert!(matches!(err, LoadError::FileName { .. }));
    }

    #[test]
    fn perf_report_with_unparsable_value_names_the_line() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("perf_stat_2_8.txt"),
            "header\n  <not counted>  context-switches\n",
        )
        .unwrap();
        let err = load(&PerfReportDir::new(dir.path(), "context-switches")).unwrap_err();
        match err {
            LoadError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_perf_dir_has_no_observations() {
        let dir = tempdir().unwrap();
        let err = load(&PerfReportDir::new(dir.path(), "context-switches")).unwrap_err();
        assert!(matches!(err, LoadError::NoObservations { .. }));
    }

    #[test]
    fn missing_inputs_are_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load(&PerfReportDir::new(&missing, "context-switches")),
            Err(LoadError::NotFound { .. })
        ));
        assert!(matches!(
            load(&ResultsCsv::new(&missing)),
            Err(LoadError::NotFound { .. })
        ));
        assert!(matches!(
            load(&ThroughputLog::new(&missing)),
            Err(LoadError::NotFound { .. })
        ));
    }

    #[test]
    fn csv_rows_become_observations() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("experiment_results.csv");
        fs::write(&path, "threads,hash_bits,throughput\n1,0,120.5\n2, 4 ,98.25\n").unwrap();

        let got = load(&ResultsCsv::new(&path)).unwrap();
        assert_eq!(
            got,
            vec![Observation::new(1, 0, 120.5), Observation::new(2, 4, 98.25)]
        );
    }

    #[test]
    fn csv_non_numeric_throughput_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "threads,hash_bits,throughput\n1,0,12.0\n2,4,fast\n").unwrap();

        let err = load(&ResultsCsv::new(&path)).unwrap_err();
        match &err {
            LoadError::Parse { line, reason, .. } => {
                assert_eq!(*line, 3);
                assert!(reason.contains("throughput"));
                assert!(reason.contains("fast"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn csv_nan_throughput_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "threads,hash_bits,throughput\n1,0,NaN\n").unwrap();
        assert!(matches!(
            load(&ResultsCsv::new(&path)),
            Err(LoadError::Parse { .. })
        ));
    }

    #[test]
    fn csv_wrong_column_count_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.csv");
        fs::write(&path, "threads,hash_bits,throughput\n1,0\n").unwrap();
        assert!(matches!(
            load(&ResultsCsv::new(&path)),
            Err(LoadError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn log_lines_are_scraped_and_noise_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.txt");
        fs::write(
            &path,
            "DEBUG: argc = 3\n\
             Threads: 2, Hash Bits: 4, Throughput: 10 MTuple/s\n\
             Independent Output completed in 12 ms\n\
             Threads: 2, Hash Bits: 4, Throughput: 20.5 MTuple/s\n\
             Threads:16,Hash Bits:18,Throughput:1.5e+02 MTuple/s\n",
        )
        .unwrap();

        let got = load(&ThroughputLog::new(&path)).unwrap();
        assert_eq!(
            got,
            vec![
                Observation::new(2, 4, 10.0),
                Observation::new(2, 4, 20.5),
                Observation::new(16, 18, 150.0),
            ]
        );
    }

    #[test]
    fn log_line_with_garbled_fields_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.txt");
        fs::write(
            &path,
            "Threads: 1, Hash Bits: 2, Throughput: 3\nThreads: 4, Hash Bits: ?, Throughput: 5\n",
        )
        .unwrap();
        assert!(matches!(
            load(&ThroughputLog::new(&path)),
            Err(LoadError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn log_throughput_must_be_a_whole_number_token() {
        let dir = tempdir().unwrap();
        for bad in ["1.2.3", "12abc", "3.5,"] {
            let path = dir.path().join("results.txt");
            fs::write(
                &path,
                format!("Threads: 2, Hash Bits: 4, Throughput: 10 MTuple/s\nThreads: 2, Hash Bits: 6, Throughput: {bad} MTuple/s\n"),
            )
            .unwrap();
            match load(&ThroughputLog::new(&path)) {
                Err(LoadError::Parse { line, reason, .. }) => {
                    assert_eq!(line, 2);
                    assert!(reason.contains(bad), "{reason}");
                }
                other => panic!("{bad}: unexpected result {other:?}"),
            }
        }
    }

    #[test]
    fn log_throughput_at_end_of_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.txt");
        fs::write(&path, "Threads: 8, Hash Bits: 12, Throughput: 412.75").unwrap();
        assert_eq!(
            load(&ThroughputLog::new(&path)).unwrap(),
            vec![Observation::new(8, 12, 412.75)]
        );
    }

    #[test]
    fn zero_threads_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.txt");
        fs::write(&path, "Threads: 0, Hash Bits: 2, Throughput: 3\n").unwrap();
        assert!(matches!(
            load(&ThroughputLog::new(&path)),
            Err(LoadError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn default_aggregation_per_source() {
        assert_eq!(SourceKind::PerfReports.default_aggregation(), Aggregation::Retain);
        assert_eq!(SourceKind::ResultsCsv.default_aggregation(), Aggregation::Retain);
        assert_eq!(SourceKind::ThroughputLog.default_aggregation(), Aggregation::Mean);
    }
}
