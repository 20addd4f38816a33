mod chart;
mod color;
mod config;
mod data;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;

use config::{ChartConfig, ChartOverrides};
use data::aggregate::{aggregate, Aggregation};
use data::loader::{load, Extractor, PerfReportDir, ResultsCsv, ThroughputLog};

/// Chart hash-partitioning benchmark results.
#[derive(Debug, Parser)]
#[command(name = "partition-charts", version, about)]
struct Cli {
    #[command(subcommand)]
    source: Source,
}

#[derive(Debug, Subcommand)]
enum Source {
    /// Directory of `perf stat` reports named perf_stat_<threads>_<bits>.txt
    Perf {
        #[arg(default_value = "perf_reports")]
        dir: PathBuf,
        /// Counter label to extract from each report
        #[arg(long, default_value = "context-switches")]
        metric: String,
        #[arg(short, long, default_value = "plots/context_switches_plot.png")]
        output: PathBuf,
        #[command(flatten)]
        chart: ChartArgs,
    },
    /// CSV table with columns threads, hash_bits, throughput
    Csv {
        #[arg(default_value = "experiment_results.csv")]
        file: PathBuf,
        #[arg(short, long, default_value = "partitioning_performance.png")]
        output: PathBuf,
        #[command(flatten)]
        chart: ChartArgs,
    },
    /// Benchmark log with `Threads: N, Hash Bits: M, Throughput: X` lines
    Log {
        file: PathBuf,
        #[arg(short, long, default_value = "graph.png")]
        output: PathBuf,
        #[command(flatten)]
        chart: ChartArgs,
    },
}

#[derive(Debug, Args)]
struct ChartArgs {
    /// JSON file with chart settings (title, labels, size, x_tick_step)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    x_label: Option<String>,
    #[arg(long)]
    y_label: Option<String>,
    /// How duplicate thread counts are combined (default depends on the source)
    #[arg(long, value_enum)]
    aggregate: Option<Aggregation>,
}

impl ChartArgs {
    fn overrides(&self) -> ChartOverrides {
        ChartOverrides {
            title: self.title.clone(),
            x_label: self.x_label.clone(),
            y_label: self.y_label.clone(),
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let (extractor, output, chart_args) = match cli.source {
        Source::Perf {
            dir,
            metric,
            output,
            chart,
        } => (
            Box::new(PerfReportDir::new(dir, metric)) as Box<dyn Extractor>,
            output,
            chart,
        ),
        Source::Csv {
            file,
            output,
            chart,
        } => (
            Box::new(ResultsCsv::new(file)) as Box<dyn Extractor>,
            output,
            chart,
        ),
        Source::Log {
            file,
            output,
            chart,
        } => (
            Box::new(ThroughputLog::new(file)) as Box<dyn Extractor>,
            output,
            chart,
        ),
    };

    let mut chart_config = ChartConfig::defaults_for(extractor.kind());
    if let Some(path) = &chart_args.config {
        chart_config.merge(ChartOverrides::from_json_file(path)?);
    }
    chart_config.merge(chart_args.overrides());

    let mode = chart_args
        .aggregate
        .unwrap_or_else(|| extractor.kind().default_aggregation());

    let observations = load(extractor.as_ref()).context("extracting observations")?;
    let series = aggregate(&observations, mode);
    info!(
        "aggregated ({mode}) into {} series, threads {:?}",
        series.len(),
        series.thread_counts().collect::<Vec<_>>()
    );

    chart::render(&series, &chart_config, &output)
        .with_context(|| format!("rendering {}", output.display()))?;

    println!("Wrote {}", output.display());
    Ok(())
}
