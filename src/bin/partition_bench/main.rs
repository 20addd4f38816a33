mod partition;
mod report;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};

use partition::{generate_input, partition_capacity, run, Pinning, Strategy, MAX_HASH_BITS};
use report::{Format, Measurement, Reporter};

/// Measure hash-partitioning throughput over a threads × hash-bits sweep.
#[derive(Debug, Parser)]
#[command(name = "partition-bench", version, about)]
struct Args {
    #[arg(long, value_enum, default_value_t = Strategy::Independent)]
    strategy: Strategy,
    /// Thread counts to sweep
    #[arg(long, value_delimiter = ',', default_value = "1,2,4,8,16")]
    threads: Vec<usize>,
    /// Hash bits to sweep (2^bits partitions)
    #[arg(long, value_delimiter = ',', default_value = "0,2,4,6,8,10,12,14,16,18")]
    hash_bits: Vec<u32>,
    /// log2 of the number of 16-byte input tuples
    #[arg(long, default_value_t = 24)]
    tuples_log2: u32,
    /// Runs per configuration
    #[arg(long, default_value_t = 1)]
    repeats: usize,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = Format::Log)]
    format: Format,
    /// Write results here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Pin worker t to the t-th listed core (needs one core per thread)
    #[arg(long, value_delimiter = ',', conflicts_with = "physical_first")]
    cores: Vec<usize>,
    /// Pin workers to physical cores of both sockets before SMT siblings
    #[arg(long)]
    physical_first: bool,
}

impl Args {
    fn pinning(&self) -> Pinning {
        if self.physical_first {
            Pinning::PhysicalFirst
        } else if !self.cores.is_empty() {
            Pinning::Cores(self.cores.clone())
        } else {
            Pinning::None
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(&bits) = self.hash_bits.iter().find(|&&b| b > MAX_HASH_BITS) {
            bail!("--hash-bits {bits} exceeds the maximum of {MAX_HASH_BITS}");
        }
        if self.threads.contains(&0) {
            bail!("--threads must all be at least 1");
        }
        if self.tuples_log2 > 32 {
            bail!("--tuples-log2 {} is too large", self.tuples_log2);
        }
        if self.repeats == 0 {
            bail!("--repeats must be at least 1");
        }
        Ok(())
    }
}

fn sweep<W: Write>(args: &Args, reporter: &mut Reporter<W>) -> Result<()> {
    let pinning = args.pinning();
    let input = generate_input(1usize << args.tuples_log2, args.seed);
    info!("generated {} tuples (seed {})", input.len(), args.seed);

    for &threads in &args.threads {
        for &bits in &args.hash_bits {
            let capacity = partition_capacity(input.len(), 1usize << bits);
            for _ in 0..args.repeats {
                let result = run(args.strategy, &input, threads, bits, capacity, &pinning)
                    .with_context(|| format!("{:?} run with {threads} threads, {bits} hash bits", args.strategy))?;
                debug!(
                    "largest partition {} of {} slots",
                    result.partition_sizes.iter().max().copied().unwrap_or(0),
                    capacity
                );
                reporter.record(Measurement {
                    threads,
                    hash_bits: bits,
                    elapsed: result.elapsed,
                    throughput: result.throughput_mtps(),
                })?;
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    args.validate()?;

    let out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let mut reporter = Reporter::new(args.format, out);
    sweep(&args, &mut reporter)?;
    reporter.finish()?.flush()?;
    Ok(())
}
