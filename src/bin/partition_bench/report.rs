use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use clap::ValueEnum;

// ---------------------------------------------------------------------------
// Output formats consumed by `partition-charts`
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// `Threads: N, Hash Bits: M, Throughput: X MTuple/s`, one line per run
    Log,
    /// `threads,hash_bits,throughput` table, one row per configuration (mean of repeats)
    Csv,
    /// `Partitioning completed in N ms.` plus a throughput line, per run
    Summary,
}

/// One measured configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub threads: usize,
    pub hash_bits: u32,
    pub elapsed: Duration,
    /// Millions of tuples per second.
    pub throughput: f64,
}

pub fn log_line(m: &Measurement) -> String {
    format!(
        "Threads: {}, Hash Bits: {}, Throughput: {:.4} MTuple/s",
        m.threads, m.hash_bits, m.throughput
    )
}

pub fn summary_lines(m: &Measurement) -> String {
    format!(
        "Partitioning completed in {} ms.\nThroughput: {:.4} million tuples per second.",
        m.elapsed.as_millis(),
        m.throughput
    )
}

/// Collapse repeated runs of a configuration into their mean, keeping the
/// order in which configurations were first measured.
pub fn mean_per_configuration(runs: &[Measurement]) -> Vec<Measurement> {
    let mut out: Vec<(Measurement, u32)> = Vec::new();
    for m in runs {
        match out
            .iter_mut()
            .find(|(acc, _)| acc.threads == m.threads && acc.hash_bits == m.hash_bits)
        {
            Some((acc, n)) => {
                acc.elapsed += m.elapsed;
                acc.throughput += m.throughput;
                *n += 1;
            }
            None => out.push((*m, 1)),
        }
    }
    out.into_iter()
        .map(|(mut acc, n)| {
            acc.elapsed /= n;
            acc.throughput /= n as f64;
            acc
        })
        .collect()
}

/// Streams measurements as they are taken, except CSV which is written
/// once every repeat of the sweep is known.
pub struct Reporter<W: Write> {
    format: Format,
    out: W,
    runs: Vec<Measurement>,
}

impl<W: Write> Reporter<W> {
    pub fn new(format: Format, out: W) -> Self {
        Reporter {
            format,
            out,
            runs: Vec::new(),
        }
    }

    pub fn record(&mut self, m: Measurement) -> Result<()> {
        match self.format {
            Format::Log => writeln!(self.out, "{}", log_line(&m))?,
            Format::Summary => writeln!(self.out, "{}", summary_lines(&m))?,
            Format::Csv => {}
        }
        self.out.flush()?;
        self.runs.push(m);
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        let Reporter { format, out, runs } = self;
        if format != Format::Csv {
            return Ok(out);
        }
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(["threads", "hash_bits", "throughput"])?;
        for m in mean_per_configuration(&runs) {
            writer.write_record([
                m.threads.to_string(),
                m.hash_bits.to_string(),
                format!("{:.4}", m.throughput),
            ])?;
        }
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("finishing CSV output: {}", e.error()))
    }
}
