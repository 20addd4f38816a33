/// Data layer: observation types, extraction, and aggregation.
///
/// Architecture:
/// ```text
///  perf_stat_*.txt / results.csv / benchmark log
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  Extractor strategy → Vec<Observation>
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ aggregate  │  retain / mean per thread count → SeriesSet
///   └───────────┘
///        │
///        ▼
///     chart (PNG)
/// ```

pub mod aggregate;
pub mod loader;
pub mod model;
