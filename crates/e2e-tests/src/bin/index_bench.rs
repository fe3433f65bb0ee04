use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use e2e_tests::{init_tracing, random_entries};
use memory_index::{search_linear, IndexCoordinator, SearchQuery, Tokenizer};
use memory_types::{IndexConfig, MemoryEntry, PrivacyLevel};

const DEFAULT_ITERATIONS: usize = 5;
const QUERIES_PER_ITERATION: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "index_bench", about = "Memory index build/search/snapshot benchmark")]
struct Args {
    #[arg(long, value_enum, default_value = "small")]
    tier: DatasetTier,
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,
    /// Directory for latest.json / latest.txt; printed only when omitted
    #[arg(long)]
    out_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DatasetTier {
    Small,
    Medium,
    Large,
}

impl DatasetTier {
    fn entry_count(self) -> usize {
        match self {
            DatasetTier::Small => 1_000,
            DatasetTier::Medium => 10_000,
            DatasetTier::Large => 50_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StepMetrics {
    p50_ms: f64,
    p90_ms: f64,
    max_ms: f64,
    samples: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct BenchmarkOutput {
    tier: DatasetTier,
    entries: usize,
    iterations: usize,
    generated_at: String,
    steps: BTreeMap<String, StepMetrics>,
}

#[derive(Default)]
struct SampleCollector {
    durations: BTreeMap<String, Vec<f64>>,
}

impl SampleCollector {
    fn time<R>(&mut self, step: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(step, start);
        result
    }

    fn record(&mut self, step: &str, start: Instant) {
        self.durations
            .entry(step.to_string())
            .or_default()
            .push(start.elapsed().as_secs_f64() * 1000.0);
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();
    let args = Args::parse();
    let entries = random_entries(args.seed, args.tier.entry_count());
    let queries = bench_queries();
    let config = IndexConfig::default().with_max_memory_mb(1024);
    let tokenizer = Tokenizer::from_config(&config);

    let mut collector = SampleCollector::default();
    for _ in 0..args.iterations {
        run_iteration(&mut collector, &config, &tokenizer, &entries, &queries).await?;
    }

    let output = BenchmarkOutput {
        tier: args.tier,
        entries: entries.len(),
        iterations: args.iterations,
        generated_at: Utc::now().to_rfc3339(),
        steps: build_metrics(&collector),
    };
    let table = render_table(&output);
    println!("{table}");

    if let Some(out_dir) = &args.out_dir {
        let json = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
        write_outputs(out_dir, &json, &table)?;
    }
    Ok(())
}

async fn run_iteration(
    collector: &mut SampleCollector,
    config: &IndexConfig,
    tokenizer: &Tokenizer,
    entries: &[MemoryEntry],
    queries: &[SearchQuery],
) -> Result<(), String> {
    let coordinator = IndexCoordinator::new(config.clone());

    let start = Instant::now();
    coordinator
        .build_index(entries.to_vec())
        .await
        .map_err(|e| e.to_string())?;
    collector.record("build", start);

    collector.time("search_indexed", || {
        for query in queries.iter().cycle().take(QUERIES_PER_ITERATION) {
            coordinator.search(query, entries);
        }
    });
    collector.time("search_linear", || {
        for query in queries.iter().cycle().take(QUERIES_PER_ITERATION) {
            search_linear(entries, query, tokenizer);
        }
    });

    let bytes = collector
        .time("serialize", || coordinator.serialize())
        .map_err(|e| e.to_string())?;

    let restored = IndexCoordinator::new(config.clone());
    let start = Instant::now();
    restored
        .deserialize(&bytes, entries.to_vec())
        .await
        .map_err(|e| e.to_string())?;
    collector.record("deserialize", start);

    Ok(())
}

fn bench_queries() -> Vec<SearchQuery> {
    vec![
        SearchQuery::new().with_tags(["work"]),
        SearchQuery::new().with_content("database migration"),
        SearchQuery::new().with_privacy(PrivacyLevel::Sensitive),
        SearchQuery::new()
            .with_tags(["urgent"])
            .with_content("release checklist"),
        SearchQuery::new()
            .with_date_from(e2e_tests::day(5))
            .with_date_to(e2e_tests::day(12)),
    ]
}

fn build_metrics(collector: &SampleCollector) -> BTreeMap<String, StepMetrics> {
    collector
        .durations
        .iter()
        .map(|(step, durations)| {
            let mut sorted = durations.clone();
            sorted.sort_by(f64::total_cmp);
            let metrics = StepMetrics {
                p50_ms: percentile(&sorted, 50.0),
                p90_ms: percentile(&sorted, 90.0),
                max_ms: sorted.last().copied().unwrap_or(0.0),
                samples: sorted.len(),
            };
            (step.clone(), metrics)
        })
        .collect()
}

/// Linear-interpolated percentile over sorted samples.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0) * (sorted.len() as f64 - 1.0);
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    sorted[low] + (sorted[high] - sorted[low]) * (rank - low as f64)
}

fn render_table(output: &BenchmarkOutput) -> String {
    let mut lines = vec![
        format!(
            "Index benchmark (tier={:?}, entries={}, iterations={})",
            output.tier, output.entries, output.iterations
        ),
        "step\tp50_ms\tp90_ms\tmax_ms".to_string(),
    ];
    for (step, m) in &output.steps {
        lines.push(format!(
            "{step}\t{:.2}\t{:.2}\t{:.2}",
            m.p50_ms, m.p90_ms, m.max_ms
        ));
    }
    lines.join("\n")
}

fn write_outputs(out_dir: &Path, json: &str, table: &str) -> Result<(), String> {
    fs::create_dir_all(out_dir).map_err(|e| format!("Failed to create out dir: {e}"))?;
    fs::write(out_dir.join("latest.json"), json).map_err(|e| e.to_string())?;
    fs::write(out_dir.join("latest.txt"), table).map_err(|e| e.to_string())?;
    Ok(())
}
