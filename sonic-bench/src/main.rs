//! # Bulk Ingestion Benchmark
//!
//! Purpose: Measure `bulk_push`/`bulk_pop` throughput against a running
//! server so pool sizing and parallelism can be compared over time.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: Records come from a fixed-seed PRNG.
//! 2. **Allocation Control**: Records are built before the clock starts.
//! 3. **Positional Arguments**:
//!    `sonic-bench [records] [parallelism] [words] [config.json]`, where the
//!    optional JSON file holds a `ClientConfig`.

use std::env;
use std::fs;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sonic_client::{ClientConfig, IngestBulkError, IngestBulkRecord, IngestClient, Lang};

const DEFAULT_RECORD_COUNT: usize = 10_000;
const DEFAULT_PARALLELISM: usize = 8;
const DEFAULT_WORDS_PER_RECORD: usize = 12;

const COLLECTION: &str = "bench";
const BUCKET: &str = "default";

const VOCABULARY: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india", "juliet",
    "kilo", "lima", "mike", "november", "oscar", "papa", "quebec", "romeo", "sierra", "tango",
    "uniform", "victor", "whiskey", "xray", "yankee", "zulu",
];

struct BenchConfig {
    record_count: usize,
    parallelism: usize,
    words_per_record: usize,
    client: ClientConfig,
}

impl BenchConfig {
    fn from_args() -> anyhow::Result<Self> {
        let mut args = env::args().skip(1);
        let record_count = parse_usize(args.next(), DEFAULT_RECORD_COUNT);
        let parallelism = parse_usize(args.next(), DEFAULT_PARALLELISM);
        let words_per_record = parse_usize(args.next(), DEFAULT_WORDS_PER_RECORD).max(1);

        let client = match args.next() {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config {path}"))?;
                serde_json::from_str(&raw).with_context(|| format!("invalid config {path}"))?
            }
            None => ClientConfig::default(),
        };

        Ok(BenchConfig {
            record_count,
            parallelism,
            words_per_record,
            client,
        })
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

/// XorShift keeps the generated corpus identical between runs.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }
}

fn build_records(count: usize, words: usize, seed: u64) -> Vec<IngestBulkRecord> {
    let mut rng = XorShift64::new(seed);
    (0..count)
        .map(|i| {
            let text = (0..words)
                .map(|_| rng.pick(VOCABULARY))
                .collect::<Vec<_>>()
                .join(" ");
            IngestBulkRecord::new(format!("obj:{i}"), text)
        })
        .collect()
}

fn report(label: &str, ops: usize, failures: &[IngestBulkError], elapsed: Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let micros_per_op = (secs * 1e6) / (ops.max(1) as f64);
    println!(
        "{label}: {ops} records in {secs:.3}s ({ops_per_sec:.0} records/s, {micros_per_op:.1} us/record), {} failed",
        failures.len()
    );
    if let Some(first) = failures.first() {
        warn!(operation = label, object = %first.object, error = %first.error, "first failure");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = BenchConfig::from_args()?;
    config.client.validate()?;

    let records = build_records(config.record_count, config.words_per_record, 0xA5A5_A5A5_A5A5_A5A5);
    let ingest = IngestClient::connect(&config.client).with_context(|| {
        format!("failed to connect to {}:{}", config.client.host, config.client.port)
    })?;

    info!(
        records = config.record_count,
        parallelism = config.parallelism,
        words = config.words_per_record,
        "starting bulk benchmark"
    );
    println!(
        "records={}, parallelism={}, words_per_record={}, pool_max_idle={}",
        config.record_count, config.parallelism, config.words_per_record, config.client.pool_max_idle
    );

    let start = Instant::now();
    let failures = ingest.bulk_push(COLLECTION, BUCKET, config.parallelism, &records, &Lang::AUTO_DETECT);
    report("PUSH", records.len(), &failures, start.elapsed());

    let start = Instant::now();
    let failures = ingest.bulk_pop(COLLECTION, BUCKET, config.parallelism, &records);
    report("POP", records.len(), &failures, start.elapsed());

    ingest.quit()?;
    Ok(())
}
