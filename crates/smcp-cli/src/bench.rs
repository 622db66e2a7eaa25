//! smcp Benchmark Binary
//!
//! Measures semantic store operations at different corpus sizes (100, 1,000, 10,000)
//! with the hash embedder.
//! Run with: `cargo run --bin smcp-bench --release`

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use smcp_core::{EmbeddableItem, EntityKind};
use smcp_index::{HashEmbedder, SemanticStore, SharedEmbedder};

const DIMENSION: usize = 384;

// ---------------------------------------------------------------------------
// Synthetic data generation
// ---------------------------------------------------------------------------

const SEARCH_TERMS: &[&str] = &[
    "similarity",
    "embedding",
    "retrieval",
    "prompt",
    "template",
    "deployment",
    "migration",
    "security",
    "testing",
    "pipeline",
    "database",
    "caching",
    "latency",
    "throughput",
    "rollback",
    "monitoring",
    "validation",
    "serialization",
    "concurrency",
    "indexing",
];

const BODY_FRAGMENTS: &[&str] = &[
    "Reference notes on nearest neighbour search over unit-normalised embedding vectors.",
    "A helper that rebuilds the embeddings index from the source-of-truth database.",
    "Checklist for reviewing prompt templates before they are shared with other teams.",
    "Runbook describing rollback steps when a deployment breaks the retrieval pipeline.",
    "Snippet that validates tool payloads and reports serialization errors to the caller.",
    "Design notes on caching query embeddings to cut latency under heavy traffic.",
];

fn generate_item(i: usize) -> EmbeddableItem {
    let kind = if i % 2 == 0 {
        EntityKind::Resource
    } else {
        EntityKind::Tool
    };
    EmbeddableItem {
        kind,
        entity_id: format!("{kind}_{i:08x}"),
        text: format!(
            "{} item {}\n{}\n{},{}",
            kind,
            i,
            BODY_FRAGMENTS[i % BODY_FRAGMENTS.len()],
            SEARCH_TERMS[i % SEARCH_TERMS.len()],
            SEARCH_TERMS[(i + 7) % SEARCH_TERMS.len()],
        ),
    }
}

// ---------------------------------------------------------------------------
// Percentile computation
// ---------------------------------------------------------------------------

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    let idx = if idx == 0 { 0 } else { idx - 1 };
    sorted[idx.min(sorted.len() - 1)]
}

fn summarize(mut latencies: Vec<f64>) -> [f64; 3] {
    latencies.sort_by(f64::total_cmp);
    [
        percentile(&latencies, 50.0),
        percentile(&latencies, 95.0),
        percentile(&latencies, 99.0),
    ]
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn format_duration_us(us: f64) -> String {
    if us >= 1_000_000.0 {
        format!("{:.1} s", us / 1_000_000.0)
    } else if us >= 1_000.0 {
        format!("{:.0} ms", us / 1_000.0)
    } else {
        format!("{:.0} us", us)
    }
}

fn format_throughput(items_per_sec: f64) -> String {
    if items_per_sec >= 1_000_000.0 {
        format!("{:.1}M/s", items_per_sec / 1_000_000.0)
    } else if items_per_sec >= 1_000.0 {
        format!("{:.1}K/s", items_per_sec / 1_000.0)
    } else {
        format!("{:.0}/s", items_per_sec)
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1_024 * 1_024 {
        format!("{:.1} MB", bytes as f64 / (1_024.0 * 1_024.0))
    } else {
        format!("{:.0} KB", bytes as f64 / 1_024.0)
    }
}

fn format_scale(n: usize) -> String {
    if n >= 1_000_000 {
        format!("{}M", n / 1_000_000)
    } else if n >= 1_000 {
        format!("{}K", n / 1_000)
    } else {
        n.to_string()
    }
}

// ---------------------------------------------------------------------------
// Benchmark results
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScaleResult {
    rebuild_items_per_sec: f64,
    upsert_us: [f64; 3],
    search_us: [f64; 3],
    filtered_search_us: [f64; 3],
    reopen_us: f64,
    index_size_bytes: u64,
}

// ---------------------------------------------------------------------------
// Benchmark runner for a single scale
// ---------------------------------------------------------------------------

fn run_benchmark(n: usize) -> anyhow::Result<ScaleResult> {
    let tmp = tempfile::TempDir::new().context("failed to create temp dir")?;
    let index_path = tmp.path().join("vectors.index");
    let embedder: SharedEmbedder = Arc::new(HashEmbedder::new(DIMENSION));
    let mut store = SemanticStore::open(&index_path, Arc::clone(&embedder))?;

    let mut result = ScaleResult::default();

    // --- Bulk rebuild ---
    let items: Vec<EmbeddableItem> = (0..n).map(generate_item).collect();
    let start = Instant::now();
    store.rebuild(&items)?;
    result.rebuild_items_per_sec = n as f64 / start.elapsed().as_secs_f64();

    // --- Incremental upsert (each one rewrites both files) ---
    let num_upserts = 20;
    let mut upserts = Vec::with_capacity(num_upserts);
    for i in 0..num_upserts {
        let item = generate_item(i);
        let text = format!("{} revised {}", item.text, SEARCH_TERMS[(i + 3) % SEARCH_TERMS.len()]);
        let start = Instant::now();
        store.upsert(item.kind, &item.entity_id, &text)?;
        upserts.push(start.elapsed().as_micros() as f64);
    }
    result.upsert_us = summarize(upserts);

    // --- Search ---
    let num_searches = 50;
    let mut searches = Vec::with_capacity(num_searches);
    let mut filtered = Vec::with_capacity(num_searches);
    for i in 0..num_searches {
        let query = SEARCH_TERMS[i % SEARCH_TERMS.len()];
        let start = Instant::now();
        let _ = store.search(query, 10, None)?;
        searches.push(start.elapsed().as_micros() as f64);

        let start = Instant::now();
        let _ = store.search(query, 10, Some(EntityKind::Tool))?;
        filtered.push(start.elapsed().as_micros() as f64);
    }
    result.search_us = summarize(searches);
    result.filtered_search_us = summarize(filtered);

    // --- Reopen from disk ---
    drop(store);
    let start = Instant::now();
    let _reopened = SemanticStore::open(&index_path, embedder)?;
    result.reopen_us = start.elapsed().as_micros() as f64;

    result.index_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);
    Ok(result)
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let scales: &[usize] = &[100, 1_000, 10_000];

    println!();
    println!("smcp Benchmark");
    println!("==============");
    println!(
        "Platform: {} {}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    println!("Embedder: fnv1a-hash-{DIMENSION}");
    println!("Date: {}", Utc::now().format("%Y-%m-%d"));
    println!();

    eprint!("Warming up... ");
    let _ = run_benchmark(10)?;
    eprintln!("done.");

    let mut results: Vec<(usize, ScaleResult)> = Vec::new();
    for &n in scales {
        eprint!("Benchmarking {} items... ", n);
        let start = Instant::now();
        let result = run_benchmark(n)?;
        eprintln!("done in {:.1}s", start.elapsed().as_secs_f64());
        results.push((n, result));
    }

    println!();

    let col0 = 24;
    let colw = 14;

    print!("| {:col0$}", "Operation");
    for &n in scales {
        print!("| {:>colw$}", format!("{} items", format_scale(n)));
    }
    println!("|");

    print!("|{}", "-".repeat(col0 + 1));
    for _ in scales {
        print!("|{}", "-".repeat(colw + 1));
    }
    println!("|");

    print!("| {:col0$}", "Bulk Rebuild");
    for (_, r) in &results {
        print!("| {:>colw$}", format_throughput(r.rebuild_items_per_sec));
    }
    println!("|");

    let latency_rows: [(&str, fn(&ScaleResult) -> [f64; 3]); 3] = [
        ("Upsert", |r: &ScaleResult| r.upsert_us),
        ("Search", |r: &ScaleResult| r.search_us),
        ("Filtered Search", |r: &ScaleResult| r.filtered_search_us),
    ];
    for (label, getter) in latency_rows {
        for (slot, pct) in ["p50", "p95", "p99"].iter().enumerate() {
            print!("| {:col0$}", format!("{label} ({pct})"));
            for (_, r) in &results {
                print!("| {:>colw$}", format_duration_us(getter(r)[slot]));
            }
            println!("|");
        }
    }

    print!("| {:col0$}", "Reopen");
    for (_, r) in &results {
        print!("| {:>colw$}", format_duration_us(r.reopen_us));
    }
    println!("|");

    print!("| {:col0$}", "Index Size");
    for (_, r) in &results {
        print!("| {:>colw$}", format_size(r.index_size_bytes));
    }
    println!("|");

    println!();
    Ok(())
}
