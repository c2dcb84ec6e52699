use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use kairos::parser::TableFormat;
use kairos::KairosEngine;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Tsv,
}

impl From<Format> for TableFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Csv => TableFormat::Delimited,
            Format::Tsv => TableFormat::Spreadsheet,
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Tabular dataset with a timestamp column
    #[clap(long)]
    file: PathBuf,

    #[clap(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Timestamp to search for, e.g. "2023-01-03 00:00"
    #[clap(long)]
    query: Option<String>,

    /// Index to query (kd_tree, ball_tree, knn_euclidean, knn_manhattan, lsh)
    #[clap(long, default_value = "ball_tree")]
    index: String,

    #[clap(short, default_value_t = 5)]
    k: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,kairos=info");
    }
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let engine = KairosEngine::new();
    let bytes = std::fs::read(&args.file)?;
    let summary = engine.load_dataset(&bytes, args.format.into())?;

    println!(
        "Loaded {} records ({} invalid timestamps removed)",
        summary.accepted, summary.dropped
    );
    if let Some((min, max)) = summary.range {
        println!("Time range: {min} to {max}");
    }

    if let Some(query) = &args.query {
        let outcome = engine.search(query, &args.index, args.k)?;
        println!(
            "Query {} via '{}' took {:.3} ms",
            outcome.query_timestamp, args.index, outcome.elapsed_ms
        );
        println!("{}", serde_json::to_string_pretty(&outcome.hits)?);
    }

    Ok(())
}
