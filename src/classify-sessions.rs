use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use tracegraph::{classify, features, record, session::aggregate};

/// Clustering and classification experiments over the session features:
/// can byte/packet/timing signatures alone separate TCP from UDP?
#[derive(Parser, Debug)]
#[clap(about = "Clustering/classification experiments over session features")]
struct Opts {
    /// Directory holding the extracted record file (pcap.jsonl).
    #[clap(short, long, default_value = "data", parse(from_os_str))]
    data_dir: PathBuf,
    /// Seed for the clustering run.
    #[clap(long, default_value = "42")]
    seed: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();
    let opts = Opts::parse();

    let jsonl_path = opts.data_dir.join("pcap.jsonl");
    let (records, skipped) = record::read_jsonl(&jsonl_path)?;
    if skipped > 0 {
        warn!("{skipped} unreadable lines in {}", jsonl_path.display());
    }

    let sessions = aggregate(&records);
    let feature_vectors = features::from_sessions(&sessions);
    info!(
        "{} records -> {} sessions -> {} labelled feature vectors",
        records.len(),
        sessions.len(),
        feature_vectors.len(),
    );

    match classify::cluster_by_protocol(&feature_vectors, opts.seed) {
        Ok(outcome) => {
            println!("k-means (k=2, seed {}):", opts.seed);
            println!(
                "  cluster/protocol agreement: {:.1}%",
                outcome.agreement * 100.0
            );
        }
        Err(reason) => warn!("clustering skipped: {reason}"),
    }

    match classify::train_decision_tree(&feature_vectors) {
        Ok(evaluation) => {
            println!(
                "decision tree ({} train / {} test):",
                evaluation.train_size, evaluation.test_size
            );
            println!("  accuracy: {:.1}%", evaluation.accuracy * 100.0);
            println!("  confusion (rows = truth TCP,UDP; cols = predicted):");
            for row in evaluation.confusion {
                println!("    {:>6} {:>6}", row[0], row[1]);
            }
        }
        Err(reason) => warn!("classification skipped: {reason}"),
    }

    Ok(())
}
