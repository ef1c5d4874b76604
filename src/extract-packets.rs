use std::{fs, path::PathBuf, time::Instant};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use tracegraph::{
    capture::{CaptureReader, PcapFileReader, TsharkReader},
    record,
};

/// Project every pcap in the data directory into flat packet records,
/// stored as one shared JSONL file plus one CSV table per trace.
#[derive(Parser, Debug)]
#[clap(about = "Extract per-packet records from every pcap in the data directory")]
struct Opts {
    /// Directory holding the extracted pcap files.
    #[clap(short, long, default_value = "data", parse(from_os_str))]
    data_dir: PathBuf,
    /// Read the pcap natively instead of shelling out to tshark.
    #[clap(long)]
    native: bool,
    /// Overwrite an existing record file.
    #[clap(long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();
    let opts = Opts::parse();

    let reader: Box<dyn CaptureReader> = if opts.native {
        Box::new(PcapFileReader)
    } else {
        Box::new(TsharkReader)
    };

    let mut pcaps: Vec<PathBuf> = fs::read_dir(&opts.data_dir)
        .with_context(|| format!("unable to read {}", opts.data_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map_or(false, |ext| ext == "pcap"))
        .collect();
    pcaps.sort();

    if pcaps.is_empty() {
        warn!("no pcap files under {}", opts.data_dir.display());
        return Ok(());
    }

    let jsonl_path = opts.data_dir.join("pcap.jsonl");
    if jsonl_path.exists() && !opts.force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            jsonl_path.display()
        );
    }
    let mut jsonl = fs::File::create(&jsonl_path)
        .with_context(|| format!("unable to create {}", jsonl_path.display()))?;

    for pcap in pcaps {
        info!("reading {}", pcap.display());
        let started = Instant::now();
        let extraction = reader.read(&pcap)?;
        let elapsed = started.elapsed();

        info!(
            "{}: {} records in {:.2?}, {} skipped",
            pcap.display(),
            extraction.records.len(),
            elapsed,
            extraction.skipped,
        );
        if extraction.skipped > 0 {
            warn!("{} unparseable packets were skipped", extraction.skipped);
        }

        record::write_jsonl(&mut jsonl, &extraction.records)?;

        let csv_path = pcap.with_extension("csv");
        record::write_csv(&csv_path, &extraction.records)?;
        info!("wrote {}", csv_path.display());
    }

    info!("records stored in {}", jsonl_path.display());
    Ok(())
}
