use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::warn;

use tracegraph::summary;

/// Print trace-level statistics for every pcap in the data directory.
#[derive(Parser, Debug)]
#[clap(about = "Print capture statistics for every pcap in the data directory")]
struct Opts {
    /// Directory holding the extracted pcap files.
    #[clap(short, long, default_value = "data", parse(from_os_str))]
    data_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();
    let opts = Opts::parse();

    let mut pcaps: Vec<PathBuf> = std::fs::read_dir(&opts.data_dir)
        .with_context(|| format!("unable to read {}", opts.data_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().map_or(false, |ext| ext == "pcap"))
        .collect();
    pcaps.sort();

    if pcaps.is_empty() {
        warn!("no pcap files under {}", opts.data_dir.display());
        return Ok(());
    }

    for pcap in pcaps {
        let stats = summary::capinfos(&pcap)?;
        println!("=================================================================");
        println!("{}", pcap.display());
        println!("-----------------------------------------------------------------");
        println!("packets            : {}", stats.packets);
        println!("data bytes         : {}", stats.data_bytes);
        println!("duration           : {:.3} s", stats.duration_secs);
        println!("average data rate  : {:.2} bits/s", stats.data_rate_bits_per_sec);
        println!("average packet size: {:.2} bytes", stats.mean_packet_size);
        println!();
    }

    Ok(())
}
