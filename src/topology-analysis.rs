use std::{fs, path::PathBuf, time::Instant};

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use tracegraph::{
    plot, record,
    session::{aggregate, aggregate_parallel, SessionMap},
    topology::TopologyGraph,
    Protocol,
};

/// Build the TCP and UDP host graphs from the extracted records and
/// report their topology statistics, with plots.
#[derive(Parser, Debug)]
#[clap(about = "Topology analysis of the TCP and UDP session graphs")]
struct Opts {
    /// Directory holding the extracted record file (pcap.jsonl).
    #[clap(short, long, default_value = "data", parse(from_os_str))]
    data_dir: PathBuf,
    /// Directory the plots are written into.
    #[clap(short, long, default_value = "images", parse(from_os_str))]
    images_dir: PathBuf,
    /// Aggregate in parallel over this many chunks (1 = sequential).
    #[clap(short, long, default_value = "1")]
    jobs: usize,
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
    info!("{} records loaded", records.len());

    let started = Instant::now();
    let sessions: SessionMap = if opts.jobs > 1 {
        let chunk_size = (records.len() + opts.jobs - 1) / opts.jobs.max(1);
        aggregate_parallel(&records, chunk_size.max(1))
    } else {
        aggregate(&records)
    };
    info!(
        "{} sessions aggregated in {:.2?} ({} job(s))",
        sessions.len(),
        started.elapsed(),
        opts.jobs,
    );

    fs::create_dir_all(&opts.images_dir)
        .with_context(|| format!("unable to create {}", opts.images_dir.display()))?;

    let mut per_protocol = Vec::new();
    for protocol in [Protocol::Tcp, Protocol::Udp] {
        let graph = TopologyGraph::from_sessions(&sessions, protocol);
        let components = graph.connected_components();

        println!("=================================================================");
        println!("{protocol} network");
        println!("-----------------------------------------------------------------");
        println!("hosts     : {}", graph.node_count());
        println!("sessions  : {}", graph.edge_count());
        println!("components: {}", components.len());
        match graph.diameter() {
            Some(diameter) => println!("diameter  : {diameter}"),
            None => println!("diameter  : n/a"),
        }
        match graph.clustering_coefficient() {
            Some(coefficient) => println!("clustering: {coefficient:.4}"),
            None => println!("clustering: n/a"),
        }

        match graph.largest_component() {
            Some(hosts) => {
                println!("largest component: {} hosts", hosts.len());
                let name = format!("{}_largest_component.png", protocol.to_string().to_lowercase());
                let out = opts.images_dir.join(name);
                plot::component_plot(
                    &graph,
                    &hosts,
                    &format!("{protocol} largest component"),
                    &out,
                )
                .map_err(|e| anyhow::anyhow!(e))?;
                info!("wrote {}", out.display());
            }
            None => warn!("no {protocol} sessions, skipping the largest-component plot"),
        }
        println!();

        let sizes: Vec<usize> = components.iter().map(|c| c.len()).collect();
        per_protocol.push((graph.degree_distribution(), sizes));
    }
    let (tcp, udp) = (&per_protocol[0], &per_protocol[1]);

    let degree_out = opts.images_dir.join("degree_distribution.png");
    plot::degree_distribution_plot(&tcp.0, &udp.0, &degree_out)
        .map_err(|e| anyhow::anyhow!(e))?;
    info!("wrote {}", degree_out.display());

    let sizes_out = opts.images_dir.join("component_sizes.png");
    plot::component_size_plot(&tcp.1, &udp.1, &sizes_out).map_err(|e| anyhow::anyhow!(e))?;
    info!("wrote {}", sizes_out.display());

    Ok(())
}
