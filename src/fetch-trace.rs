use std::path::PathBuf;

use clap::Parser;
use log::info;

use tracegraph::acquire;

/// Download the trace archive and unpack it into the data directory.
#[derive(Parser, Debug)]
#[clap(about = "Download the trace archive and unpack it into the data directory")]
struct Opts {
    /// Remote archive location.
    #[clap(long, env = "TRACE_URL")]
    url: String,
    /// File name for the downloaded archive inside the data directory.
    #[clap(short, long, default_value = "trace.7z")]
    output: String,
    /// Directory the trace is unpacked into.
    #[clap(short, long, default_value = "data", parse(from_os_str))]
    data_dir: PathBuf,
    /// Overwrite an already-downloaded archive.
    #[clap(long)]
    force: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();
    let opts = Opts::parse();

    let archive = opts.data_dir.join(&opts.output);
    acquire::download(&opts.url, &archive, opts.force)?;
    acquire::extract(&archive, &opts.data_dir)?;
    info!("trace ready under {}", opts.data_dir.display());

    Ok(())
}
