use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Report host and process facts")]
pub struct Args {
    /// Process to report on. Defaults to this process.
    #[arg(short, long)]
    pub pid: Option<u32>,

    /// Pages to allocate and probe for residency (0 disables the probe).
    #[arg(short = 'n', long, default_value_t = 4)]
    pub probe_pages: usize,

    /// Emit the report as one JSON document.
    #[arg(short, long)]
    pub json: bool,
}
