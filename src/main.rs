mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rusty-hyperseg")]
#[command(version, about = "Hyperspectral band viewer and segmentation compositor", long_about = None)]
struct Cli {
    /// Engine config (JSON); unspecified fields keep their defaults
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print cube dimensions, wavelengths and the whole-cube signature range
    Info {
        /// Cube file (.hdr, raw, .json) or folder
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },

    /// Render one band to an 8-bit PNG
    Render {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Band index
        #[arg(short, long, default_value = "0")]
        band: usize,

        /// Regions JSON; when given the band is rendered segmented
        #[arg(short, long, value_name = "FILE")]
        regions: Option<PathBuf>,

        /// Output PNG
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },

    /// Write mean spectral signatures of the regions and the whole cube
    Signatures {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        regions: PathBuf,

        /// Output CSV
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,

        /// Also write the signatures as Parquet
        #[arg(long, value_name = "FILE")]
        parquet: Option<PathBuf>,
    },

    /// Segment the regions and print quality metrics as JSON
    Segment {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        regions: PathBuf,

        /// Band shown to the segmenter
        #[arg(short, long, default_value = "0")]
        band: usize,

        /// Write the metrics JSON here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Segment and write every export artefact to a folder
    Export {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(short, long, value_name = "FILE")]
        regions: Option<PathBuf>,

        #[arg(short, long, default_value = "0")]
        band: usize,

        /// Output folder
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,

        /// Skip segmentation; export signatures and metadata only
        #[arg(long)]
        no_segment: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    app::run(cli.command, cli.config.as_deref())
}
