use clap::Parser;
use config::{ArgCheck, DEFAULT_MAX_LENGTH};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
pub struct Args {
    #[arg(
        short = 'i',
        long = "input",
        required = true,
        value_name = "PATHS",
        value_delimiter = ',',
        num_args = 1..,
        help = "Paths to FASTA files with sequence and dot-bracket structure lines, delimited by comma"
    )]
    pub input: Vec<PathBuf>,

    #[arg(
        short = 'o',
        long = "outdir",
        value_name = "PATH",
        default_value = ".",
        help = "Directory where motifs.fa, skipped.txt and motifs.json are written"
    )]
    pub outdir: PathBuf,

    #[arg(
        short = 'L',
        long = "max-length",
        value_name = "LENGTH",
        default_value_t = DEFAULT_MAX_LENGTH,
        help = "Maximum motif length; longer candidates are dropped, never truncated"
    )]
    pub max_length: usize,

    #[arg(
        short = 't',
        long = "threads",
        help = "Number of threads",
        value_name = "THREADS",
        default_value_t = num_cpus::get()
    )]
    pub threads: usize,

    #[arg(
        short = 'c',
        long = "collapse",
        help = "Flag to replace sibling single motifs with their accepted multi-terminal motif",
        value_name = "FLAG",
        default_value = "false"
    )]
    pub collapse: bool,

    #[arg(
        long = "in-memory",
        help = "Flag to keep results in memory and skip writing output files",
        value_name = "FLAG",
        default_value = "false"
    )]
    pub in_memory: bool,
}

impl ArgCheck for Args {
    fn get_input(&self) -> &Vec<PathBuf> {
        &self.input
    }
}

impl From<Arc<Vec<String>>> for Args {
    fn from(args: Arc<Vec<String>>) -> Self {
        let argv = std::iter::once("motif-extract".to_string()).chain(args.iter().cloned());
        Args::parse_from(argv)
    }
}
