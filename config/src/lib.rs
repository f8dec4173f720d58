use dashmap::DashMap;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// numeric values
pub const MIN_THREADS: usize = 1;
pub const DEFAULT_MAX_LENGTH: usize = 134;

// alphabets
pub const NUCLEOTIDES: &[u8] = b"ACGTUN";
pub const OPEN_BRACKET: u8 = b'(';
pub const CLOSE_BRACKET: u8 = b')';
pub const UNPAIRED: u8 = b'.';

// file names
pub const MOTIFS: &str = "motifs.fa";
pub const SKIPPED: &str = "skipped.txt";
pub const MOTIF_DESCRIPTOR: &str = "motifs.json";

// accepted input extensions
pub const INPUT_EXTENSIONS: [&str; 3] = ["fa", "fasta", "txt"];

// os
#[cfg(not(windows))]
const TICK_SETTINGS: (&str, u64) = ("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ", 80);
#[cfg(windows)]
const TICK_SETTINGS: (&str, u64) = (r"+-x| ", 200);

/// return a pre-configured progress bar
pub fn get_progress_bar(length: u64, msg: &str) -> ProgressBar {
    let progressbar_style = ProgressStyle::default_spinner()
        .tick_chars(TICK_SETTINGS.0)
        .template(" {spinner} {msg:<30} {wide_bar} ETA {eta_precise} ")
        .expect("no template error");

    let progress_bar = ProgressBar::new(length);

    progress_bar.set_style(progressbar_style);
    progress_bar.enable_steady_tick(Duration::from_millis(TICK_SETTINGS.1));
    progress_bar.set_message(msg.to_owned());

    progress_bar
}

/// write per-record summaries to a JSON descriptor file,
/// keys sorted so reruns produce identical files
pub fn write_descriptor<T, P>(descriptor: &DashMap<String, T>, path: P)
where
    T: Serialize,
    P: AsRef<Path>,
{
    let map = descriptor
        .iter()
        .map(|entry| {
            let value = serde_json::to_value(entry.value())
                .unwrap_or_else(|e| panic!("Error serializing descriptor: {}", e));
            (entry.key().to_owned(), value)
        })
        .collect::<BTreeMap<String, serde_json::Value>>();

    let f = match File::create(path.as_ref()) {
        Ok(f) => f,
        Err(e) => panic!("Error creating file: {}", e),
    };
    let mut writer = BufWriter::new(f);

    serde_json::to_writer_pretty(&mut writer, &map).unwrap_or_else(|e| {
        panic!("Error writing descriptor: {}", e);
    });
    writer.flush().unwrap_or_else(|e| {
        panic!("Error flushing descriptor: {}", e);
    });

    log::info!("Descriptor written to {:?}", path.as_ref());
}

/// argument checker for all subcommands
pub trait ArgCheck {
    fn check(&self) -> Result<(), CliError> {
        self.validate_args()
    }

    fn validate_args(&self) -> Result<(), CliError> {
        if self.get_input().is_empty() {
            let err = "No input files provided".to_string();
            return Err(CliError::InvalidInput(err));
        }
        for file in self.get_input() {
            validate(file)?;
        }

        Ok(())
    }

    fn get_input(&self) -> &Vec<PathBuf>;
}

/// error handling for CLI
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// argument validation
pub fn validate(arg: &PathBuf) -> Result<(), CliError> {
    if !arg.exists() {
        return Err(CliError::InvalidInput(format!("{:?} does not exist", arg)));
    }

    if !arg.is_file() {
        return Err(CliError::InvalidInput(format!("{:?} is not a file", arg)));
    }

    match arg.extension() {
        Some(ext) if INPUT_EXTENSIONS.iter().any(|e| ext == *e) => (),
        _ => {
            return Err(CliError::InvalidInput(format!(
                "file {:?} is not a FASTA file",
                arg
            )))
        }
    }

    match std::fs::metadata(arg) {
        Ok(metadata) if metadata.len() == 0 => {
            Err(CliError::InvalidInput(format!("file {:?} is empty", arg)))
        }
        Ok(_) => Ok(()),
        Err(e) => Err(CliError::IoError(e)),
    }
}
