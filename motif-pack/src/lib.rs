use std::fmt::Debug;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use config::get_progress_bar;
use hashbrown::HashSet;
use log::{info, warn};
use rayon::prelude::*;

pub mod record;
pub use record::{validate_pair, PairTable, RawRecord, Record, StructureError};

fn reader<P: AsRef<Path> + Debug>(file: P) -> Result<String, Box<dyn std::error::Error>> {
    let mut file = File::open(file)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

pub fn par_reader<P: AsRef<Path> + Debug + Sync + Send>(
    files: Vec<P>,
) -> Result<String, anyhow::Error> {
    let contents: Vec<String> = files
        .par_iter()
        .map(|path| reader(path).unwrap_or_else(|e| panic!("Error reading file: {:?}", e)))
        .collect();

    Ok(contents.concat())
}

/// Parses FASTA-with-structure contents into raw records.
///
/// Each record occupies a '>' header line, a nucleotide line and a
/// dot-bracket line; blocks missing one of the three are warned and
/// skipped. Validation of the surviving triples is the caller's job,
/// so per-record failures can be reported alongside results.
pub fn parse_fasta(contents: &str) -> Result<Vec<RawRecord>, anyhow::Error> {
    let blocks = contents
        .split('>')
        .filter(|block| !block.trim().is_empty())
        .collect::<Vec<_>>();

    let pb = get_progress_bar(blocks.len() as u64, "Parsing records...");
    let records = blocks
        .par_iter()
        .filter_map(|&block| {
            let record = RawRecord::from_block(block)
                .map_err(|e| warn!("{} from: {}", e, block.lines().next().unwrap_or("")))
                .ok();
            pb.inc(1);
            record
        })
        .collect::<Vec<_>>();
    pb.finish_and_clear();

    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.id.as_str()) {
            warn!("Duplicated record name: {}", record.id);
        }
    }
    drop(seen);

    match records.is_empty() {
        true => {
            anyhow::bail!("Input provided but no records found!")
        }
        false => {
            info!("Parsed {} records!", records.len());

            Ok(records)
        }
    }
}
