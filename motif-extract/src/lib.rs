//! Core module for extracting terminal loop motifs from a collection
//! of RNA secondary structures.
//!
//! Each input record pairs a nucleotide sequence with a dot-bracket
//! annotation of equal length. The extractor peels terminal stem-loops
//! from the inside out and combines sibling stems that meet at a
//! multi-branch junction, emitting single and multi-terminal motifs
//! bounded by a configurable maximum length. Records are independent
//! and processed in parallel; records failing validation are reported
//! and skipped without aborting the batch.

use std::sync::Arc;

pub mod cli;
pub mod core;
pub mod utils;

pub fn lib_motif_extract(args: Arc<Vec<String>>) -> core::BatchOutcome {
    let args = cli::Args::from(args);
    let outcome =
        core::extract_motifs(args).expect("ERROR: Failed to extract terminal motifs");

    return outcome;
}
