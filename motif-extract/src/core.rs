//! Core module for extracting terminal loop motifs from RNA secondary
//! structures in dot-bracket notation.
//!
//! Each record is peeled from the inside out: the innermost hairpin
//! stems are located, emitted as single-terminal motifs, overwritten
//! with dots, and the scan repeats on the enclosing levels until no
//! pairs remain. Sibling stems resolved under the same multi-branch
//! junction in one pass are additionally combined into a multi-terminal
//! motif. Every candidate passes a length threshold before it is kept.
//! Records are independent, so the batch is processed in parallel with
//! one result slot per record.

use anyhow::Result;
use dashmap::DashMap;
use hashbrown::HashMap;
use log::info;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::cli::Args;
use crate::utils::{write_motifs, write_skips, ParallelCounter};

use config::{
    get_progress_bar, write_descriptor, CLOSE_BRACKET, MOTIFS, MOTIF_DESCRIPTOR, OPEN_BRACKET,
    SKIPPED, UNPAIRED,
};
use motif_pack::{par_reader, parse_fasta, PairTable, Record, StructureError};

/// Granularity of an extracted motif
///
/// * Single: one terminal stem-loop (a hairpin and its closing stem)
/// * Multi: sibling terminal stem-loops under one junction, linkers included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotifKind {
    Single,
    Multi,
}

impl std::fmt::Display for MotifKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MotifKind::Single => write!(f, "single"),
            MotifKind::Multi => write!(f, "multi"),
        }
    }
}

/// An extracted motif.
///
/// `start` and `end` are 0-indexed, inclusive positions into the source
/// record; `subsequence` and `substructure` are the exact substrings of
/// the record over `[start, end]`. `index` is 1-based and sequential
/// within the record, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Motif {
    pub source_id: String,
    pub index: usize,
    pub kind: MotifKind,
    pub start: usize,
    pub end: usize,
    pub subsequence: String,
    pub substructure: String,
}

/// Per-record extraction summary written to the JSON descriptor
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RecordStats {
    pub length: usize,
    pub passes: usize,
    pub singles: usize,
    pub multis: usize,
    pub rejected: usize,
}

/// fatal for the whole batch, raised before any record is touched
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("invalid configuration: maximum motif length must be greater than zero")]
pub struct ConfigurationError;

/// Validated extraction parameters
///
/// # Example
///
/// ```rust, no_run
/// # use motif_extract::core::ExtractorParams;
/// let params = ExtractorParams::new(134, false).unwrap();
///
/// assert_eq!(params.max_length, 134);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorParams {
    pub max_length: usize,
    pub collapse: bool,
}

impl ExtractorParams {
    pub fn new(max_length: usize, collapse: bool) -> Result<ExtractorParams, ConfigurationError> {
        if max_length == 0 {
            return Err(ConfigurationError);
        }

        Ok(ExtractorParams {
            max_length,
            collapse,
        })
    }
}

/// A candidate span proposed during one pass, before the length filter
#[derive(Debug, PartialEq, Eq)]
enum Candidate {
    SingleTerminal {
        start: usize,
        end: usize,
    },
    MultiTerminal {
        start: usize,
        end: usize,
        members: Vec<usize>,
    },
}

/// Aggregate result of one batch: per-record motif lists in input
/// order, per-record validation errors, and the stats descriptor
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub motifs: Vec<(String, Vec<Motif>)>,
    pub errors: Vec<(String, StructureError)>,
    pub descriptor: DashMap<String, RecordStats>,
}

impl BatchOutcome {
    pub fn num_motifs(&self) -> usize {
        self.motifs.iter().map(|(_, m)| m.len()).sum()
    }
}

/// Extracts terminal motifs from every record in the input files
///
/// # Arguments
///
/// * `args` - The command line arguments
///
/// # Returns
///
/// * `Result<BatchOutcome>` - per-record motifs, errors and stats
///
/// # Example
///
/// ```rust, no_run
/// # use clap::Parser;
/// # use motif_extract::cli::Args;
/// # use motif_extract::core::extract_motifs;
/// let args = Args::parse();
/// let outcome = extract_motifs(args).unwrap();
///
/// assert!(outcome.errors.is_empty());
/// ```
pub fn extract_motifs(args: Args) -> Result<BatchOutcome> {
    info!("Extracting terminal motifs...");

    let params = ExtractorParams::new(args.max_length, args.collapse)?;

    let contents = par_reader(args.input)?;
    let records = parse_fasta(&contents)?;

    let pb = get_progress_bar(records.len() as u64, "Processing...");
    let counter = ParallelCounter::default();

    let per_record = records
        .into_par_iter()
        .map(|raw| {
            let id = raw.id.clone();
            let result =
                Record::try_from(raw).and_then(|record| peel_record(&record, &params));

            match &result {
                Ok((_, stats)) => {
                    counter.inc_singles(stats.singles as u32);
                    counter.inc_multis(stats.multis as u32);
                    counter.inc_rejected(stats.rejected as u32);
                }
                Err(_) => counter.inc_skipped(),
            }

            pb.inc(1);
            (id, result)
        })
        .collect::<Vec<_>>();

    pb.finish_and_clear();

    let mut outcome = BatchOutcome::default();
    for (id, result) in per_record {
        match result {
            Ok((motifs, stats)) => {
                outcome.descriptor.insert(id.clone(), stats);
                outcome.motifs.push((id, motifs));
            }
            Err(e) => outcome.errors.push((id, e)),
        }
    }

    info!(
        "Extracted {} single and {} multi-terminal motifs ({} candidates over the length limit, {} records skipped)",
        counter.num_singles(),
        counter.num_multis(),
        counter.num_rejected(),
        counter.num_skipped(),
    );

    if !args.in_memory {
        write_motifs(&outcome, args.outdir.join(MOTIFS));
        write_skips(&outcome.errors, args.outdir.join(SKIPPED));
        write_descriptor(&outcome.descriptor, args.outdir.join(MOTIF_DESCRIPTOR));
    }

    Ok(outcome)
}

/// Peels one record from the inside out, collecting its motifs
///
/// Per pass: rescan the working structure, extend every leaf pair to
/// its maximal terminal arm, emit pristine arms as single-terminal
/// candidates, combine same-pass siblings under one junction into a
/// multi-terminal candidate, filter by length, then dot-replace every
/// arm so outer levels see the branch as resolved. Terminates once a
/// pass finds no leaf pairs; each pass removes at least one pair.
///
/// # Arguments
///
/// * `record` - The validated record to peel
/// * `params` - Length threshold and coexistence policy
///
/// # Returns
///
/// * The record's motifs in emission order plus its stats entry
pub fn peel_record(
    record: &Record,
    params: &ExtractorParams,
) -> Result<(Vec<Motif>, RecordStats), StructureError> {
    let mut working = record.structure.as_bytes().to_vec();
    let mut extracted = vec![false; working.len()];

    let mut motifs: Vec<Motif> = Vec::new();
    let mut stats = RecordStats {
        length: record.len(),
        ..Default::default()
    };
    let mut index = 1;

    loop {
        let table = PairTable::from_bytes(&working)?;
        if table.leaves().is_empty() {
            break;
        }
        stats.passes += 1;

        let arms = table
            .leaves()
            .iter()
            .map(|&(open, close)| extend_arm(&working, &table, open, close))
            .collect::<Vec<_>>();

        let candidates = propose_candidates(&arms, &extracted, &table);

        // threshold filter: drop, never truncate
        let mut kept: Vec<(MotifKind, usize, usize)> = Vec::new();
        let mut combined: Vec<usize> = Vec::new();

        for candidate in candidates {
            match candidate {
                Candidate::SingleTerminal { start, end } => {
                    if end - start + 1 <= params.max_length {
                        kept.push((MotifKind::Single, start, end));
                    } else {
                        stats.rejected += 1;
                    }
                }
                Candidate::MultiTerminal {
                    start,
                    end,
                    members,
                } => {
                    if end - start + 1 <= params.max_length {
                        combined.extend(members);
                        kept.push((MotifKind::Multi, start, end));
                    } else {
                        stats.rejected += 1;
                    }
                }
            }
        }

        // an accepted multi may supersede its same-pass constituents;
        // indices are assigned afterwards so they stay contiguous
        if params.collapse && !combined.is_empty() {
            kept.retain(|(kind, start, _)| {
                !(matches!(kind, MotifKind::Single) && combined.contains(start))
            });
        }

        for (kind, start, end) in kept {
            motifs.push(build_motif(record, kind, index, start, end));
            index += 1;

            match kind {
                MotifKind::Single => stats.singles += 1,
                MotifKind::Multi => stats.multis += 1,
            }
        }

        // resolve every arm, accepted or rejected, before the next pass
        for &(start, end) in &arms {
            for k in start..=end {
                working[k] = UNPAIRED;
                extracted[k] = true;
            }
        }
    }

    Ok((motifs, stats))
}

/// Extends a leaf pair to its maximal terminal arm.
///
/// Skips dot runs on both flanks and climbs while the flanking brackets
/// are partners of each other, so a whole stem is consumed in one step,
/// bulges and internal loops included. Stops at junctions, where the
/// flanking brackets belong to a sibling branch, and at top level.
fn extend_arm(working: &[u8], table: &PairTable, open: usize, close: usize) -> (usize, usize) {
    let (mut start, mut end) = (open, close);

    loop {
        let mut left = None;
        let mut p = start;
        while p > 0 {
            p -= 1;
            if working[p] != UNPAIRED {
                left = Some(p);
                break;
            }
        }

        let mut right = None;
        let mut q = end + 1;
        while q < working.len() {
            if working[q] != UNPAIRED {
                right = Some(q);
                break;
            }
            q += 1;
        }

        match (left, right) {
            (Some(p), Some(q))
                if working[p] == OPEN_BRACKET
                    && working[q] == CLOSE_BRACKET
                    && table.partner(p) == Some(q) =>
            {
                start = p;
                end = q;
            }
            _ => break,
        }
    }

    (start, end)
}

/// Proposes the pass's candidates: pristine arms as single-terminal
/// motifs, and one multi-terminal motif per junction with two or more
/// sibling arms in this pass, spanning first sibling start to last
/// sibling end. Arms that close over already-extracted positions emit
/// no single candidate, which keeps single motifs disjoint. Top-level
/// arms have no enclosing junction and never combine. Singles come
/// before multis, each ordered by ascending start.
fn propose_candidates(
    arms: &[(usize, usize)],
    extracted: &[bool],
    table: &PairTable,
) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for &(start, end) in arms {
        if extracted[start..=end].iter().any(|&seen| seen) {
            continue;
        }

        candidates.push(Candidate::SingleTerminal { start, end });
    }

    let mut junctions: HashMap<usize, Vec<(usize, usize)>> = HashMap::new();
    for &(start, end) in arms {
        if let Some(parent) = table.parent_of(start) {
            junctions.entry(parent).or_default().push((start, end));
        }
    }

    let mut multis = junctions
        .into_iter()
        .filter(|(_, siblings)| siblings.len() >= 2)
        .map(|(_, mut siblings)| {
            siblings.sort_unstable();

            Candidate::MultiTerminal {
                start: siblings[0].0,
                end: siblings[siblings.len() - 1].1,
                members: siblings.iter().map(|&(start, _)| start).collect(),
            }
        })
        .collect::<Vec<_>>();

    multis.sort_unstable_by_key(|candidate| match candidate {
        Candidate::MultiTerminal { start, .. } => *start,
        Candidate::SingleTerminal { start, .. } => *start,
    });

    candidates.extend(multis);

    candidates
}

#[inline(always)]
fn build_motif(record: &Record, kind: MotifKind, index: usize, start: usize, end: usize) -> Motif {
    Motif {
        source_id: record.id.clone(),
        index,
        kind,
        start,
        end,
        subsequence: record.sequence[start..=end].to_string(),
        substructure: record.structure[start..=end].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile;

    fn record(id: &str, sequence: &str, structure: &str) -> Record {
        Record::new(id.to_string(), sequence.to_string(), structure.to_string()).unwrap()
    }

    fn params(max_length: usize) -> ExtractorParams {
        ExtractorParams::new(max_length, false).unwrap()
    }

    // one three-way junction: three short hairpins under one closing pair
    fn junction_record() -> Record {
        record("j1", "GCAAAGACAAAGACAAAGC", "((...).(...).(...))")
    }

    // two junctions nested under a common root pair
    fn nested_record() -> Record {
        record(
            "n1",
            "GGGAAACGAAACCAGGAAACGAAACCCCC",
            "(((...).(...)).((...).(...)))",
        )
    }

    #[test]
    fn test_single_hairpin_spans_whole_record() {
        let rec = record("r1", "GGGGAAAAACCCC", "((((.....))))");
        let (motifs, stats) = peel_record(&rec, &params(134)).unwrap();

        assert_eq!(motifs.len(), 1);
        assert_eq!(motifs[0].kind, MotifKind::Single);
        assert_eq!(motifs[0].index, 1);
        assert_eq!((motifs[0].start, motifs[0].end), (0, 12));
        assert_eq!(motifs[0].subsequence, "GGGGAAAAACCCC");
        assert_eq!(motifs[0].substructure, "((((.....))))");
        assert_eq!(stats.passes, 1);
    }

    #[test]
    fn test_all_dots_yields_no_motifs() {
        let rec = record("r1", "ACGUA", ".....");
        let (motifs, stats) = peel_record(&rec, &params(134)).unwrap();

        assert!(motifs.is_empty());
        assert_eq!(stats.passes, 0);
    }

    #[test]
    fn test_bulged_stem_extracts_as_one_arm() {
        let rec = record("r1", "GGAGGAAACCCC", "((.((...))))");
        let (motifs, _) = peel_record(&rec, &params(134)).unwrap();

        assert_eq!(motifs.len(), 1);
        assert_eq!((motifs[0].start, motifs[0].end), (0, 11));
    }

    #[test]
    fn test_three_way_junction_emits_singles_and_multi() {
        let (motifs, stats) = peel_record(&junction_record(), &params(20)).unwrap();

        assert_eq!(motifs.len(), 4);

        let singles = motifs
            .iter()
            .filter(|m| m.kind == MotifKind::Single)
            .collect::<Vec<_>>();
        assert_eq!(singles.len(), 3);
        assert_eq!((singles[0].start, singles[0].end), (1, 5));
        assert_eq!((singles[1].start, singles[1].end), (7, 11));
        assert_eq!((singles[2].start, singles[2].end), (13, 17));

        let multi = &motifs[3];
        assert_eq!(multi.kind, MotifKind::Multi);
        assert_eq!(multi.index, 4);
        assert_eq!((multi.start, multi.end), (1, 17));
        assert_eq!(multi.substructure, "(...).(...).(...)");
        assert_eq!(stats.multis, 1);
    }

    #[test]
    fn test_three_way_junction_multi_rejected_by_threshold() {
        let (motifs, stats) = peel_record(&junction_record(), &params(6)).unwrap();

        assert_eq!(motifs.len(), 3);
        assert!(motifs.iter().all(|m| m.kind == MotifKind::Single));
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn test_collapse_supersedes_constituent_singles() {
        let rec = junction_record();
        let collapse = ExtractorParams::new(20, true).unwrap();
        let (motifs, stats) = peel_record(&rec, &collapse).unwrap();

        assert_eq!(motifs.len(), 1);
        assert_eq!(motifs[0].kind, MotifKind::Multi);
        assert_eq!(motifs[0].index, 1);
        assert_eq!((motifs[0].start, motifs[0].end), (1, 17));
        assert_eq!(stats.singles, 0);
    }

    #[test]
    fn test_collapse_keeps_singles_when_multi_is_rejected() {
        let rec = junction_record();
        let collapse = ExtractorParams::new(6, true).unwrap();
        let (motifs, _) = peel_record(&rec, &collapse).unwrap();

        assert_eq!(motifs.len(), 3);
        assert!(motifs.iter().all(|m| m.kind == MotifKind::Single));
    }

    #[test]
    fn test_nested_junctions_combine_per_level() {
        let (motifs, stats) = peel_record(&nested_record(), &params(134)).unwrap();

        // four hairpins, one multi per inner junction, one multi for the
        // outer junction once both inner closures resolve
        assert_eq!(stats.singles, 4);
        assert_eq!(stats.multis, 3);
        assert_eq!(stats.passes, 3);

        let multis = motifs
            .iter()
            .filter(|m| m.kind == MotifKind::Multi)
            .collect::<Vec<_>>();
        assert_eq!((multis[0].start, multis[0].end), (2, 12));
        assert_eq!((multis[1].start, multis[1].end), (16, 26));
        assert_eq!((multis[2].start, multis[2].end), (1, 27));
        assert_eq!(multis[2].substructure, "((...).(...)).((...).(...))");
    }

    #[test]
    fn test_top_level_siblings_do_not_combine() {
        let rec = record("r1", "GAAACAGAAAC", "(...).(...)");
        let (motifs, _) = peel_record(&rec, &params(134)).unwrap();

        assert_eq!(motifs.len(), 2);
        assert!(motifs.iter().all(|m| m.kind == MotifKind::Single));
    }

    #[test]
    fn test_single_motifs_are_disjoint() {
        let (motifs, _) = peel_record(&nested_record(), &params(134)).unwrap();

        let singles = motifs
            .iter()
            .filter(|m| m.kind == MotifKind::Single)
            .collect::<Vec<_>>();

        for a in &singles {
            for b in &singles {
                if a.index == b.index {
                    continue;
                }
                assert!(a.end < b.start || b.end < a.start);
            }
        }
    }

    #[test]
    fn test_substructures_are_balanced() {
        let (motifs, _) = peel_record(&nested_record(), &params(134)).unwrap();

        assert!(!motifs.is_empty());
        for motif in motifs {
            assert!(PairTable::from_structure(&motif.substructure).is_ok());
        }
    }

    #[test]
    fn test_motif_lengths_respect_threshold() {
        let max_length = 12;
        let (motifs, _) = peel_record(&nested_record(), &params(max_length)).unwrap();

        assert!(!motifs.is_empty());
        for motif in motifs {
            assert!(motif.subsequence.len() <= max_length);
        }
    }

    #[test]
    fn test_peeling_is_idempotent() {
        let rec = nested_record();
        let first = peel_record(&rec, &params(20)).unwrap();
        let second = peel_record(&rec, &params(20)).unwrap();

        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn test_zero_max_length_is_a_configuration_error() {
        assert_eq!(ExtractorParams::new(0, false), Err(ConfigurationError));
    }

    #[test]
    fn test_batch_continues_past_invalid_records() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            ">good1\nGGGGAAAAACCCC\n((((.....))))\n>bad\nACGUACGU\n(((...))\n>good2\nGCAAAGACAAAGACAAAGC\n((...).(...).(...))\n"
        )
        .unwrap();

        let args = Args {
            input: vec![file.path().to_path_buf()],
            outdir: PathBuf::from("."),
            max_length: 134,
            threads: 1,
            collapse: false,
            in_memory: true,
        };

        let outcome = extract_motifs(args).unwrap();

        assert_eq!(outcome.motifs.len(), 2);
        assert_eq!(outcome.motifs[0].0, "good1");
        assert_eq!(outcome.motifs[1].0, "good2");
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(
            outcome.errors[0],
            (
                "bad".to_string(),
                StructureError::UnbalancedBrackets {
                    bracket: '(',
                    position: 0
                }
            )
        );
        assert_eq!(outcome.num_motifs(), 5);
        assert_eq!(outcome.descriptor.len(), 2);
    }

    #[test]
    fn test_zero_max_length_aborts_the_whole_batch() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, ">r1\nGGGGAAAAACCCC\n((((.....))))\n").unwrap();

        let args = Args {
            input: vec![file.path().to_path_buf()],
            outdir: PathBuf::from("."),
            max_length: 0,
            threads: 1,
            collapse: false,
            in_memory: true,
        };

        assert!(extract_motifs(args).is_err());
    }
}
