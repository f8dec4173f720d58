use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use motif_pack::StructureError;

use crate::core::{BatchOutcome, Motif, MotifKind};

/// Shared counters for the parallel batch; relaxed ordering is enough,
/// values are only read after the batch joins.
#[derive(Debug, Default)]
pub struct ParallelCounter {
    pub singles: AtomicU32,
    pub multis: AtomicU32,
    pub rejected: AtomicU32,
    pub skipped: AtomicU32,
}

impl ParallelCounter {
    pub fn inc_singles(&self, n: u32) {
        self.singles.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_multis(&self, n: u32) {
        self.multis.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_rejected(&self, n: u32) {
        self.rejected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn num_singles(&self) -> u32 {
        self.singles.load(Ordering::Relaxed)
    }

    pub fn num_multis(&self) -> u32 {
        self.multis.load(Ordering::Relaxed)
    }

    pub fn num_rejected(&self) -> u32 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn num_skipped(&self) -> u32 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// FASTA header of one motif: name, kind tag, 1-based running index and
/// the inclusive 0-based coordinates into the source record
pub fn motif_header(motif: &Motif) -> String {
    let tag = match motif.kind {
        MotifKind::Single => "Motif",
        MotifKind::Multi => "Multi",
    };

    format!(
        "{}_{}_{} {}-{}",
        motif.source_id, tag, motif.index, motif.start, motif.end
    )
}

/// write every motif of the batch as a FASTA block: header line,
/// subsequence line, substructure line
pub fn write_motifs<P: AsRef<Path>>(outcome: &BatchOutcome, path: P) {
    let f = match File::create(path.as_ref()) {
        Ok(f) => f,
        Err(e) => panic!("Error creating file: {}", e),
    };
    let mut writer = BufWriter::new(f);

    for (_, motifs) in &outcome.motifs {
        for motif in motifs {
            writeln!(
                writer,
                ">{}\n{}\n{}",
                motif_header(motif),
                motif.subsequence,
                motif.substructure
            )
            .unwrap_or_else(|e| {
                panic!("Error writing to file: {}", e);
            });
        }
    }

    log::info!(
        "Motifs from {} records written to {:?}",
        outcome.motifs.len(),
        path.as_ref()
    );
}

/// write skipped records and the reason they failed validation
pub fn write_skips<P: AsRef<Path>>(errors: &[(String, StructureError)], path: P) {
    let f = match File::create(path.as_ref()) {
        Ok(f) => f,
        Err(e) => panic!("Error creating file: {}", e),
    };
    let mut writer = BufWriter::new(f);

    for (id, error) in errors {
        writeln!(writer, "{}\t{}", id, error).unwrap_or_else(|e| {
            panic!("Error writing to file: {}", e);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motif_header_single() {
        let motif = Motif {
            source_id: "r1".to_string(),
            index: 2,
            kind: MotifKind::Single,
            start: 4,
            end: 10,
            subsequence: "GGAAACC".to_string(),
            substructure: "((...))".to_string(),
        };

        assert_eq!(motif_header(&motif), "r1_Motif_2 4-10");
    }

    #[test]
    fn test_motif_header_multi() {
        let motif = Motif {
            source_id: "r1".to_string(),
            index: 4,
            kind: MotifKind::Multi,
            start: 1,
            end: 17,
            subsequence: "C".repeat(17),
            substructure: "(...).(...).(...)".to_string(),
        };

        assert_eq!(motif_header(&motif), "r1_Multi_4 1-17");
    }
}
