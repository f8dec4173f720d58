use config::{CLOSE_BRACKET, NUCLEOTIDES, OPEN_BRACKET, UNPAIRED};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A record as it comes out of the input files, before any validation.
///
/// The id is the header token before the first '|', without the
/// leading '>'. The sequence line is uppercased at parse; the structure
/// line keeps only its first whitespace token, with pseudoknot brackets
/// and strand separators rewritten to dots.
#[derive(Debug, PartialEq, Clone)]
pub struct RawRecord {
    pub id: String,
    pub sequence: String,
    pub structure: String,
}

impl RawRecord {
    pub fn from_block(block: &str) -> Result<RawRecord, &'static str> {
        let mut lines = block.lines();
        let header = lines.next().ok_or("Empty record block")?;

        let id = header
            .split('|')
            .next()
            .unwrap_or(header)
            .trim()
            .to_string();

        if id.is_empty() {
            return Err("Record with empty name");
        }

        let mut sequence = None;
        let mut structure = None;

        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match line.as_bytes()[0] {
                b'(' | b')' | b'.' => {
                    if structure.is_none() {
                        structure = Some(clean_structure(line));
                    }
                }
                c if c.is_ascii_alphabetic() => {
                    if sequence.is_none() {
                        sequence = Some(line.to_ascii_uppercase());
                    }
                }
                _ => {}
            }
        }

        Ok(RawRecord {
            id,
            sequence: sequence.ok_or("Missing sequence line")?,
            structure: structure.ok_or("Missing structure line")?,
        })
    }
}

/// keep the first whitespace token of a structure line and rewrite
/// pseudoknot brackets and strand separators to unpaired positions
fn clean_structure(line: &str) -> String {
    line.split_whitespace()
        .next()
        .unwrap_or(line)
        .chars()
        .map(|c| match c {
            '&' | '[' | ']' => '.',
            other => other,
        })
        .collect()
}

/// Validation failures for a single record; these never abort a batch,
/// they are recorded and the record is skipped.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StructureError {
    #[error("sequence length {sequence} does not match structure length {structure}")]
    LengthMismatch { sequence: usize, structure: usize },
    #[error("invalid character '{found}' at position {position}")]
    InvalidCharacter { found: char, position: usize },
    #[error("unbalanced brackets: unmatched '{bracket}' at position {position}")]
    UnbalancedBrackets { bracket: char, position: usize },
}

/// A validated sequence/structure pair.
///
/// Invariants held after construction: both strings have equal length,
/// the sequence is over {A, C, G, T, U, N} (case-insensitive), the
/// structure is over {'(', ')', '.'} and its brackets balance.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub sequence: String,
    pub structure: String,
}

impl Record {
    pub fn new(id: String, sequence: String, structure: String) -> Result<Record, StructureError> {
        validate_pair(&sequence, &structure)?;

        Ok(Record {
            id,
            sequence,
            structure,
        })
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

impl TryFrom<RawRecord> for Record {
    type Error = StructureError;

    fn try_from(raw: RawRecord) -> Result<Record, StructureError> {
        Record::new(raw.id, raw.sequence, raw.structure)
    }
}

/// Checks a sequence/structure pair for well-formedness: equal lengths,
/// structure alphabet, sequence alphabet, balanced brackets. Pure.
pub fn validate_pair(sequence: &str, structure: &str) -> Result<(), StructureError> {
    if sequence.len() != structure.len() {
        return Err(StructureError::LengthMismatch {
            sequence: sequence.len(),
            structure: structure.len(),
        });
    }

    for (position, c) in structure.bytes().enumerate() {
        if !matches!(c, OPEN_BRACKET | CLOSE_BRACKET | UNPAIRED) {
            return Err(StructureError::InvalidCharacter {
                found: c as char,
                position,
            });
        }
    }

    for (position, c) in sequence.bytes().enumerate() {
        if !NUCLEOTIDES.contains(&c.to_ascii_uppercase()) {
            return Err(StructureError::InvalidCharacter {
                found: c as char,
                position,
            });
        }
    }

    PairTable::from_structure(structure).map(|_| ())
}

/// The pairing map of one dot-bracket string.
///
/// Built by the standard stack-based nested-bracket scan, which makes
/// crossing pairs impossible by construction. The same scan records for
/// every pair its immediate enclosing pair and whether it is a leaf
/// (no pair strictly inside it), so the pairing tree is available as
/// metadata without being materialized.
#[derive(Debug, PartialEq, Clone)]
pub struct PairTable {
    partner: Vec<Option<usize>>,
    parent: HashMap<usize, usize>,
    leaves: Vec<(usize, usize)>,
}

impl PairTable {
    pub fn from_structure(structure: &str) -> Result<PairTable, StructureError> {
        PairTable::from_bytes(structure.as_bytes())
    }

    pub fn from_bytes(structure: &[u8]) -> Result<PairTable, StructureError> {
        let mut partner = vec![None; structure.len()];
        let mut parent = HashMap::new();
        let mut leaves = Vec::new();

        // (open position, has at least one child pair)
        let mut stack: Vec<(usize, bool)> = Vec::new();

        for (i, &c) in structure.iter().enumerate() {
            match c {
                OPEN_BRACKET => stack.push((i, false)),
                CLOSE_BRACKET => {
                    let (open, has_child) =
                        stack.pop().ok_or(StructureError::UnbalancedBrackets {
                            bracket: ')',
                            position: i,
                        })?;

                    partner[open] = Some(i);
                    partner[i] = Some(open);

                    if !has_child {
                        leaves.push((open, i));
                    }

                    if let Some((enclosing, flag)) = stack.last_mut() {
                        parent.insert(open, *enclosing);
                        *flag = true;
                    }
                }
                UNPAIRED => {}
                other => {
                    return Err(StructureError::InvalidCharacter {
                        found: other as char,
                        position: i,
                    })
                }
            }
        }

        if let Some(&(open, _)) = stack.last() {
            return Err(StructureError::UnbalancedBrackets {
                bracket: '(',
                position: open,
            });
        }

        leaves.sort_unstable();

        Ok(PairTable {
            partner,
            parent,
            leaves,
        })
    }

    /// partner position of `i`, None if unpaired
    pub fn partner(&self, i: usize) -> Option<usize> {
        self.partner.get(i).copied().flatten()
    }

    /// open position of the pair immediately enclosing the pair opened
    /// at `open`, None at top level
    pub fn parent_of(&self, open: usize) -> Option<usize> {
        self.parent.get(&open).copied()
    }

    /// leaf pairs ordered by ascending open position
    pub fn leaves(&self) -> &[(usize, usize)] {
        &self.leaves
    }

    pub fn paired_count(&self) -> usize {
        self.partner.iter().filter(|p| p.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.partner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partner.is_empty()
    }
}
