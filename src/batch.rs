//! Batch configuration (§3, §4.3 inputs).
//!
//! `BatchId`, `Line`, and `MouldRange` are pure value types with parsing
//! and validation baked into their constructors; `Batch` is the installed,
//! immutable configuration the validator runs against.

use std::collections::BTreeMap;

use crate::error::BatchError;

/// 10-character batch token `MV<X><YY><NNNNN>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(String);

impl BatchId {
    pub fn parse(raw: &str) -> Result<Self, BatchError> {
        let upper = raw.to_ascii_uppercase();
        if !is_valid_batch_id(&upper) {
            return Err(BatchError::InvalidBatchId(raw.to_string()));
        }
        Ok(BatchId(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_batch_id(s: &str) -> bool {
    // MV <X> <YY> <NNNNN>: 2 literal letters, 1 letter, 2 letters, 5 digits = 10 chars.
    let bytes = s.as_bytes();
    if bytes.len() != 10 {
        return false;
    }
    bytes[0].is_ascii_uppercase()
        && bytes[1].is_ascii_uppercase()
        && bytes[2].is_ascii_uppercase()
        && bytes[3].is_ascii_uppercase()
        && bytes[4].is_ascii_uppercase()
        && bytes[5..10].iter().all(|b| b.is_ascii_digit())
}

/// Single uppercase letter identifying the production line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line(pub char);

impl Line {
    pub fn parse(raw: char) -> Result<Self, BatchError> {
        let upper = raw.to_ascii_uppercase();
        if upper.is_ascii_alphabetic() {
            Ok(Line(upper))
        } else {
            Err(BatchError::InvalidBatchId(raw.to_string()))
        }
    }
}

/// Inclusive lexicographic QR interval `[start, end]` bound to a mould name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouldRange {
    pub name: String,
    pub start: String,
    pub end: String,
}

impl MouldRange {
    pub fn new(name: &str, start: &str, end: &str, line: Line, qr_length: usize) -> Result<Self, BatchError> {
        if name.len() != 3
            || !name.chars().next().unwrap().is_ascii_alphabetic()
            || !name.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(BatchError::InvalidMouldName(name.to_string()));
        }
        let name = name.to_ascii_uppercase();

        for (label, bound) in [("start", start), ("end", end)] {
            if bound.len() != qr_length || !bound.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(BatchError::InvalidRangeLength(
                    format!("{label}={bound}"),
                    qr_length,
                ));
            }
        }
        let start = start.to_ascii_uppercase();
        let end = end.to_ascii_uppercase();

        if start > end {
            return Err(BatchError::RangeOutOfOrder {
                name,
                start,
                end,
            });
        }

        let qr_line_pos = 1;
        let qr_name_pos = 2..5;
        for bound in [&start, &end] {
            let bound_chars: Vec<char> = bound.chars().collect();
            if bound_chars[qr_line_pos] != line.0 {
                return Err(BatchError::RangeLineMismatch {
                    name,
                    line: line.0,
                });
            }
            let bound_name: String = bound_chars[qr_name_pos.clone()].iter().collect();
            if bound_name != name {
                return Err(BatchError::RangeNameMismatch { name });
            }
        }

        Ok(MouldRange { name, start, end })
    }

    pub fn contains(&self, qr: &str) -> bool {
        self.start.as_str() <= qr && qr <= self.end.as_str()
    }
}

/// The currently armed batch: id, line, and ordered mould ranges.
///
/// Mould ranges preserve insertion order (§4.3 step 3 iterates "in
/// insertion order"), so the backing map is a `Vec` of (name, range)
/// pairs alongside a `BTreeMap` index is unnecessary — linear scan over a
/// handful of moulds is the correct, simplest representation.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub line: Line,
    moulds: Vec<MouldRange>,
}

impl Batch {
    pub fn new(id: BatchId, line: Line, moulds: Vec<MouldRange>) -> Result<Self, BatchError> {
        if moulds.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        let mut seen = BTreeMap::new();
        for m in &moulds {
            if seen.insert(m.name.clone(), ()).is_some() {
                return Err(BatchError::DuplicateMould(m.name.clone()));
            }
        }

        for (i, a) in moulds.iter().enumerate() {
            for b in &moulds[i + 1..] {
                if ranges_overlap(a, b) {
                    return Err(BatchError::OverlappingRanges(a.name.clone(), b.name.clone()));
                }
            }
        }

        Ok(Batch { id, line, moulds })
    }

    pub fn moulds(&self) -> &[MouldRange] {
        &self.moulds
    }
}

fn ranges_overlap(a: &MouldRange, b: &MouldRange) -> bool {
    a.start <= b.end && b.start <= a.end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_a() -> Line {
        Line::parse('A').unwrap()
    }

    #[test]
    fn batch_id_parses_and_normalizes_case() {
        let id = BatchId::parse("mvanc00001").unwrap();
        assert_eq!(id.as_str(), "MVANC00001");
    }

    #[test]
    fn batch_id_rejects_wrong_length() {
        assert!(BatchId::parse("MVANC0001").is_err());
        assert!(BatchId::parse("MVANC000001").is_err());
    }

    #[test]
    fn mould_range_happy_path() {
        let r = MouldRange::new("ANC", "1AANC00000001", "1AANC00099999", line_a(), 14).unwrap();
        assert!(r.contains("1AANC00012345"));
        assert!(r.contains("1AANC00000001"));
        assert!(r.contains("1AANC00099999"));
        assert!(!r.contains("1AANC00100000"));
    }

    #[test]
    fn mould_range_rejects_line_mismatch() {
        let err = MouldRange::new("ANC", "1BANC00000001", "1BANC00099999", line_a(), 14);
        assert!(matches!(err, Err(BatchError::RangeLineMismatch { .. })));
    }

    #[test]
    fn mould_range_rejects_inverted_bounds() {
        let err = MouldRange::new("ANC", "1AANC00099999", "1AANC00000001", line_a(), 14);
        assert!(matches!(err, Err(BatchError::RangeOutOfOrder { .. })));
    }

    #[test]
    fn batch_rejects_overlapping_ranges() {
        // The name-embedding invariant means two ranges built through
        // `MouldRange::new` for distinct mould names can never overlap
        // lexicographically (the name occupies the first differing
        // position). Construct the overlap directly to exercise the
        // defense-in-depth check in `Batch::new`, which accepts any
        // `Vec<MouldRange>` regardless of how each entry was built.
        let r1 = MouldRange::new("ANC", "1AANC00000001", "1AANC00099999", line_a(), 14).unwrap();
        let r2 = MouldRange {
            name: "ANB".into(),
            start: "1AANC00050000".into(),
            end: "1AANC00150000".into(),
        };
        let err = Batch::new(
            BatchId::parse("MVANC00001").unwrap(),
            line_a(),
            vec![r1, r2],
        );
        assert!(matches!(err, Err(BatchError::OverlappingRanges(_, _))));
    }

    #[test]
    fn batch_allows_touching_ranges_for_distinct_moulds() {
        let r1 = MouldRange::new("ANC", "1AANC00000001", "1AANC00099999", line_a(), 14).unwrap();
        let r2 = MouldRange::new("ANB", "1AANB00000001", "1AANB00099999", line_a(), 14).unwrap();
        let batch = Batch::new(BatchId::parse("MVANC00001").unwrap(), line_a(), vec![r1, r2]).unwrap();
        assert_eq!(batch.moulds().len(), 2);
    }

    #[test]
    fn batch_rejects_empty_mould_list() {
        let err = Batch::new(BatchId::parse("MVANC00001").unwrap(), line_a(), vec![]);
        assert!(matches!(err, Err(BatchError::EmptyBatch)));
    }
}
