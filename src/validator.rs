//! QR validator (§4.3): a pure, total function over (qr, batch, dup_check).

use crate::batch::Batch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Pass { mould: String },
    Duplicate { mould: String },
    InvalidFormat,
    LineMismatch,
    OutOfBatch,
}

impl ScanOutcome {
    /// The single ASCII response byte mapped from this outcome (§6.1).
    pub fn response_byte(&self) -> u8 {
        match self {
            ScanOutcome::Pass { .. } => b'A',
            ScanOutcome::Duplicate { .. } => b'D',
            ScanOutcome::OutOfBatch => b'R',
            ScanOutcome::LineMismatch => b'L',
            ScanOutcome::InvalidFormat => b'N',
        }
    }

    pub fn mould(&self) -> Option<&str> {
        match self {
            ScanOutcome::Pass { mould } | ScanOutcome::Duplicate { mould } => Some(mould),
            _ => None,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ScanOutcome::Pass { .. })
    }
}

/// Validate `qr` against `batch`, consulting `dup_check` only once a mould
/// range match is found (§4.3 step 3). Rule order is significant: length
/// and alphanumeric checks must fail before the line check is ever
/// reached, so a QR that is simultaneously too short and line-mismatched
/// is reported as `InvalidFormat`.
pub fn validate(
    qr: &str,
    batch: &Batch,
    qr_length: usize,
    dup_check: impl FnOnce(&str) -> bool,
) -> ScanOutcome {
    let upper = qr.to_ascii_uppercase();

    if upper.chars().count() != qr_length || !upper.chars().all(|c| c.is_ascii_alphanumeric()) {
        return ScanOutcome::InvalidFormat;
    }

    let line_char = upper.chars().nth(1).expect("length already checked above");
    if line_char != batch.line.0 {
        return ScanOutcome::LineMismatch;
    }

    for mould in batch.moulds() {
        if mould.contains(&upper) {
            return if dup_check(&upper) {
                ScanOutcome::Duplicate {
                    mould: mould.name.clone(),
                }
            } else {
                ScanOutcome::Pass {
                    mould: mould.name.clone(),
                }
            };
        }
    }

    ScanOutcome::OutOfBatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchId, Line, MouldRange};

    fn sample_batch() -> Batch {
        let line = Line::parse('A').unwrap();
        let r = MouldRange::new("ANC", "1AANC00000001", "1AANC00099999", line, 14).unwrap();
        Batch::new(BatchId::parse("MVANC00001").unwrap(), line, vec![r]).unwrap()
    }

    #[test]
    fn pass_when_no_duplicate() {
        let batch = sample_batch();
        let outcome = validate("1AANC00012345", &batch, 14, |_| false);
        assert_eq!(
            outcome,
            ScanOutcome::Pass {
                mould: "ANC".into()
            }
        );
        assert_eq!(outcome.response_byte(), b'A');
    }

    #[test]
    fn duplicate_when_dup_check_true() {
        let batch = sample_batch();
        let outcome = validate("1AANC00012345", &batch, 14, |_| true);
        assert_eq!(
            outcome,
            ScanOutcome::Duplicate {
                mould: "ANC".into()
            }
        );
        assert_eq!(outcome.response_byte(), b'D');
    }

    #[test]
    fn invalid_format_on_length_13_and_15() {
        let batch = sample_batch();
        assert_eq!(
            validate("1AANC0001234", &batch, 14, |_| false),
            ScanOutcome::InvalidFormat
        );
        assert_eq!(
            validate("1AANC0001234567", &batch, 14, |_| false),
            ScanOutcome::InvalidFormat
        );
    }

    #[test]
    fn invalid_format_wins_over_line_mismatch() {
        // 14 characters, illegal byte only at position 0, correct line
        // char at position 1: format must be checked before line per
        // §4.3 step 1 vs step 2.
        let batch = sample_batch();
        let qr = "!AANC000123456";
        assert_eq!(qr.chars().count(), 14);
        assert_eq!(validate(qr, &batch, 14, |_| false), ScanOutcome::InvalidFormat);
    }

    #[test]
    fn line_mismatch() {
        let batch = sample_batch();
        assert_eq!(
            validate("1BANC00012345", &batch, 14, |_| false),
            ScanOutcome::LineMismatch
        );
    }

    #[test]
    fn out_of_batch() {
        let batch = sample_batch();
        assert_eq!(
            validate("1AXXX00012345", &batch, 14, |_| false),
            ScanOutcome::OutOfBatch
        );
    }

    #[test]
    fn exact_bounds_pass() {
        let batch = sample_batch();
        assert!(validate("1AANC00000001", &batch, 14, |_| false).is_pass());
        assert!(validate("1AANC00099999", &batch, 14, |_| false).is_pass());
    }

    #[test]
    fn touching_ranges_validate_against_correct_mould() {
        let line = Line::parse('A').unwrap();
        let r1 = MouldRange::new("ANC", "1AANC00000001", "1AANC00099999", line, 14).unwrap();
        let r2 = MouldRange::new("AND", "1AAND00000001", "1AAND00099999", line, 14).unwrap();
        let batch = Batch::new(BatchId::parse("MVANC00001").unwrap(), line, vec![r1, r2]).unwrap();

        let outcome = validate("1AAND00050000", &batch, 14, |_| false);
        assert_eq!(outcome.mould(), Some("AND"));
    }

    #[test]
    fn deterministic_and_referentially_transparent() {
        let batch = sample_batch();
        let a = validate("1AANC00012345", &batch, 14, |_| false);
        let b = validate("1AANC00012345", &batch, 14, |_| false);
        assert_eq!(a, b);
    }
}
