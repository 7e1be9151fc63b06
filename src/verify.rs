//! Complement verification of a device response.

use crate::source::{ImageBuffer, PAYLOAD_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: u8,
    pub actual: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    expected: ImageBuffer,
    mismatches: Vec<Mismatch>,
}

impl Comparison {
    pub fn expected(&self) -> &ImageBuffer {
        &self.expected
    }

    /// Mismatching positions in ascending index order.
    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    pub fn mismatch_count(&self) -> usize {
        self.mismatches.len()
    }

    pub fn is_match(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// One-line verdict, also used as the panel title.
    pub fn summary(&self) -> String {
        if self.is_match() {
            "SUCCESS! All pixels inverted correctly!".to_owned()
        } else {
            format!("FAILED! {}/{} mismatches", self.mismatch_count(), PAYLOAD_LEN)
        }
    }
}

pub fn verify(sent: &ImageBuffer, received: &ImageBuffer) -> Comparison {
    let expected = sent.complement();
    let mismatches = expected
        .as_bytes()
        .iter()
        .zip(received.as_bytes())
        .enumerate()
        .filter(|(_, (e, a))| e != a)
        .map(|(index, (&expected, &actual))| Mismatch {
            index,
            expected,
            actual,
        })
        .collect();
    Comparison {
        expected,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_pattern;

    #[test]
    fn all_zeros_expects_all_255() {
        let result = verify(&ImageBuffer::filled(0), &ImageBuffer::filled(255));
        assert!(result.is_match());
        assert_eq!(result.expected(), &ImageBuffer::filled(255));
    }

    #[test]
    fn all_255_expects_all_zeros() {
        let result = verify(&ImageBuffer::filled(255), &ImageBuffer::filled(0));
        assert_eq!(result.mismatch_count(), 0);
    }

    #[test]
    fn echo_is_not_inversion() {
        let c = test_pattern();
        let result = verify(&c, &c);
        assert_eq!(result.mismatch_count(), PAYLOAD_LEN);
        assert_eq!(result.summary(), "FAILED! 784/784 mismatches");
        assert_eq!(
            result.mismatches()[0],
            Mismatch {
                index: 0,
                expected: 255,
                actual: 0
            }
        );
    }

    #[test]
    fn mismatches_are_ordered() {
        let sent = ImageBuffer::filled(10);
        let mut bytes = [245u8; PAYLOAD_LEN];
        bytes[700] = 1;
        bytes[3] = 2;
        bytes[42] = 3;
        let result = verify(&sent, &ImageBuffer::new(bytes));
        let indices: Vec<_> = result.mismatches().iter().map(|m| m.index).collect();
        assert_eq!(indices, [3, 42, 700]);
        assert!(result.mismatches().iter().all(|m| m.expected == 245));
        assert_eq!(result.summary(), "FAILED! 3/784 mismatches");
    }
}
