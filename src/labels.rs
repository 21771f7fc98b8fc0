//! Benign-label files.
//!
//! A label file is plain text: one integer entry count followed by that many
//! whitespace-separated flow ids in the canonical `"src-dst-sport-dport-proto"` form. A flow whose
//! forward id appears in the file is labeled `BENIGN`; every other flow is labeled `ATTACK`.
//! Without a label file, flows keep the default `UNKNOWN` label.

use crate::flowtrack::flow_id::FiveTuple;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;

/// Label for flows listed in the label file.
pub const LABEL_BENIGN: &str = "BENIGN";
/// Label for flows absent from the label file.
pub const LABEL_ATTACK: &str = "ATTACK";

/// The set of benign flow ids.
#[derive(Debug, Default)]
pub struct LabelSet {
    benign: HashSet<String>,
}

impl LabelSet {
    /// Reads and parses a label file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<LabelSet> {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Error opening label file {}", path.as_ref().display()))?;
        let labels = LabelSet::parse(&text)
            .with_context(|| format!("Error parsing label file {}", path.as_ref().display()))?;
        Ok(labels)
    }

    /// Parses label file text.
    pub fn parse(text: &str) -> Result<LabelSet, LabelFileError> {
        let mut tokens = text.split_whitespace();
        let count_token = tokens.next().ok_or(LabelFileError::MissingCount)?;
        let expected: usize = count_token.parse().map_err(|_| LabelFileError::BadCount {
            token: count_token.to_string(),
        })?;

        let benign: HashSet<String> = tokens.map(str::to_string).collect();
        if benign.len() != expected {
            return Err(LabelFileError::CountMismatch {
                expected,
                actual: benign.len(),
            });
        }
        Ok(LabelSet { benign })
    }

    /// Number of benign flow ids.
    pub fn len(&self) -> usize {
        self.benign.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benign.is_empty()
    }

    /// Resolves the label for a flow by its forward id.
    pub fn label_for(&self, five_tuple: &FiveTuple) -> &'static str {
        if self.benign.contains(&five_tuple.fwd_flow_id()) {
            LABEL_BENIGN
        } else {
            LABEL_ATTACK
        }
    }
}

#[derive(Error, Debug)]
pub enum LabelFileError {
    #[error("label file is empty")]
    MissingCount,

    #[error("invalid entry count '{token}' at token 1")]
    BadCount { token: String },

    #[error("label file declares {expected} entries but contains {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(src: &str, dst: &str) -> FiveTuple {
        FiveTuple {
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            proto: 6,
        }
    }

    #[test]
    fn core_labels_benign_binding() {
        let labels = LabelSet::parse("1\n192.168.1.1-192.168.1.2-1111-80-6\n").unwrap();
        assert_eq!(labels.len(), 1);
        let benign = tuple("192.168.1.1:1111", "192.168.1.2:80");
        let other = tuple("192.168.1.1:2222", "192.168.1.2:80");
        assert_eq!(labels.label_for(&benign), LABEL_BENIGN);
        assert_eq!(labels.label_for(&other), LABEL_ATTACK);
    }

    #[test]
    fn core_labels_reverse_id_is_not_benign() {
        let labels = LabelSet::parse("1 192.168.1.1-192.168.1.2-1111-80-6").unwrap();
        // only the forward orientation matches
        let reversed = tuple("192.168.1.2:80", "192.168.1.1:1111");
        assert_eq!(labels.label_for(&reversed), LABEL_ATTACK);
    }

    #[test]
    fn core_labels_count_mismatch() {
        let err = LabelSet::parse("3\na-b-1-2-6\n").unwrap_err();
        assert!(matches!(
            err,
            LabelFileError::CountMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn core_labels_bad_count_token() {
        assert!(matches!(
            LabelSet::parse("lots a-b-1-2-6").unwrap_err(),
            LabelFileError::BadCount { .. }
        ));
        assert!(matches!(
            LabelSet::parse("  \n").unwrap_err(),
            LabelFileError::MissingCount
        ));
    }
}
