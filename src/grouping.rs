use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::model::{LanguageGroup, RawRow};
use crate::normalize::{NormalizeError, Normalizer};

/// A roster row that could not be normalized. `row` is the zero-based index
/// among the records the roster reader returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    pub row: usize,
    pub error: NormalizeError,
}

impl RejectedRow {
    /// One-based position among roster records, independent of file format.
    pub fn record_number(&self) -> usize {
        self.row + 1
    }
}

impl fmt::Display for RejectedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {} skipped: {}", self.record_number(), self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedRoster {
    /// In order of each language's first appearance.
    pub groups: Vec<LanguageGroup>,
    pub rejected: Vec<RejectedRow>,
}

impl GroupedRoster {
    pub fn recipient_count(&self) -> usize {
        self.groups.iter().map(|g| g.recipients.len()).sum()
    }
}

/// Normalize every row and partition the results by language.
///
/// A row that fails normalization is recorded and skipped; the others proceed.
pub fn group_by_language(rows: &[RawRow], normalizer: &Normalizer<'_>) -> GroupedRoster {
    let mut out = GroupedRoster::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        match normalizer.normalize(row) {
            Ok((language, fragment)) => {
                let slot = *index.entry(language.clone()).or_insert_with(|| {
                    out.groups.push(LanguageGroup {
                        language: language.clone(),
                        recipients: Vec::new(),
                    });
                    out.groups.len() - 1
                });
                out.groups[slot].recipients.push(fragment);
            }
            Err(error) => {
                warn!(row = i, %error, "dropping roster row");
                out.rejected.push(RejectedRow { row: i, error });
            }
        }
    }

    debug!(
        groups = out.groups.len(),
        recipients = out.recipient_count(),
        rejected = out.rejected.len(),
        "roster grouped"
    );
    out
}
