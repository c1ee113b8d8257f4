use serde::Serialize;

use crate::models::IdentificationRecord;

/// Append-only log of identifications made, in processing order.
///
/// Only the engine appends; everyone else reads.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct IdentificationLog {
    records: Vec<IdentificationRecord>,
}

impl IdentificationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: IdentificationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[IdentificationRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &IdentificationRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<'a> IntoIterator for &'a IdentificationLog {
    type Item = &'a IdentificationRecord;
    type IntoIter = std::slice::Iter<'a, IdentificationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CandidateMatch;

    #[test]
    fn test_preserves_append_order() {
        let mut log = IdentificationLog::new();
        for path in ["/b.c", "/a.c", "/c.c"] {
            let candidate = CandidateMatch::new(path, "zlib", 50);
            log.push(IdentificationRecord::from_candidate(path, &candidate, "unknown".into()));
        }
        let paths: Vec<_> = log.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/b.c", "/a.c", "/c.c"]);
        assert_eq!(log.len(), 3);
    }
}
