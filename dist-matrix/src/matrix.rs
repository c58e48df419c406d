//! The release matrix: every (target, host, archive) we produce

use std::collections::BTreeSet;

use dist_matrix_schema::{ArchiveFormat, EntryOutcome, EntryReport, HostClass, TargetTriple};
use serde::Serialize;

use crate::platform::RELEASE_TARGETS;
use crate::{DistError, DistResult};

/// One independently built/packaged/published unit of the release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    /// The triple to compile for
    pub target_triple: TargetTriple,
    /// The kind of machine that has to do the build
    pub host: HostClass,
    /// The name of the archive (which is also the name of the release asset)
    pub archive_name: String,
    /// The name of the binary being shipped
    pub bin_name: String,
}

impl MatrixEntry {
    /// Create a new entry, deriving the archive from the binary name and host
    pub fn new(bin_name: &str, target_triple: &str, host: HostClass) -> Self {
        let archive_name = format!(
            "{bin_name}-{target_triple}{}",
            host.archive_format().ext()
        );
        Self {
            target_triple: TargetTriple::new(target_triple),
            host,
            archive_name,
            bin_name: bin_name.to_owned(),
        }
    }

    /// The format of this entry's archive
    pub fn archive_format(&self) -> ArchiveFormat {
        self.host.archive_format()
    }

    /// Produce a report line for this entry
    pub fn report(&self, outcome: EntryOutcome) -> EntryReport {
        EntryReport {
            target_triple: self.target_triple.clone(),
            host: self.host,
            archive_name: self.archive_name.clone(),
            archive_format: self.archive_format(),
            outcome,
        }
    }
}

/// The full, fixed release matrix for a binary
pub fn target_matrix(bin_name: &str) -> Vec<MatrixEntry> {
    RELEASE_TARGETS
        .iter()
        .map(|&(triple, host)| MatrixEntry::new(bin_name, triple, host))
        .collect()
}

/// Make sure no two entries would upload an asset with the same name
pub fn check_matrix(entries: &[MatrixEntry]) -> DistResult<()> {
    let mut seen = BTreeSet::new();
    for entry in entries {
        if !seen.insert(entry.archive_name.as_str()) {
            return Err(DistError::DuplicateArchiveName {
                archive_name: entry.archive_name.clone(),
            });
        }
    }
    Ok(())
}

/// Narrow the matrix down to the requested targets (empty means everything)
///
/// The result keeps matrix order, no matter what order the targets were given in.
pub fn select_targets(matrix: Vec<MatrixEntry>, targets: &[String]) -> DistResult<Vec<MatrixEntry>> {
    if targets.is_empty() {
        return Ok(matrix);
    }
    for target in targets {
        if !matrix.iter().any(|e| e.target_triple == target.as_str()) {
            let known = matrix
                .iter()
                .map(|e| e.target_triple.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(DistError::UnknownTarget {
                target: target.clone(),
                known,
            });
        }
    }
    Ok(matrix
        .into_iter()
        .filter(|e| targets.iter().any(|t| e.target_triple == t.as_str()))
        .collect())
}
