//! Where an incoming commit stands relative to the one we already know
//!
//! Detection only. Nothing here merges content; a [`Ancestry::Diverged`]
//! result is handed back to the caller to be flagged as a conflict.

use std::collections::{HashSet, VecDeque};

use super::{RemoteSnapshot, SnapshotError};
use crate::grid::{Capability, FieldValue, Grid};

/// Relationship of an incoming commit to our current head for the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    /// Same commit
    Same,
    /// Ours already descends from theirs; nothing to do
    Behind,
    /// Theirs descends from ours (or we have nothing yet)
    FastForward,
    /// Neither descends from the other
    Diverged,
}

impl Ancestry {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Ancestry::Diverged)
    }
}

async fn parents_of(grid: &dyn Grid, capability: &Capability) -> Result<Vec<Capability>, SnapshotError> {
    let fields = grid.get_directory(capability).await?;
    match fields.get("parents") {
        Some(FieldValue::List(caps)) => Ok(caps.clone()),
        Some(_) => Err(SnapshotError::InvalidField {
            capability: capability.clone(),
            field: "parents",
            reason: "expected a list".to_string(),
        }),
        None => Ok(Vec::new()),
    }
}

/// Whether `candidate` is a strict ancestor of the commit `descendant`
///
/// Walks parent links breadth first, reading each commit from the grid. A
/// parent that cannot be read fails the walk rather than being skipped.
pub async fn is_ancestor(
    grid: &dyn Grid,
    candidate: &Capability,
    descendant: &Capability,
) -> Result<bool, SnapshotError> {
    let mut seen: HashSet<Capability> = HashSet::new();
    let mut queue: VecDeque<Capability> = parents_of(grid, descendant).await?.into();

    while let Some(cap) = queue.pop_front() {
        if &cap == candidate {
            return Ok(true);
        }
        if !seen.insert(cap.clone()) {
            continue;
        }
        queue.extend(parents_of(grid, &cap).await?);
    }
    Ok(false)
}

/// Classify `theirs` against our known head `ours`
pub async fn classify(
    grid: &dyn Grid,
    ours: Option<&Capability>,
    theirs: &RemoteSnapshot,
) -> Result<Ancestry, SnapshotError> {
    let Some(ours) = ours else {
        return Ok(Ancestry::FastForward);
    };
    if ours == &theirs.capability {
        return Ok(Ancestry::Same);
    }

    // theirs is already parsed; start from its parents directly
    if theirs.parents_raw.contains(ours) {
        return Ok(Ancestry::FastForward);
    }
    for parent in &theirs.parents_raw {
        if is_ancestor(grid, ours, parent).await? {
            return Ok(Ancestry::FastForward);
        }
    }

    if is_ancestor(grid, &theirs.capability, ours).await? {
        return Ok(Ancestry::Behind);
    }
    Ok(Ancestry::Diverged)
}
