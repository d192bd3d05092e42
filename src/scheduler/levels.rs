//! Context discovery and grouping by nesting depth.

use crate::merge::TraceDir;
use crate::parser::ContextId;
use crate::utils::error::SchedulerError;
use log::{debug, info};

/// Contexts of one nesting depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    pub depth: usize,
    pub contexts: Vec<ContextId>,
}

/// List every context log in the trace directory
///
/// **Public** - first step of a merge run
///
/// # Errors
/// * `SchedulerError::NoContexts` - the directory holds no context log
/// * `SchedulerError::Io` - the directory cannot be listed
pub fn discover_contexts(dir: &TraceDir) -> Result<Vec<ContextId>, SchedulerError> {
    let ids = dir.list_contexts()?;
    if ids.is_empty() {
        return Err(SchedulerError::NoContexts(dir.path().display().to_string()));
    }
    debug!("Discovered {} context logs in {}", ids.len(), dir.path().display());
    Ok(ids)
}

/// Group contexts by depth, deepest level first
///
/// **Public** - the order in which levels must be merged
///
/// # Errors
/// * `SchedulerError::MultipleRoots` - anything but exactly one root `0`
pub fn group_levels(ids: &[ContextId]) -> Result<Vec<Level>, SchedulerError> {
    let roots: Vec<&ContextId> = ids.iter().filter(|id| id.depth() == 0).collect();
    if roots.len() != 1 || *roots[0] != ContextId::root() {
        return Err(SchedulerError::MultipleRoots(
            roots.iter().map(|id| id.to_string()).collect(),
        ));
    }

    let max_depth = ids.iter().map(ContextId::depth).max().unwrap_or(0);
    let mut levels: Vec<Level> = (0..=max_depth)
        .rev()
        .map(|depth| Level {
            depth,
            contexts: Vec::new(),
        })
        .collect();

    for id in ids {
        levels[max_depth - id.depth()].contexts.push(id.clone());
    }
    levels.retain(|level| !level.contexts.is_empty());
    for level in &mut levels {
        level.contexts.sort();
    }

    info!(
        "Scheduling {} contexts over {} nesting levels",
        ids.len(),
        levels.len()
    );
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ContextId> {
        names
            .iter()
            .map(|n| ContextId::from_file_name(n).unwrap())
            .collect()
    }

    #[test]
    fn test_levels_are_deepest_first() {
        let levels = group_levels(&ids(&["0.2", "0", "0.2.1", "0.1", "0.2.1.5"])).unwrap();
        let depths: Vec<usize> = levels.iter().map(|l| l.depth).collect();
        assert_eq!(depths, vec![3, 2, 1, 0]);
        assert_eq!(levels[2].contexts, ids(&["0.1", "0.2"]));
        assert_eq!(levels[3].contexts, vec![ContextId::root()]);
    }

    #[test]
    fn test_skipped_depths_produce_no_empty_level() {
        let levels = group_levels(&ids(&["0", "0.1.1"])).unwrap();
        assert_eq!(levels.len(), 2);
    }

    #[test]
    fn test_root_must_be_unique() {
        let err = group_levels(&ids(&["0", "1", "0.1"])).unwrap_err();
        assert!(matches!(err, SchedulerError::MultipleRoots(roots) if roots == vec!["0", "1"]));

        let err = group_levels(&ids(&["0.1"])).unwrap_err();
        assert!(matches!(err, SchedulerError::MultipleRoots(roots) if roots.is_empty()));
    }

    #[test]
    fn test_discover_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_contexts(&TraceDir::new(dir.path())).unwrap_err();
        assert!(matches!(err, SchedulerError::NoContexts(_)));
    }
}
