//! Copy-or-skip decision for a single file.

use crate::error::EngineError;
use crate::filter::PathFilter;
use crate::fs_ops;
use crate::model::{Difference, SkipReason};
use crate::probe::MetadataSnapshot;

/// Result of evaluating the policy for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave the target alone
    Skip(SkipReason),
    /// Transfer the file. `clear_read_only` is set when the target exists and
    /// carries the read-only attribute.
    Copy { clear_read_only: bool },
}

/// The policy knobs that take part in a decision.
#[derive(Debug, Clone, Copy)]
pub struct DecisionPolicy<'a> {
    pub filter: &'a PathFilter,
    pub overwrite: bool,
    pub difference: Difference,
}

impl<'a> DecisionPolicy<'a> {
    /// Evaluate the rules in order: filter, target absent, overwrite
    /// disabled, change detection, otherwise copy.
    pub fn decide(&self, source: &MetadataSnapshot, target: &MetadataSnapshot) -> Decision {
        if !self.filter.check(source.path()) {
            return Decision::Skip(SkipReason::Filter);
        }

        if !target.exists() {
            return Decision::Copy {
                clear_read_only: false,
            };
        }

        if !self.overwrite {
            return Decision::Skip(SkipReason::Overwrite);
        }

        match self.difference {
            Difference::LastModifiedDate if source.modified() == target.modified() => {
                return Decision::Skip(SkipReason::LastModifiedDate);
            }
            Difference::Size if source.size() == target.size() => {
                return Decision::Skip(SkipReason::Size);
            }
            _ => {}
        }

        Decision::Copy {
            clear_read_only: target.is_read_only(),
        }
    }
}

/// Make an existing target writable ahead of a `Decision::Copy`.
///
/// # Returns
/// true if the read-only attribute was cleared
pub fn prepare_target(decision: Decision, target: &MetadataSnapshot) -> Result<bool, EngineError> {
    match decision {
        Decision::Copy {
            clear_read_only: true,
        } => {
            fs_ops::set_read_only(target.path(), false).map_err(|e| EngineError::WriteError {
                path: target.path().to_path_buf(),
                source: e,
            })?;
            tracing::debug!(path = %target.path().display(), "Cleared read-only attribute");
            Ok(true)
        }
        _ => Ok(false),
    }
}
