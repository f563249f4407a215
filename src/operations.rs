//! Stateful merge/split operation handles (§3, §6): wraps the pure
//! validate/execute/rollback functions in [`crate::merge`] and
//! [`crate::split`] with the lifecycle status the spec's external
//! interface names — `pending → validating → running → completed |
//! failed | cancelled` — and the `validate()/preview()/execute()/
//! can_rollback()/rollback()` surface callers drive it through.
//!
//! The underlying merge/split logic is already pure and side-effect
//! free, so "executing" one of these just runs that logic and records
//! the outcome; the value this module adds is the status bookkeeping
//! and the rollback-from-completed-only precondition (§4.L, §4.M:
//! "rollback permitted only from completed when originals are
//! retained").

use std::fmt;

use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::merge::{self, MergePreconditions, MergeResult};
use crate::schema::ElementRecord;
use crate::split::{self, SplitPreconditions, SplitResult};

/// Lifecycle status of a merge or split operation (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    Pending,
    Validating,
    Running,
    Completed,
    Failed,
    /// Rolled back from `Completed`. Not reused for a fresh operation.
    Cancelled,
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A merge operation over a fixed input element list, tracked through its
/// lifecycle from construction to (optional) rollback.
#[derive(Debug)]
pub struct MergeOperation {
    id: String,
    elements: Vec<ElementRecord>,
    max_elements: usize,
    status: OperationStatus,
    result: Option<MergeResult>,
    error_message: Option<String>,
}

impl MergeOperation {
    /// Builds a pending merge operation over `elements`, bounded by
    /// `config.max_merge_elements`.
    pub fn new(elements: Vec<ElementRecord>, config: &EngineConfig) -> Self {
        Self {
            id: format!("merge-op-{}", Uuid::new_v4()),
            elements,
            max_elements: config.max_merge_elements,
            status: OperationStatus::Pending,
            result: None,
            error_message: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Checks preconditions without executing. Transitions to `Failed` on
    /// violation (callers may still call [`Self::execute`] afterward,
    /// which re-validates and returns the same error).
    pub fn validate(&mut self) -> MergePreconditions {
        self.status = OperationStatus::Validating;
        let preconditions = merge::validate_merge(&self.elements, self.max_elements);
        if preconditions.is_valid {
            self.status = OperationStatus::Pending;
        } else {
            self.status = OperationStatus::Failed;
            self.error_message = Some(preconditions.errors.join("; "));
        }
        preconditions
    }

    /// Computes the merge result without committing it to `self` or
    /// changing status. Returns the same [`MergeResult`] `execute` would
    /// produce.
    pub fn preview(&self) -> Result<MergeResult> {
        let preconditions = merge::validate_merge(&self.elements, self.max_elements);
        if !preconditions.is_valid {
            return Err(EngineError::Validation(preconditions.errors.join("; ")));
        }
        Ok(merge::execute_merge(&self.elements))
    }

    /// Validates and executes the merge, recording the result for later
    /// rollback. Idempotent: calling it again after `Completed` re-runs
    /// and overwrites the stored result.
    pub fn execute(&mut self) -> Result<&MergeResult> {
        self.status = OperationStatus::Running;
        let preconditions = merge::validate_merge(&self.elements, self.max_elements);
        if !preconditions.is_valid {
            let message = preconditions.errors.join("; ");
            self.status = OperationStatus::Failed;
            self.error_message = Some(message.clone());
            return Err(EngineError::Validation(message));
        }
        self.result = Some(merge::execute_merge(&self.elements));
        self.status = OperationStatus::Completed;
        Ok(self.result.as_ref().expect("just assigned"))
    }

    pub fn result(&self) -> Option<&MergeResult> {
        self.result.as_ref()
    }

    /// `true` only once the operation has completed and still holds its
    /// originals.
    pub fn can_rollback(&self) -> bool {
        self.status == OperationStatus::Completed && self.result.is_some()
    }

    /// Restores the original elements, moving the operation to
    /// `Cancelled`. Fails with [`EngineError::RollbackUnavailable`] from
    /// any other status.
    pub fn rollback(&mut self) -> Result<Vec<ElementRecord>> {
        if !self.can_rollback() {
            return Err(EngineError::RollbackUnavailable {
                operation_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        let originals = merge::rollback_merge(self.result.as_ref().expect("checked above"));
        self.status = OperationStatus::Cancelled;
        Ok(originals)
    }
}

/// A split operation over a fixed input element and split-point list,
/// tracked through its lifecycle from construction to (optional)
/// rollback.
#[derive(Debug)]
pub struct SplitOperation {
    id: String,
    element: ElementRecord,
    split_points: Vec<usize>,
    min_text_length: usize,
    min_segment_length: usize,
    status: OperationStatus,
    result: Option<SplitResult>,
    error_message: Option<String>,
}

impl SplitOperation {
    /// Builds a pending split operation over `element` at `split_points`,
    /// bounded by `config.min_split_text_length` /
    /// `config.min_segment_length`.
    pub fn new(element: ElementRecord, split_points: Vec<usize>, config: &EngineConfig) -> Self {
        Self {
            id: format!("split-op-{}", Uuid::new_v4()),
            element,
            split_points,
            min_text_length: config.min_split_text_length,
            min_segment_length: config.min_segment_length,
            status: OperationStatus::Pending,
            result: None,
            error_message: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn validate(&mut self) -> SplitPreconditions {
        self.status = OperationStatus::Validating;
        let preconditions = split::validate_split(
            &self.element,
            &self.split_points,
            self.min_text_length,
            self.min_segment_length,
        );
        if preconditions.is_valid {
            self.status = OperationStatus::Pending;
        } else {
            self.status = OperationStatus::Failed;
            self.error_message = Some(preconditions.errors.join("; "));
        }
        preconditions
    }

    pub fn preview(&self) -> Result<SplitResult> {
        let preconditions = split::validate_split(
            &self.element,
            &self.split_points,
            self.min_text_length,
            self.min_segment_length,
        );
        if !preconditions.is_valid {
            return Err(EngineError::Validation(preconditions.errors.join("; ")));
        }
        Ok(split::execute_split(&self.element, &self.split_points))
    }

    pub fn execute(&mut self) -> Result<&SplitResult> {
        self.status = OperationStatus::Running;
        let preconditions = split::validate_split(
            &self.element,
            &self.split_points,
            self.min_text_length,
            self.min_segment_length,
        );
        if !preconditions.is_valid {
            let message = preconditions.errors.join("; ");
            self.status = OperationStatus::Failed;
            self.error_message = Some(message.clone());
            return Err(EngineError::Validation(message));
        }
        self.result = Some(split::execute_split(&self.element, &self.split_points));
        self.status = OperationStatus::Completed;
        Ok(self.result.as_ref().expect("just assigned"))
    }

    pub fn result(&self) -> Option<&SplitResult> {
        self.result.as_ref()
    }

    pub fn can_rollback(&self) -> bool {
        self.status == OperationStatus::Completed && self.result.is_some()
    }

    pub fn rollback(&mut self) -> Result<ElementRecord> {
        if !self.can_rollback() {
            return Err(EngineError::RollbackUnavailable {
                operation_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        let original = split::rollback_split(self.result.as_ref().expect("checked above"));
        self.status = OperationStatus::Cancelled;
        Ok(original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Confidence, ElementType};

    fn element(id: &str, kind: ElementType, text: &str) -> ElementRecord {
        let mut e = ElementRecord::new(id, kind);
        e.text = Some(text.to_string());
        e.confidence = Confidence::new(0.9);
        e.page_number = Some(1);
        e
    }

    #[test]
    fn merge_operation_lifecycle_happy_path() {
        let config = EngineConfig::default();
        let elements = vec![
            element("a", ElementType::Paragraph, "Hello."),
            element("b", ElementType::Paragraph, "World"),
        ];
        let mut op = MergeOperation::new(elements, &config);
        assert_eq!(op.status(), OperationStatus::Pending);

        let preconditions = op.validate();
        assert!(preconditions.is_valid);
        assert_eq!(op.status(), OperationStatus::Pending);

        assert!(!op.can_rollback());
        let result = op.execute().unwrap();
        assert_eq!(result.merged.text.as_deref(), Some("Hello. World"));
        assert_eq!(op.status(), OperationStatus::Completed);

        assert!(op.can_rollback());
        let restored = op.rollback().unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(op.status(), OperationStatus::Cancelled);
        assert!(!op.can_rollback());
    }

    #[test]
    fn merge_operation_invalid_input_fails_without_executing() {
        let config = EngineConfig::default();
        let elements = vec![element("a", ElementType::Paragraph, "only one")];
        let mut op = MergeOperation::new(elements, &config);
        let err = op.execute().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(op.status(), OperationStatus::Failed);
        assert!(op.result().is_none());
    }

    #[test]
    fn merge_operation_rollback_before_completion_is_rejected() {
        let config = EngineConfig::default();
        let elements = vec![
            element("a", ElementType::Paragraph, "x"),
            element("b", ElementType::Paragraph, "y"),
        ];
        let mut op = MergeOperation::new(elements, &config);
        let err = op.rollback().unwrap_err();
        assert!(matches!(err, EngineError::RollbackUnavailable { .. }));
    }

    #[test]
    fn merge_operation_preview_does_not_change_status() {
        let config = EngineConfig::default();
        let elements = vec![
            element("a", ElementType::Paragraph, "x"),
            element("b", ElementType::Paragraph, "y"),
        ];
        let op = MergeOperation::new(elements, &config);
        let preview = op.preview().unwrap();
        assert_eq!(preview.merged.text.as_deref(), Some("x y"));
        assert_eq!(op.status(), OperationStatus::Pending);
        assert!(op.result().is_none());
    }

    #[test]
    fn split_operation_lifecycle_happy_path() {
        let config = EngineConfig::default();
        let e = element("e1", ElementType::Paragraph, "hello world, goodbye world");
        let mut op = SplitOperation::new(e, vec![12], &config);
        assert_eq!(op.status(), OperationStatus::Pending);

        let result = op.execute().unwrap();
        assert_eq!(result.segments.len(), 2);
        assert_eq!(op.status(), OperationStatus::Completed);

        assert!(op.can_rollback());
        let restored = op.rollback().unwrap();
        assert_eq!(restored.element_id, "e1");
        assert_eq!(op.status(), OperationStatus::Cancelled);
    }

    #[test]
    fn split_operation_invalid_points_fail_without_executing() {
        let config = EngineConfig::default();
        let e = element("e1", ElementType::Paragraph, "too short");
        let mut op = SplitOperation::new(e, vec![1], &config);
        let err = op.execute().unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(op.status(), OperationStatus::Failed);
    }
}
