//! Edit buffer: the single record being edited and its working copy.

use thiserror::Error;

use crate::record::{Record, RecordField};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("No record is being edited")]
    NotEditing,

    #[error("Record {requested} is not the one being edited ({active})")]
    WrongIndex { requested: usize, active: usize },

    #[error("Record {0} is being committed")]
    CommitPending(usize),
}

/// The active edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditEntry {
    /// Distinguishes this edit from later ones on the same record.
    pub id: u64,
    pub topic: String,
    pub index: usize,
    /// Cache epoch of the topic when the edit began.
    pub epoch: u64,
    /// The record as it was when the edit began.
    pub snapshot: Record,
    pub working: Record,
    /// Set while an update for this edit is in flight.
    pub committing: bool,
}

/// Holds at most one edit at a time.
#[derive(Debug, Default)]
pub struct EditBuffer {
    active: Option<EditEntry>,
    next_id: u64,
}

impl EditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start editing `record`, found at `index` of `topic` at `epoch`.
    ///
    /// Returns the edit this one displaces, if any. Its changes were never
    /// committed and the caller is expected to restore its snapshot.
    pub fn begin(
        &mut self,
        topic: &str,
        index: usize,
        epoch: u64,
        record: Record,
    ) -> Option<EditEntry> {
        self.next_id += 1;
        self.active.replace(EditEntry {
            id: self.next_id,
            topic: topic.to_string(),
            index,
            epoch,
            snapshot: record.clone(),
            working: record,
            committing: false,
        })
    }

    /// Change one field of the working copy.
    pub fn set_field(&mut self, field: RecordField, value: &str) -> Result<&EditEntry, EditError> {
        let entry = self.active.as_mut().ok_or(EditError::NotEditing)?;
        if entry.committing {
            return Err(EditError::CommitPending(entry.index));
        }
        entry.working.set_field(field, value);
        Ok(entry)
    }

    /// The active edit, checked against the index the caller expects.
    pub fn expect(&self, index: usize) -> Result<&EditEntry, EditError> {
        let entry = self.active.as_ref().ok_or(EditError::NotEditing)?;
        if entry.index != index {
            return Err(EditError::WrongIndex {
                requested: index,
                active: entry.index,
            });
        }
        Ok(entry)
    }

    /// Freeze the working copy at `index` for an update.
    ///
    /// Field changes are refused until `finish_commit` or until the edit
    /// is taken.
    pub fn start_commit(&mut self, index: usize) -> Result<&EditEntry, EditError> {
        self.expect(index)?;
        let entry = self.active.as_mut().ok_or(EditError::NotEditing)?;
        if entry.committing {
            return Err(EditError::CommitPending(index));
        }
        entry.committing = true;
        Ok(entry)
    }

    /// Reopen the edit with `id` after a failed update.
    pub fn finish_commit(&mut self, id: u64) {
        if let Some(entry) = self.active.as_mut().filter(|e| e.id == id) {
            entry.committing = false;
        }
    }

    pub fn active(&self) -> Option<&EditEntry> {
        self.active.as_ref()
    }

    pub fn is_editing(&self, topic: &str, index: usize) -> bool {
        self.active
            .as_ref()
            .is_some_and(|e| e.topic == topic && e.index == index)
    }

    /// Remove the active edit.
    pub fn take(&mut self) -> Option<EditEntry> {
        self.active.take()
    }

    /// Remove the active edit only if it is still the one with `id`.
    pub fn take_if(&mut self, id: u64) -> Option<EditEntry> {
        if self.active.as_ref().is_some_and(|e| e.id == id) {
            self.active.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_begin_and_set_field() {
        let mut buffer = EditBuffer::new();
        assert!(buffer.begin("A", 0, 1, fixtures::record(1, "10.1/a")).is_none());

        let entry = buffer.set_field(RecordField::Remarks, "check").unwrap();
        assert_eq!(entry.working.remarks, "check");
        assert_eq!(entry.snapshot.remarks, "");
        assert!(buffer.is_editing("A", 0));
    }

    #[test]
    fn test_begin_displaces_previous() {
        let mut buffer = EditBuffer::new();
        buffer.begin("A", 0, 1, fixtures::record(1, "10.1/a"));
        buffer.set_field(RecordField::Year, "1999").unwrap();

        let displaced = buffer
            .begin("A", 1, 1, fixtures::record(2, "10.1/b"))
            .unwrap();
        assert_eq!(displaced.index, 0);
        assert_eq!(displaced.working.year, "1999");
        assert!(buffer.is_editing("A", 1));
        assert!(!buffer.is_editing("A", 0));
    }

    #[test]
    fn test_set_field_without_edit() {
        let mut buffer = EditBuffer::new();
        assert_eq!(
            buffer.set_field(RecordField::Name, "x").unwrap_err(),
            EditError::NotEditing
        );
    }

    #[test]
    fn test_expect_wrong_index() {
        let mut buffer = EditBuffer::new();
        buffer.begin("A", 2, 1, fixtures::record(3, "10.1/c"));
        assert_eq!(
            buffer.expect(0).unwrap_err(),
            EditError::WrongIndex {
                requested: 0,
                active: 2
            }
        );
        assert!(buffer.expect(2).is_ok());
    }

    #[test]
    fn test_commit_freezes_working_copy() {
        let mut buffer = EditBuffer::new();
        buffer.begin("A", 0, 1, fixtures::record(1, "10.1/a"));
        buffer.set_field(RecordField::Year, "1999").unwrap();

        let id = buffer.start_commit(0).unwrap().id;
        assert_eq!(
            buffer.set_field(RecordField::Year, "2001").unwrap_err(),
            EditError::CommitPending(0)
        );
        assert_eq!(
            buffer.start_commit(0).unwrap_err(),
            EditError::CommitPending(0)
        );
        assert_eq!(buffer.active().unwrap().working.year, "1999");

        buffer.finish_commit(id);
        let entry = buffer.set_field(RecordField::Year, "2001").unwrap();
        assert_eq!(entry.working.year, "2001");
    }

    #[test]
    fn test_take_if_ignores_newer_edit() {
        let mut buffer = EditBuffer::new();
        buffer.begin("A", 0, 1, fixtures::record(1, "10.1/a"));
        let first = buffer.active().unwrap().id;
        buffer.begin("A", 0, 1, fixtures::record(1, "10.1/a"));

        assert!(buffer.take_if(first).is_none());
        assert!(buffer.active().is_some());
    }
}
