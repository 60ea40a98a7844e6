use std::collections::VecDeque;
use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::components::tools::{ToolId, ToolParams};

/// Default cap on retained history entries.
pub const MAX_HISTORY_SIZE: usize = 50;

// ============================================================================
// OPERATION RECORD — what produced an entry
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// The base image of the session.
    Initial,
    Tool(ToolId),
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Initial => "initial",
            OperationKind::Tool(tool) => tool.id(),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OperationRecord {
    pub kind: OperationKind,
    pub params: ToolParams,
}

impl OperationRecord {
    pub fn initial() -> Self {
        Self {
            kind: OperationKind::Initial,
            params: ToolParams::new(),
        }
    }

    pub fn tool(tool: ToolId, params: ToolParams) -> Self {
        Self {
            kind: OperationKind::Tool(tool),
            params,
        }
    }

    /// Localized one-line label for the history panel.
    pub fn description(&self) -> String {
        match self.kind {
            OperationKind::Initial => t!("history.initial"),
            OperationKind::Tool(tool) => tool.label(),
        }
    }
}

// ============================================================================
// HISTORY ENTRY
// ============================================================================

/// One committed state. Fields are read-only once inserted.
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    id: Uuid,
    artifact: Artifact,
    operation: OperationRecord,
}

impl HistoryEntry {
    fn new(artifact: Artifact, operation: OperationRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact,
            operation,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn operation(&self) -> &OperationRecord {
        &self.operation
    }

    fn memory_size(&self) -> usize {
        self.artifact.len()
    }
}

/// Row of the history panel.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryListing {
    pub index: usize,
    pub kind: OperationKind,
    pub label: String,
    pub is_current: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("history is empty; load an image first")]
    Empty,
    #[error("history moved while the operation was running (expected {expected}, found {found:?})")]
    Conflict { expected: Uuid, found: Option<Uuid> },
}

// ============================================================================
// HISTORY MANAGER - linear undo/redo over immutable artifacts
// ============================================================================

/// Linear undo/redo history over committed artifacts.
///
/// `cursor` is `None` exactly when there are no entries. Committing while the
/// cursor is not at the end discards the redo branch.
pub struct HistoryManager {
    entries: VecDeque<HistoryEntry>,
    cursor: Option<usize>,
    max_history_size: usize,
    /// Running byte total across all entries.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(MAX_HISTORY_SIZE)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            max_history_size: max_history_size.max(1),
            total_memory: 0,
        }
    }

    /// Start a new session with `initial` as the only entry.
    pub fn reset(&mut self, initial: Artifact) -> Uuid {
        self.clear();
        let entry = HistoryEntry::new(initial, OperationRecord::initial());
        let id = entry.id;
        self.total_memory = entry.memory_size();
        self.entries.push_back(entry);
        self.cursor = Some(0);
        id
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.total_memory = 0;
    }

    /// Append a new state after the cursor, pruning any redo branch.
    pub fn commit(&mut self, artifact: Artifact, tool: ToolId, params: ToolParams) -> Result<Uuid, HistoryError> {
        let cursor = self.cursor.ok_or(HistoryError::Empty)?;

        // Drop the redo branch
        for removed in self.entries.drain(cursor + 1..) {
            self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
        }

        let entry = HistoryEntry::new(artifact, OperationRecord::tool(tool, params));
        let id = entry.id;
        self.total_memory += entry.memory_size();
        self.entries.push_back(entry);
        self.cursor = Some(self.entries.len() - 1);

        self.prune();
        Ok(id)
    }

    /// Commit only if the current entry is still `base`.
    ///
    /// The check and the append happen under the same `&mut self`, so two
    /// operations that started from the same state cannot both land.
    pub fn commit_if_current(
        &mut self,
        base: Uuid,
        artifact: Artifact,
        tool: ToolId,
        params: ToolParams,
    ) -> Result<Uuid, HistoryError> {
        let found = self.current().map(|e| e.id);
        if found != Some(base) {
            return Err(HistoryError::Conflict { expected: base, found });
        }
        self.commit(artifact, tool, params)
    }

    /// Step back one entry. Returns the description of the undone operation.
    pub fn undo(&mut self) -> Option<String> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        let description = self.entries[cursor].operation.description();
        self.cursor = Some(cursor - 1);
        Some(description)
    }

    /// Step forward one entry. Returns the description of the redone operation.
    pub fn redo(&mut self) -> Option<String> {
        let cursor = self.cursor?;
        if cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor = Some(cursor + 1);
        Some(self.entries[cursor + 1].operation.description())
    }

    /// Move the cursor to `index`. Out-of-range indices are ignored.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index < self.entries.len() {
            self.cursor = Some(index);
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.cursor.and_then(|i| self.entries.get(i))
    }

    pub fn current_artifact(&self) -> Option<&Artifact> {
        self.current().map(|e| &e.artifact)
    }

    /// Oldest retained entry, used for before/after comparisons.
    pub fn original(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    pub fn can_undo(&self) -> bool {
        matches!(self.cursor, Some(c) if c > 0)
    }

    pub fn can_redo(&self) -> bool {
        matches!(self.cursor, Some(c) if c + 1 < self.entries.len())
    }

    pub fn undo_description(&self) -> Option<String> {
        self.can_undo()
            .then(|| self.current().map(|e| e.operation.description()))
            .flatten()
    }

    pub fn redo_description(&self) -> Option<String> {
        let next = self.cursor? + 1;
        self.entries.get(next).map(|e| e.operation.description())
    }

    /// Descriptions of undoable operations (most recent first).
    pub fn undo_history(&self) -> Vec<String> {
        match self.cursor {
            Some(c) => self
                .entries
                .iter()
                .take(c + 1)
                .skip(1)
                .rev()
                .map(|e| e.operation.description())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every retained entry in order, for a history panel.
    pub fn tool_history(&self) -> Vec<HistoryListing> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, e)| HistoryListing {
                index,
                kind: e.operation.kind,
                label: e.operation.description(),
                is_current: Some(index) == self.cursor,
            })
            .collect()
    }

    /// Bytes held by all entries (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn undo_count(&self) -> usize {
        self.cursor.unwrap_or(0)
    }

    pub fn redo_count(&self) -> usize {
        match self.cursor {
            Some(c) => self.entries.len() - c - 1,
            None => 0,
        }
    }

    /// Evict the oldest entries beyond the cap. The cursor keeps pointing at
    /// the same logical entry, and the new front becomes the session's base.
    fn prune(&mut self) {
        let mut evicted = false;
        while self.entries.len() > self.max_history_size {
            if let Some(removed) = self.entries.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                self.cursor = self.cursor.map(|c| c.saturating_sub(1));
                evicted = true;
            }
        }
        if evicted && let Some(front) = self.entries.front_mut() {
            front.operation.kind = OperationKind::Initial;
        }
    }
}
