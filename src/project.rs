use std::path::PathBuf;
use uuid::Uuid;

use crate::ai::ResultSource;
use crate::artifact::{Artifact, ArtifactError};
use crate::components::history::HistoryManager;
use crate::components::mask::MaskCanvas;
use crate::components::tools::{ToolId, ToolParams};

/// A remote result held back until the user accepts or discards it.
#[derive(Clone, Debug)]
pub struct Preview {
    pub tool: ToolId,
    pub params: ToolParams,
    pub result: Artifact,
    /// Entry the result was computed from; accepting commits on top of it.
    pub base: Uuid,
    pub original: Artifact,
    pub source: ResultSource,
    /// The mask went into the request and is cleared on accept.
    pub used_mask: bool,
}

/// Editor state for one open image.
pub struct Project {
    pub id: Uuid,
    pub history: HistoryManager,
    pub mask: MaskCanvas,
    /// Free text for the active tool. Cleared on commit.
    pub prompt: String,
    pub preview: Option<Preview>,
    /// `None` until the image has been saved or was opened from disk.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    /// Display name (derived from path or "Untitled-X")
    pub name: String,

    active_tool: Option<ToolId>,
}

impl Project {
    pub fn new_untitled(untitled_counter: usize, max_history: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            history: HistoryManager::new(max_history),
            mask: MaskCanvas::new(0, 0),
            prompt: String::new(),
            preview: None,
            path: None,
            is_dirty: false,
            name: format!("Untitled-{}", untitled_counter),
            active_tool: None,
        }
    }

    pub fn from_file(path: PathBuf, artifact: Artifact, max_history: usize) -> Result<Self, ArtifactError> {
        let mut project = Self::new_untitled(0, max_history);
        project.path = Some(path);
        project.update_name_from_path();
        project.load(artifact)?;
        Ok(project)
    }

    /// Start a new session on `artifact`: one `initial` entry, a blank mask
    /// of the same size, no preview.
    pub fn load(&mut self, artifact: Artifact) -> Result<Uuid, ArtifactError> {
        let (w, h) = artifact.dimensions()?;
        let id = self.history.reset(artifact);
        self.mask.resize(w, h);
        self.preview = None;
        self.prompt.clear();
        self.is_dirty = false;
        Ok(id)
    }

    pub fn active_tool(&self) -> Option<ToolId> {
        self.active_tool
    }

    /// Switching tools never carries a mask or preview over.
    pub fn set_active_tool(&mut self, tool: Option<ToolId>) {
        if self.active_tool != tool {
            self.mask.clear();
            self.preview = None;
        }
        self.active_tool = tool;
    }

    /// Resize the mask to the current artifact if the image size changed.
    pub fn sync_mask_size(&mut self) {
        let Some(dims) = self.history.current_artifact().and_then(|a| a.dimensions().ok()) else {
            return;
        };
        if dims != (self.mask.width(), self.mask.height()) {
            self.mask.resize(dims.0, dims.1);
        }
    }

    /// Reset tool-local state after a successful commit.
    pub fn after_commit(&mut self, consumed_mask: bool) {
        if consumed_mask {
            self.mask.clear();
        }
        self.prompt.clear();
        self.preview = None;
        self.sync_mask_size();
        self.mark_dirty();
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty {
            format!("{}*", self.name)
        } else {
            self.name.clone()
        }
    }
}
