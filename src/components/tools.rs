// ============================================================================
// TOOL CATALOGUE — every user-facing edit operation and its preconditions
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named parameters of one operation, recorded verbatim in history.
/// A `BTreeMap` keeps serialization order stable.
pub type ToolParams = BTreeMap<String, serde_json::Value>;

/// Build a `ToolParams` map: `params! { "factor" => 2, "mode" => "fill" }`.
#[macro_export]
macro_rules! params {
    () => { $crate::components::tools::ToolParams::new() };
    ($($key:expr => $val:expr),+ $(,)?) => {{
        let mut map = $crate::components::tools::ToolParams::new();
        $( map.insert(($key).to_string(), ::serde_json::json!($val)); )+
        map
    }};
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolId {
    // Remote, single image in
    RemoveBg,
    Upscale,
    Relight,
    LowPoly,
    DustAndScratches,
    ExtractArt,
    Denoise,
    FaceRecovery,
    Unblur,
    Style,
    PhotoRestoration,
    ProfessionalPortrait,
    Outpaint,
    AiAdjust,
    Variation,
    SuperResolution,
    // Remote, mask scoped
    GenerativeEdit,
    ObjectRemover,
    RetouchFace,
    // Remote, extra images
    FaceSwap,
    TryOn,
    SuperheroFusion,
    CreativeFusion,
    AiPortrait,
    // Remote, no input image
    ImageGen,
    /// Image or prompt to a short clip; never enters history.
    Video,
    // Local
    Crop,
    Transform,
    Adjust,
    LocalAdjust,
    Texture,
    Text,
}

impl ToolId {
    pub fn all() -> &'static [ToolId] {
        use ToolId::*;
        &[
            RemoveBg,
            Upscale,
            Relight,
            LowPoly,
            DustAndScratches,
            ExtractArt,
            Denoise,
            FaceRecovery,
            Unblur,
            Style,
            PhotoRestoration,
            ProfessionalPortrait,
            Outpaint,
            AiAdjust,
            Variation,
            SuperResolution,
            GenerativeEdit,
            ObjectRemover,
            RetouchFace,
            FaceSwap,
            TryOn,
            SuperheroFusion,
            CreativeFusion,
            AiPortrait,
            ImageGen,
            Video,
            Crop,
            Transform,
            Adjust,
            LocalAdjust,
            Texture,
            Text,
        ]
    }

    /// Stable identifier, also the operation kind stored in history.
    pub fn id(&self) -> &'static str {
        match self {
            ToolId::RemoveBg => "removeBg",
            ToolId::Upscale => "upscale",
            ToolId::Relight => "relight",
            ToolId::LowPoly => "lowPoly",
            ToolId::DustAndScratches => "dustAndScratches",
            ToolId::ExtractArt => "extractArt",
            ToolId::Denoise => "denoise",
            ToolId::FaceRecovery => "faceRecovery",
            ToolId::Unblur => "unblur",
            ToolId::Style => "style",
            ToolId::PhotoRestoration => "photoRestoration",
            ToolId::ProfessionalPortrait => "professionalPortrait",
            ToolId::Outpaint => "outpaint",
            ToolId::AiAdjust => "aiAdjust",
            ToolId::Variation => "variation",
            ToolId::SuperResolution => "superResolution",
            ToolId::GenerativeEdit => "generativeEdit",
            ToolId::ObjectRemover => "objectRemover",
            ToolId::RetouchFace => "retouchFace",
            ToolId::FaceSwap => "faceSwap",
            ToolId::TryOn => "tryOn",
            ToolId::SuperheroFusion => "superheroFusion",
            ToolId::CreativeFusion => "creativeFusion",
            ToolId::AiPortrait => "aiPortraitStudio",
            ToolId::ImageGen => "imageGen",
            ToolId::Video => "video",
            ToolId::Crop => "crop",
            ToolId::Transform => "transform",
            ToolId::Adjust => "adjust",
            ToolId::LocalAdjust => "localAdjust",
            ToolId::Texture => "texture",
            ToolId::Text => "text",
        }
    }

    /// Localized label for menus and the history panel.
    pub fn label(&self) -> String {
        crate::i18n::translate(&format!("tool.{}", self.id()))
    }

    /// Runs entirely on the client, never touching the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ToolId::Crop
                | ToolId::Transform
                | ToolId::Adjust
                | ToolId::LocalAdjust
                | ToolId::Texture
                | ToolId::Text
        )
    }

    pub fn requires_mask(&self) -> bool {
        matches!(
            self,
            ToolId::GenerativeEdit | ToolId::ObjectRemover | ToolId::RetouchFace | ToolId::LocalAdjust
        )
    }

    /// Non-empty free text is mandatory.
    pub fn requires_prompt(&self) -> bool {
        matches!(
            self,
            ToolId::GenerativeEdit
                | ToolId::Relight
                | ToolId::Style
                | ToolId::AiAdjust
                | ToolId::ImageGen
                | ToolId::Video
        )
    }

    /// Needs at least one image besides the current artifact.
    pub fn requires_source_image(&self) -> bool {
        matches!(
            self,
            ToolId::FaceSwap | ToolId::TryOn | ToolId::SuperheroFusion | ToolId::CreativeFusion | ToolId::Texture
        )
    }

    /// Needs a current artifact to operate on.
    pub fn requires_base_image(&self) -> bool {
        !matches!(self, ToolId::ImageGen | ToolId::Video)
    }

    /// Result goes through a preview the user must accept before it commits.
    pub fn is_two_phase(&self) -> bool {
        matches!(self, ToolId::FaceSwap | ToolId::Style)
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ToolId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['-', '_'], "").to_ascii_lowercase();
        ToolId::all()
            .iter()
            .copied()
            .find(|t| t.id().to_ascii_lowercase() == wanted)
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_parse_back() {
        let mut seen = std::collections::HashSet::new();
        for tool in ToolId::all() {
            assert!(seen.insert(tool.id()), "duplicate id {}", tool.id());
            assert_eq!(tool.id().parse::<ToolId>().unwrap(), *tool);
        }
        assert_eq!("remove-bg".parse::<ToolId>().unwrap(), ToolId::RemoveBg);
        assert_eq!("face_swap".parse::<ToolId>().unwrap(), ToolId::FaceSwap);
    }

    #[test]
    fn every_tool_has_a_label() {
        for tool in ToolId::all() {
            assert_ne!(tool.label(), format!("tool.{}", tool.id()));
        }
    }

    #[test]
    fn serde_matches_id() {
        for tool in ToolId::all() {
            let json = serde_json::to_string(tool).unwrap();
            assert_eq!(json, format!("\"{}\"", tool.id()));
        }
    }

    #[test]
    fn masked_tools_are_flagged() {
        assert!(ToolId::GenerativeEdit.requires_mask());
        assert!(ToolId::ObjectRemover.requires_mask());
        assert!(!ToolId::RemoveBg.requires_mask());
        assert!(!ToolId::ObjectRemover.requires_prompt());
        assert!(ToolId::FaceSwap.requires_source_image());
        assert!(ToolId::FaceSwap.is_two_phase());
        assert!(ToolId::TryOn.requires_source_image());
        assert!(!ToolId::TryOn.is_two_phase());
        assert!(!ToolId::AiPortrait.requires_source_image());
        assert_eq!("aiPortraitStudio".parse::<ToolId>().unwrap(), ToolId::AiPortrait);
        assert!(!ToolId::ImageGen.requires_base_image());
    }

    #[test]
    fn params_macro_builds_json_values() {
        let p = params! { "factor" => 4, "preserve_face" => true, "mode" => "fill" };
        assert_eq!(p["factor"], serde_json::json!(4));
        assert_eq!(p["preserve_face"], serde_json::json!(true));
        assert_eq!(p.keys().cloned().collect::<Vec<_>>(), vec!["factor", "mode", "preserve_face"]);
    }
}
