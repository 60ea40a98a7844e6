// ============================================================================
// REMOTE OPERATIONS — per-tool inputs, recorded params and model instructions
// ============================================================================

use std::fmt;

use super::errors::{EditError, MissingInput};
use super::transport::{InputPart, RemoteRequest};
use crate::artifact::Artifact;
use crate::components::tools::{ToolId, ToolParams};
use crate::params;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditMode {
    Fill,
    Remove,
}

impl EditMode {
    pub fn as_str(self) -> &'static str {
        match self {
            EditMode::Fill => "fill",
            EditMode::Remove => "remove",
        }
    }
}

/// Studio direction for a virtual try-on. Empty fields fall back to a
/// neutral studio look.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryOnLook {
    /// Backdrop to place the model in; empty keeps the original background.
    pub scene: String,
    pub pose: String,
    pub lens: String,
    pub angle: String,
    pub lighting: String,
    pub negative_prompt: String,
}

impl Default for TryOnLook {
    fn default() -> Self {
        Self {
            scene: String::new(),
            pose: "full body, standing, fashion pose, looking confidently at the camera".to_string(),
            lens: "50mm lens at f/2.8 for a slight background blur".to_string(),
            angle: "eye level".to_string(),
            lighting: "soft studio lighting (softbox)".to_string(),
            negative_prompt: "deformed, ugly, disfigured, extra hands, extra limbs".to_string(),
        }
    }
}

/// One remote image edit with everything it needs besides the base image
/// and the mask.
#[derive(Clone, Debug)]
pub enum RemoteOp {
    RemoveBg,
    Upscale { factor: u32, preserve_face: bool },
    Relight { prompt: String },
    LowPoly,
    DustAndScratches,
    ExtractArt,
    Denoise,
    FaceRecovery,
    Unblur { sharpen: u32, denoise: u32, model: String },
    Style { prompt: String },
    PhotoRestoration { colorize: bool },
    ProfessionalPortrait,
    Outpaint { prompt: String, aspect_ratio: String },
    AiAdjust { prompt: String },
    Variation { strength: u32 },
    GenerativeEdit { prompt: String, mode: EditMode },
    RetouchFace,
    FaceSwap { source: Artifact, prompt: String, negative_prompt: String },
    /// Dress the person in the base image in `garment` (and `shoes`).
    TryOn { garment: Artifact, shoes: Option<Artifact>, look: TryOnLook },
    /// The person in the base image wearing the suit of the hero in `hero`.
    SuperheroFusion { hero: Artifact },
    /// Composition of the base image rendered in the style of `styles`.
    CreativeFusion { styles: Vec<Artifact> },
    /// Styled portrait of the base image's person plus any extra `people`.
    AiPortrait { style: String, people: Vec<Artifact>, prompt: String },
}

fn required(prompt: &str) -> Result<&str, EditError> {
    let p = prompt.trim();
    if p.is_empty() {
        Err(EditError::MissingInput(MissingInput::Prompt))
    } else {
        Ok(p)
    }
}

fn required_image(image: &Artifact) -> Result<&Artifact, EditError> {
    if image.is_empty() {
        Err(EditError::MissingInput(MissingInput::SourceImage))
    } else {
        Ok(image)
    }
}

/// Non-empty images of `images`, in order.
fn present(images: &[Artifact]) -> Vec<&Artifact> {
    images.iter().filter(|a| !a.is_empty()).collect()
}

fn or_default<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    let t = text.trim();
    if t.is_empty() { fallback } else { t }
}

impl RemoteOp {
    pub fn tool(&self) -> ToolId {
        match self {
            RemoteOp::RemoveBg => ToolId::RemoveBg,
            RemoteOp::Upscale { .. } => ToolId::Upscale,
            RemoteOp::Relight { .. } => ToolId::Relight,
            RemoteOp::LowPoly => ToolId::LowPoly,
            RemoteOp::DustAndScratches => ToolId::DustAndScratches,
            RemoteOp::ExtractArt => ToolId::ExtractArt,
            RemoteOp::Denoise => ToolId::Denoise,
            RemoteOp::FaceRecovery => ToolId::FaceRecovery,
            RemoteOp::Unblur { .. } => ToolId::Unblur,
            RemoteOp::Style { .. } => ToolId::Style,
            RemoteOp::PhotoRestoration { .. } => ToolId::PhotoRestoration,
            RemoteOp::ProfessionalPortrait => ToolId::ProfessionalPortrait,
            RemoteOp::Outpaint { .. } => ToolId::Outpaint,
            RemoteOp::AiAdjust { .. } => ToolId::AiAdjust,
            RemoteOp::Variation { .. } => ToolId::Variation,
            RemoteOp::GenerativeEdit { mode: EditMode::Remove, .. } => ToolId::ObjectRemover,
            RemoteOp::GenerativeEdit { .. } => ToolId::GenerativeEdit,
            RemoteOp::RetouchFace => ToolId::RetouchFace,
            RemoteOp::FaceSwap { .. } => ToolId::FaceSwap,
            RemoteOp::TryOn { .. } => ToolId::TryOn,
            RemoteOp::SuperheroFusion { .. } => ToolId::SuperheroFusion,
            RemoteOp::CreativeFusion { .. } => ToolId::CreativeFusion,
            RemoteOp::AiPortrait { .. } => ToolId::AiPortrait,
        }
    }

    /// Whether the mask must be present.
    pub fn requires_mask(&self) -> bool {
        matches!(self, RemoteOp::GenerativeEdit { .. } | RemoteOp::RetouchFace)
    }

    /// Whether a mask is sent along when one exists.
    pub fn uses_mask(&self) -> bool {
        self.requires_mask() || matches!(self, RemoteOp::FaceSwap { .. })
    }

    /// Parameters recorded in history. Images are never recorded.
    pub fn params(&self) -> ToolParams {
        match self {
            RemoteOp::Upscale { factor, preserve_face } => {
                params! { "factor" => factor, "preserve_face" => preserve_face }
            }
            RemoteOp::Relight { prompt } | RemoteOp::Style { prompt } | RemoteOp::AiAdjust { prompt } => {
                params! { "prompt" => prompt }
            }
            RemoteOp::Unblur { sharpen, denoise, model } => {
                params! { "sharpen" => sharpen, "denoise" => denoise, "model" => model }
            }
            RemoteOp::PhotoRestoration { colorize } => params! { "colorize" => colorize },
            RemoteOp::Outpaint { prompt, aspect_ratio } => {
                params! { "prompt" => prompt, "aspect_ratio" => aspect_ratio }
            }
            RemoteOp::Variation { strength } => params! { "strength" => strength },
            RemoteOp::GenerativeEdit { prompt, mode } => {
                params! { "prompt" => prompt, "mode" => mode.as_str() }
            }
            RemoteOp::FaceSwap {
                source,
                prompt,
                negative_prompt,
            } => params! {
                "source" => source.name(),
                "prompt" => prompt,
                "negative_prompt" => negative_prompt,
            },
            RemoteOp::TryOn { garment, shoes, look } => params! {
                "garment" => garment.name(),
                "shoes" => shoes.as_ref().map(Artifact::name),
                "scene" => look.scene,
                "pose" => look.pose,
                "lens" => look.lens,
                "angle" => look.angle,
                "lighting" => look.lighting,
                "negative_prompt" => look.negative_prompt,
            },
            RemoteOp::SuperheroFusion { hero } => params! { "hero" => hero.name() },
            RemoteOp::CreativeFusion { styles } => {
                params! { "styles" => styles.iter().map(Artifact::name).collect::<Vec<_>>() }
            }
            RemoteOp::AiPortrait { style, people, prompt } => params! {
                "style" => style,
                "prompt" => prompt,
                "people" => people.iter().map(Artifact::name).collect::<Vec<_>>(),
            },
            RemoteOp::RemoveBg
            | RemoteOp::LowPoly
            | RemoteOp::DustAndScratches
            | RemoteOp::ExtractArt
            | RemoteOp::Denoise
            | RemoteOp::FaceRecovery
            | RemoteOp::ProfessionalPortrait
            | RemoteOp::RetouchFace => params! {},
        }
    }

    /// Parameter checks that need no images.
    pub fn validate(&self) -> Result<(), EditError> {
        match self {
            RemoteOp::Relight { prompt } | RemoteOp::Style { prompt } | RemoteOp::AiAdjust { prompt } => {
                required(prompt).map(|_| ())
            }
            RemoteOp::GenerativeEdit {
                prompt,
                mode: EditMode::Fill,
            } => required(prompt).map(|_| ()),
            RemoteOp::AiPortrait { style, .. } => required(style).map(|_| ()),
            RemoteOp::Upscale { factor, .. } if !(2..=8).contains(factor) => Err(EditError::InvalidParameter(
                format!("upscale factor must be between 2 and 8, got {factor}"),
            )),
            RemoteOp::Unblur { sharpen, denoise, .. } if *sharpen > 100 || *denoise > 100 => Err(
                EditError::InvalidParameter("unblur levels are percentages (0-100)".to_string()),
            ),
            RemoteOp::Variation { strength } if *strength > 100 => Err(EditError::InvalidParameter(
                "variation strength is a percentage (0-100)".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Instruction text sent after the images.
    pub fn instruction(&self, has_mask: bool) -> String {
        match self {
            RemoteOp::RemoveBg => "Remove the background of this image, keeping every detail of the main subject \
                including fine hair or fur. The result must be a PNG with a transparent background."
                .to_string(),
            RemoteOp::Upscale { factor, preserve_face } => {
                let mut s = format!("Upscale this image by {factor}x. Improve sharpness and detail.");
                if *preserve_face {
                    s.push_str(" Take special care to preserve and realistically enhance facial details.");
                }
                s
            }
            RemoteOp::Relight { prompt } => format!(
                "Relight this photo. The new lighting should be: {}. Keep the original content, \
                 changing only light and shadows.",
                prompt.trim()
            ),
            RemoteOp::LowPoly => "Turn this image into low poly art, using a mesh of geometric polygons \
                and simplified colors."
                .to_string(),
            RemoteOp::DustAndScratches => "Add a realistic dust, scratches and film grain effect to this image \
                for a vintage look."
                .to_string(),
            RemoteOp::ExtractArt => "Extract the line art of this image as a black and white outline sketch \
                on a clean white background."
                .to_string(),
            RemoteOp::Denoise => {
                "Remove noise and grain from this image while preserving fine detail and sharpness.".to_string()
            }
            RemoteOp::FaceRecovery => "Restore and enhance the facial details in this image. Increase clarity, \
                fix imperfections and improve the overall quality of the face."
                .to_string(),
            RemoteOp::Unblur { sharpen, denoise, model } => format!(
                "Fix the blur in this image using the '{model}' model. Apply {sharpen}% sharpening \
                 and {denoise}% noise reduction."
            ),
            RemoteOp::Style { prompt } => format!(
                "Reimagine this image in the following style: {}. Preserve the main elements \
                 but apply the described aesthetic.",
                prompt.trim()
            ),
            RemoteOp::PhotoRestoration { colorize } => {
                let mut s = "Restore this old photo. Remove scratches, tears and noise. Improve sharpness \
                    and detail, especially on faces."
                    .to_string();
                if *colorize {
                    s.push_str(" If the photo is black and white, add realistic colors.");
                }
                s
            }
            RemoteOp::ProfessionalPortrait => "Turn this photo into a professional business portrait. Keep the \
                person's face, but generate business attire, a blurred office background and studio lighting."
                .to_string(),
            RemoteOp::Outpaint { prompt, aspect_ratio } => format!(
                "Expand this image to a {aspect_ratio} aspect ratio. Fill the new areas with: {}.",
                or_default(prompt, "a coherent continuation of the image")
            ),
            RemoteOp::AiAdjust { prompt } => format!(
                "Adjust this image according to the following description: \"{}\". Keep the content, \
                 changing only colors and light.",
                prompt.trim()
            ),
            RemoteOp::Variation { strength } => format!(
                "Create a variation of this image. Keep the subject and composition recognisable, \
                 changing roughly {strength}% of the details."
            ),
            RemoteOp::GenerativeEdit {
                mode: EditMode::Remove, ..
            } => "Remove the object or area marked by the mask and fill the space realistically, \
                consistent with the rest of the image."
                .to_string(),
            RemoteOp::GenerativeEdit { prompt, .. } => format!(
                "In the area marked by the mask, fill in the following: {}. The result must blend \
                 seamlessly with the rest of the image.",
                prompt.trim()
            ),
            RemoteOp::RetouchFace => "In the area marked by the mask, retouch the facial skin. Smooth \
                blemishes, even out the skin tone and reduce shine, keeping a natural look and the skin texture."
                .to_string(),
            RemoteOp::FaceSwap {
                prompt, negative_prompt, ..
            } => face_swap_instruction(prompt, negative_prompt, has_mask),
            RemoteOp::TryOn { shoes, look, .. } => try_on_instruction(look, shoes.is_some()),
            RemoteOp::SuperheroFusion { .. } => "Fuse the person in the first image with the superhero in the \
                second image. Keep the first person's face, but apply the hero's suit and style."
                .to_string(),
            RemoteOp::CreativeFusion { .. } => {
                "Use the composition of the first image and apply the style of the images that follow.".to_string()
            }
            RemoteOp::AiPortrait { style, prompt, .. } => format!(
                "Create a portrait in the '{}' style using the person or people in the image(s). \
                 Additional instructions: {}",
                style.trim(),
                or_default(prompt, "none")
            ),
        }
    }

    /// Images sent between the base image and the mask, in order.
    fn extra_images(&self) -> Result<Vec<&Artifact>, EditError> {
        Ok(match self {
            RemoteOp::FaceSwap { source, .. } => vec![required_image(source)?],
            RemoteOp::SuperheroFusion { hero } => vec![required_image(hero)?],
            RemoteOp::TryOn { garment, shoes, .. } => {
                let mut images = vec![required_image(garment)?];
                images.extend(shoes.iter().filter(|s| !s.is_empty()));
                images
            }
            RemoteOp::CreativeFusion { styles } => {
                let styles = present(styles);
                if styles.is_empty() {
                    return Err(EditError::MissingInput(MissingInput::SourceImage));
                }
                styles
            }
            RemoteOp::AiPortrait { people, .. } => present(people),
            _ => Vec::new(),
        })
    }

    /// Assemble the request: base image, extra images, mask, then instruction.
    pub fn build(&self, base: &Artifact, mask: Option<&Artifact>, model: &str) -> Result<RemoteRequest, EditError> {
        self.validate()?;
        let mask = if self.uses_mask() { mask } else { None };
        if self.requires_mask() && mask.is_none() {
            return Err(EditError::MissingInput(MissingInput::Mask));
        }

        let mut parts = vec![InputPart::Image(base.clone())];
        parts.extend(self.extra_images()?.into_iter().cloned().map(InputPart::Image));
        if let Some(mask) = mask {
            parts.push(InputPart::Image(mask.clone()));
        }
        parts.push(InputPart::Text(self.instruction(mask.is_some())));

        Ok(RemoteRequest::new(model, parts).with_config(serde_json::json!({ "responseModalities": ["IMAGE"] })))
    }

    /// Build from a tool id and loosely typed params (CLI, saved recipes,
    /// tool suggestions). `sources` are the images besides the base, in the
    /// order the tool sends them. Missing values take the tool's defaults.
    pub fn from_tool(
        tool: ToolId,
        params: &ToolParams,
        prompt: &str,
        sources: Vec<Artifact>,
    ) -> Result<RemoteOp, EditError> {
        let num = |key: &str, default: u32| {
            params
                .get(key)
                .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .map(|v| v.min(u32::MAX as u64) as u32)
                .unwrap_or(default)
        };
        let flag = |key: &str, default: bool| {
            params
                .get(key)
                .and_then(|v| v.as_bool().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
                .unwrap_or(default)
        };
        let text = |key: &str, default: &str| {
            params
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| default.to_string())
        };
        let prompt = text("prompt", prompt);
        let mut sources = sources.into_iter();
        let mut next_source = || sources.next().ok_or(EditError::MissingInput(MissingInput::SourceImage));

        Ok(match tool {
            ToolId::RemoveBg => RemoteOp::RemoveBg,
            ToolId::Upscale => RemoteOp::Upscale {
                factor: num("factor", 2),
                preserve_face: flag("preserve_face", true),
            },
            ToolId::Relight => RemoteOp::Relight { prompt },
            ToolId::LowPoly => RemoteOp::LowPoly,
            ToolId::DustAndScratches => RemoteOp::DustAndScratches,
            ToolId::ExtractArt => RemoteOp::ExtractArt,
            ToolId::Denoise => RemoteOp::Denoise,
            ToolId::FaceRecovery => RemoteOp::FaceRecovery,
            ToolId::Unblur => RemoteOp::Unblur {
                sharpen: num("sharpen", 50),
                denoise: num("denoise", 20),
                model: text("model", "standard"),
            },
            ToolId::Style => RemoteOp::Style { prompt },
            ToolId::PhotoRestoration => RemoteOp::PhotoRestoration {
                colorize: flag("colorize", false),
            },
            ToolId::ProfessionalPortrait => RemoteOp::ProfessionalPortrait,
            ToolId::Outpaint => RemoteOp::Outpaint {
                prompt,
                aspect_ratio: text("aspect_ratio", "16:9"),
            },
            ToolId::AiAdjust => RemoteOp::AiAdjust { prompt },
            ToolId::Variation => RemoteOp::Variation {
                strength: num("strength", 50),
            },
            ToolId::GenerativeEdit => RemoteOp::GenerativeEdit {
                prompt,
                mode: match text("mode", "fill").as_str() {
                    "remove" => EditMode::Remove,
                    _ => EditMode::Fill,
                },
            },
            ToolId::ObjectRemover => RemoteOp::GenerativeEdit {
                prompt,
                mode: EditMode::Remove,
            },
            ToolId::RetouchFace => RemoteOp::RetouchFace,
            ToolId::FaceSwap => RemoteOp::FaceSwap {
                source: next_source()?,
                prompt,
                negative_prompt: text("negative_prompt", ""),
            },
            ToolId::TryOn => {
                let defaults = TryOnLook::default();
                RemoteOp::TryOn {
                    garment: next_source()?,
                    shoes: next_source().ok(),
                    look: TryOnLook {
                        scene: text("scene", &prompt),
                        pose: text("pose", &defaults.pose),
                        lens: text("lens", &defaults.lens),
                        angle: text("angle", &defaults.angle),
                        lighting: text("lighting", &defaults.lighting),
                        negative_prompt: text("negative_prompt", &defaults.negative_prompt),
                    },
                }
            }
            ToolId::SuperheroFusion => RemoteOp::SuperheroFusion { hero: next_source()? },
            ToolId::CreativeFusion => {
                let styles: Vec<Artifact> = std::iter::from_fn(|| next_source().ok()).collect();
                if styles.is_empty() {
                    return Err(EditError::MissingInput(MissingInput::SourceImage));
                }
                RemoteOp::CreativeFusion { styles }
            }
            ToolId::AiPortrait => RemoteOp::AiPortrait {
                style: text("style", "studio"),
                people: std::iter::from_fn(|| next_source().ok()).collect(),
                prompt,
            },
            other => {
                return Err(EditError::InvalidParameter(format!("{other} is not a single remote edit")));
            }
        })
    }
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tool().id())
    }
}

fn try_on_instruction(look: &TryOnLook, with_shoes: bool) -> String {
    let mut s = String::from(
        "Act as a senior digital stylist and CGI specialist.\n\n\
         Task: a high fidelity, photorealistic virtual try-on.\n\n\
         Inputs:\n\
         - Image 1 (model): the person, their body, pose and skin tone.\n\
         - Image 2 (garment): the clothing to wear, its texture, fit and style.\n",
    );
    if with_shoes {
        s.push_str("- Image 3 (footwear): the shoes to wear.\n");
    }
    let scene = if look.scene.trim().is_empty() {
        "Keep the original background if possible, or use a soft neutral backdrop.".to_string()
    } else {
        format!("Place the model realistically in this new setting: \"{}\".", look.scene.trim())
    };
    s.push_str(&format!(
        "\nGuidelines:\n\
         1. Drape the garment from image 2 over the body in image 1 following gravity and fabric tension, \
            with compression folds that match the pose: \"{pose}\".\n\
         2. Keep the face, skin tone and hands from image 1 intact.\n\
         3. Long hair falls over the new clothing.\n\
         4. Cast shadows between garment and skin from the original light or from: \"{lighting}\".\n\
         5. {scene} Camera: {lens}, {angle}.\n\n\
         Output: only the final processed image in high resolution.",
        pose = look.pose.trim(),
        lighting = look.lighting.trim(),
        lens = look.lens.trim(),
        angle = look.angle.trim(),
    ));
    if !look.negative_prompt.trim().is_empty() {
        s.push_str(&format!("\nAvoid: {}", look.negative_prompt.trim()));
    }
    s
}

fn face_swap_instruction(prompt: &str, negative_prompt: &str, has_mask: bool) -> String {
    let mut s = String::from(
        "Task: photorealistic face swap.\n\n\
         You receive a target image (first) and a source image (second). Replace the head and identity \
         of the person in the target image with the head and identity of the person in the source image.\n\n\
         Rules:\n\
         1. Keep the target's body, clothing, accessories and background unchanged. Only the head and neck change.\n\
         2. Transfer the source's full identity: facial structure, hair, ears, neck shape and unique marks.\n\
         3. Rebuild the head in place, never paste it. Match the original head's scale, angle and lighting, \
            and blend the neck skin seamlessly into the target body.\n",
    );
    if has_mask {
        s.push_str(
            "\nA third image is a mask. Perform the swap strictly inside its white area on the target image \
             and ignore the black area.\n",
        );
    }
    s.push_str(&format!(
        "\nAdditional instructions: \"{}\"\nThings to avoid: \"{}\"\n\n\
         Output: a single high quality photorealistic image with the swap complete.",
        or_default(prompt, "none"),
        or_default(negative_prompt, "none"),
    ));
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn img(name: &str) -> Artifact {
        Artifact::new(name, "image/png", vec![1u8, 2, 3])
    }

    fn image_count(req: &RemoteRequest) -> usize {
        req.parts.iter().filter(|p| matches!(p, InputPart::Image(_))).count()
    }

    #[test]
    fn single_image_ops_send_image_then_text() {
        let req = RemoteOp::RemoveBg.build(&img("base"), None, "m").unwrap();
        assert_eq!(req.model, "m");
        assert!(matches!(req.parts[0], InputPart::Image(_)));
        assert!(matches!(req.parts.last(), Some(InputPart::Text(_))));
        assert_eq!(req.config.as_ref().unwrap()["responseModalities"][0], "IMAGE");
    }

    #[test]
    fn masked_ops_require_mask_and_send_it_second() {
        let op = RemoteOp::GenerativeEdit {
            prompt: String::new(),
            mode: EditMode::Remove,
        };
        assert!(matches!(
            op.build(&img("base"), None, "m"),
            Err(EditError::MissingInput(MissingInput::Mask))
        ));
        let req = op.build(&img("base"), Some(&img("mask")), "m").unwrap();
        assert_eq!(image_count(&req), 2);
        assert!(matches!(&req.parts[1], InputPart::Image(a) if a.name() == "mask"));
        assert_eq!(op.tool(), ToolId::ObjectRemover);
    }

    #[test]
    fn fill_needs_a_prompt() {
        let op = RemoteOp::GenerativeEdit {
            prompt: "   ".into(),
            mode: EditMode::Fill,
        };
        assert!(matches!(
            op.build(&img("base"), Some(&img("mask")), "m"),
            Err(EditError::MissingInput(MissingInput::Prompt))
        ));
    }

    #[test]
    fn unmasked_ops_ignore_a_stray_mask() {
        let req = RemoteOp::Denoise.build(&img("base"), Some(&img("mask")), "m").unwrap();
        assert_eq!(image_count(&req), 1);
    }

    #[test]
    fn face_swap_orders_target_source_mask_text() {
        let op = RemoteOp::FaceSwap {
            source: img("face"),
            prompt: "smile".into(),
            negative_prompt: "glasses".into(),
        };
        let req = op.build(&img("target"), Some(&img("mask")), "m").unwrap();
        let names: Vec<&str> = req
            .parts
            .iter()
            .filter_map(|p| match p {
                InputPart::Image(a) => Some(a.name()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["target", "face", "mask"]);
        let InputPart::Text(text) = req.parts.last().unwrap() else {
            panic!("last part must be text");
        };
        assert!(text.contains("\"smile\""));
        assert!(text.contains("\"glasses\""));
        assert!(text.contains("mask"));

        let without_mask = op.build(&img("target"), None, "m").unwrap();
        assert_eq!(image_count(&without_mask), 2);
        assert_eq!(op.params()["source"], "face");
    }

    #[test]
    fn params_are_recorded_per_tool() {
        let p = RemoteOp::Upscale {
            factor: 4,
            preserve_face: true,
        }
        .params();
        assert_eq!(p["factor"], 4);
        assert_eq!(p["preserve_face"], true);
        assert!(RemoteOp::RemoveBg.params().is_empty());
    }

    #[test]
    fn invalid_levels_are_rejected() {
        let op = RemoteOp::Upscale {
            factor: 16,
            preserve_face: false,
        };
        assert!(matches!(op.build(&img("b"), None, "m"), Err(EditError::InvalidParameter(_))));
    }

    #[test]
    fn from_tool_reads_loose_params() {
        let p = crate::params! { "factor" => "4", "preserve_face" => false };
        let op = RemoteOp::from_tool(ToolId::Upscale, &p, "", vec![]).unwrap();
        assert!(matches!(
            op,
            RemoteOp::Upscale {
                factor: 4,
                preserve_face: false
            }
        ));
        assert!(matches!(
            RemoteOp::from_tool(ToolId::FaceSwap, &ToolParams::new(), "", vec![]),
            Err(EditError::MissingInput(MissingInput::SourceImage))
        ));
        assert!(RemoteOp::from_tool(ToolId::Crop, &ToolParams::new(), "", vec![]).is_err());
    }

    fn image_names(req: &RemoteRequest) -> Vec<&str> {
        req.parts
            .iter()
            .filter_map(|p| match p {
                InputPart::Image(a) => Some(a.name()),
                _ => None,
            })
            .collect()
    }

    fn instruction_of(req: &RemoteRequest) -> &str {
        match req.parts.last() {
            Some(InputPart::Text(text)) => text,
            _ => panic!("last part must be text"),
        }
    }

    #[test]
    fn try_on_sends_person_garment_shoes_then_direction() {
        let op = RemoteOp::TryOn {
            garment: img("dress"),
            shoes: Some(img("boots")),
            look: TryOnLook {
                scene: "a rooftop at dusk".into(),
                ..TryOnLook::default()
            },
        };
        let req = op.build(&img("person"), Some(&img("mask")), "m").unwrap();
        assert_eq!(image_names(&req), vec!["person", "dress", "boots"], "try-on never sends the mask");
        let text = instruction_of(&req);
        assert!(text.contains("Image 3 (footwear)"));
        assert!(text.contains("\"a rooftop at dusk\""));
        assert!(text.contains("Avoid: deformed"));
        assert_eq!(op.tool(), ToolId::TryOn);
        assert_eq!(op.params()["garment"], "dress");
        assert_eq!(op.params()["shoes"], "boots");

        let barefoot = RemoteOp::TryOn {
            garment: img("dress"),
            shoes: None,
            look: TryOnLook::default(),
        };
        let req = barefoot.build(&img("person"), None, "m").unwrap();
        assert_eq!(image_names(&req), vec!["person", "dress"]);
        assert!(!instruction_of(&req).contains("Image 3"));
        assert!(instruction_of(&req).contains("original background"));
        assert_eq!(barefoot.params()["shoes"], serde_json::Value::Null);
    }

    #[test]
    fn try_on_needs_a_garment() {
        let op = RemoteOp::TryOn {
            garment: Artifact::new("empty", "image/png", Vec::new()),
            shoes: None,
            look: TryOnLook::default(),
        };
        assert!(matches!(
            op.build(&img("person"), None, "m"),
            Err(EditError::MissingInput(MissingInput::SourceImage))
        ));
        assert!(matches!(
            RemoteOp::from_tool(ToolId::TryOn, &ToolParams::new(), "", vec![]),
            Err(EditError::MissingInput(MissingInput::SourceImage))
        ));
    }

    #[test]
    fn try_on_from_params_uses_prompt_as_scene() {
        let p = crate::params! { "lighting" => "golden hour" };
        let op = RemoteOp::from_tool(ToolId::TryOn, &p, "a beach", vec![img("shirt"), img("shoes")]).unwrap();
        let RemoteOp::TryOn { garment, shoes, look } = op else {
            panic!("expected a try-on");
        };
        assert_eq!(garment.name(), "shirt");
        assert_eq!(shoes.map(|s| s.name().to_string()).as_deref(), Some("shoes"));
        assert_eq!(look.scene, "a beach");
        assert_eq!(look.lighting, "golden hour");
        assert_eq!(look.angle, TryOnLook::default().angle);
    }

    #[test]
    fn superhero_fusion_sends_person_then_hero() {
        let op = RemoteOp::SuperheroFusion { hero: img("hero") };
        let req = op.build(&img("person"), None, "m").unwrap();
        assert_eq!(image_names(&req), vec!["person", "hero"]);
        assert!(instruction_of(&req).contains("superhero"));
        assert_eq!(op.params()["hero"], "hero");
        assert_eq!(op.tool(), ToolId::SuperheroFusion);
    }

    #[test]
    fn creative_fusion_sends_composition_then_every_style() {
        let op = RemoteOp::CreativeFusion {
            styles: vec![img("monet"), Artifact::new("blank", "image/png", Vec::new()), img("hokusai")],
        };
        let req = op.build(&img("layout"), None, "m").unwrap();
        assert_eq!(image_names(&req), vec!["layout", "monet", "hokusai"]);
        assert!(instruction_of(&req).contains("composition of the first image"));

        let none = RemoteOp::CreativeFusion { styles: vec![] };
        assert!(matches!(
            none.build(&img("layout"), None, "m"),
            Err(EditError::MissingInput(MissingInput::SourceImage))
        ));
    }

    #[test]
    fn ai_portrait_needs_a_style_and_takes_extra_people() {
        let op = RemoteOp::AiPortrait {
            style: "film noir".into(),
            people: vec![img("friend")],
            prompt: String::new(),
        };
        let req = op.build(&img("me"), None, "m").unwrap();
        assert_eq!(image_names(&req), vec!["me", "friend"]);
        let text = instruction_of(&req);
        assert!(text.contains("'film noir'"));
        assert!(text.ends_with("Additional instructions: none"));
        assert_eq!(op.tool().id(), "aiPortraitStudio");

        let unstyled = RemoteOp::AiPortrait {
            style: " ".into(),
            people: vec![],
            prompt: "smiling".into(),
        };
        assert!(matches!(unstyled.validate(), Err(EditError::MissingInput(MissingInput::Prompt))));
    }
}
