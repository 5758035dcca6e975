use aho_corasick::{AhoCorasick, BuildError};
use serde::{Deserialize, Serialize};

use crate::models::MediaAttachment;

const IMAGE_GENERATION_KEYWORDS: &[&str] = &["generate", "create", "draw", "paint", "make an image"];
const IMAGE_EDIT_KEYWORDS: &[&str] = &["edit", "add", "filter", "remove", "change"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    ImageGeneration,
    ImageEdit,
    StandardConversation,
}

/// Keyword classifier that picks the generation path for a turn.
///
/// Matching is case-insensitive substring search, so "Add" and "address" both
/// count as the edit keyword `add`.
pub struct TaskDetector {
    generation: AhoCorasick,
    edit: AhoCorasick,
}

impl TaskDetector {
    pub fn new() -> Result<Self, BuildError> {
        Ok(Self {
            generation: Self::automaton(IMAGE_GENERATION_KEYWORDS)?,
            edit: Self::automaton(IMAGE_EDIT_KEYWORDS)?,
        })
    }

    fn automaton(keywords: &[&str]) -> Result<AhoCorasick, BuildError> {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(keywords)
    }

    pub fn detect_task(&self, text: &str, media: Option<&MediaAttachment>) -> GenerationMode {
        // Priority order: ImageEdit > ImageGeneration > StandardConversation
        let has_image = media.is_some_and(MediaAttachment::is_image);
        if has_image && self.edit.is_match(text) {
            return GenerationMode::ImageEdit;
        }

        if self.generation.is_match(text) {
            return GenerationMode::ImageGeneration;
        }

        GenerationMode::StandardConversation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;

    fn attachment(kind: MediaKind) -> MediaAttachment {
        MediaAttachment {
            data: "AAAA".to_string(),
            mime_type: match kind {
                MediaKind::Image => "image/png",
                MediaKind::Video => "video/mp4",
                MediaKind::Audio => "audio/wav",
            }
            .to_string(),
            kind,
        }
    }

    #[test]
    fn test_generation_keywords_without_media() {
        let detector = TaskDetector::new().unwrap();
        for text in [
            "Generate an image of a red fox",
            "please DRAW a castle",
            "paint me a sunset",
            "can you make an image of a cat",
            "Create a logo",
        ] {
            assert_eq!(detector.detect_task(text, None), GenerationMode::ImageGeneration, "{text}");
        }
    }

    #[test]
    fn test_edit_with_image_attached() {
        let detector = TaskDetector::new().unwrap();
        let image = attachment(MediaKind::Image);
        assert_eq!(
            detector.detect_task("add a retro filter", Some(&image)),
            GenerationMode::ImageEdit
        );
        assert_eq!(
            detector.detect_task("Remove the background", Some(&image)),
            GenerationMode::ImageEdit
        );
    }

    #[test]
    fn test_edit_takes_precedence_over_generation() {
        let detector = TaskDetector::new().unwrap();
        let image = attachment(MediaKind::Image);
        assert_eq!(
            detector.detect_task("generate a version and change the sky", Some(&image)),
            GenerationMode::ImageEdit
        );
    }

    #[test]
    fn test_generation_with_media_but_no_edit_keyword() {
        let detector = TaskDetector::new().unwrap();
        let image = attachment(MediaKind::Image);
        assert_eq!(
            detector.detect_task("create something inspired by this", Some(&image)),
            GenerationMode::ImageGeneration
        );
    }

    #[test]
    fn test_edit_keyword_needs_image_media() {
        let detector = TaskDetector::new().unwrap();
        let video = attachment(MediaKind::Video);
        assert_eq!(
            detector.detect_task("edit this clip", Some(&video)),
            GenerationMode::StandardConversation
        );
        assert_eq!(detector.detect_task("edit my essay", None), GenerationMode::StandardConversation);
    }

    #[test]
    fn test_plain_conversation() {
        let detector = TaskDetector::new().unwrap();
        assert_eq!(
            detector.detect_task("What's the weather forecast logic?", None),
            GenerationMode::StandardConversation
        );
        assert_eq!(detector.detect_task("", None), GenerationMode::StandardConversation);
    }
}
