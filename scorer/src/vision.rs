//! LLM alignment score against a repository vision document.

use core_types::{ScoredItem, VisionAlignment};
use llm_service::{GenerateOpts, ProviderAdapter};
use serde::Deserialize;
use tracing::debug;

const VISION_EXCERPT_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
struct VisionResponse {
    alignment: String,
    score: f64,
    reason: String,
}

pub struct VisionChecker;

impl VisionChecker {
    /// Checks every item whose `visionAlignment == unchecked`. No-op when
    /// no vision document is configured.
    pub async fn check_many(items: &mut [ScoredItem], vision_doc: Option<&str>, provider: Option<&ProviderAdapter>) {
        let (Some(doc), Some(provider)) = (vision_doc, provider) else {
            debug!("no vision document or provider configured, skipping vision check");
            return;
        };
        let excerpt: String = doc.chars().take(VISION_EXCERPT_CHARS).collect();

        for item in items.iter_mut() {
            if item.vision_alignment != VisionAlignment::Unchecked {
                continue;
            }
            let prompt = format!(
                "Repository vision:\n{excerpt}\n\nAssess whether this item aligns with the vision. \
                 Respond with strict JSON: {{\"alignment\": \"aligned\"|\"tangential\"|\"off-roadmap\", \
                 \"score\": 0..100, \"reason\": \"...\"}}.\n\nTitle: {}\nBody: {}",
                item.item.title(),
                item.item.body().chars().take(1000).collect::<String>()
            );

            match provider.generate_text(&prompt, GenerateOpts::default()).await {
                Ok(raw) => match serde_json::from_str::<VisionResponse>(raw.trim()) {
                    Ok(parsed) => {
                        item.vision_alignment = parse_alignment(&parsed.alignment);
                        item.vision_score = Some(parsed.score.clamp(0.0, 100.0));
                        debug!(reason = %parsed.reason, "vision check reason");
                    }
                    Err(e) => {
                        debug!(error = %e, "vision response failed schema validation, coercing to tangential");
                        item.vision_alignment = VisionAlignment::Tangential;
                    }
                },
                Err(e) => {
                    debug!(error = %e, "vision check call failed, leaving alignment unchecked");
                }
            }
        }
    }
}

fn parse_alignment(raw: &str) -> VisionAlignment {
    match raw {
        "aligned" => VisionAlignment::Aligned,
        "off-roadmap" => VisionAlignment::OffRoadmap,
        "tangential" => VisionAlignment::Tangential,
        _ => VisionAlignment::Tangential,
    }
}
