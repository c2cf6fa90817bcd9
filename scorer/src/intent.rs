//! Conventional-commit → LLM → keyword-heuristic cascade.

use std::sync::LazyLock;

use core_types::Intent;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use llm_service::{GenerateOpts, ProviderAdapter};

pub static CONVENTIONAL_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)(\([^)]*\))?!?:").expect("static regex"));

pub static CONVENTIONAL_BANG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+(\([^)]*\))?!:").expect("static regex"));

const DEP_KEYWORDS: [&str; 5] = ["bump", "upgrade dependency", "dependabot", "dependency", "deps"];
const DEP_FILES: [&str; 6] = [
    "Cargo.lock",
    "Cargo.toml",
    "package.json",
    "package-lock.json",
    "go.sum",
    "requirements.txt",
];

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct LlmIntentResponse {
    intent: String,
    confidence: f64,
    reason: String,
}

pub struct IntentClassifier;

impl IntentClassifier {
    pub async fn classify(
        title: &str,
        body: &str,
        changed_files: &[String],
        provider: Option<&ProviderAdapter>,
    ) -> IntentResult {
        if let Some(result) = Self::conventional(title) {
            return result;
        }
        if let Some(provider) = provider {
            if let Some(result) = Self::llm(title, body, provider).await {
                return result;
            }
        }
        Self::keyword_heuristic(title, body, changed_files)
    }

    fn conventional(title: &str) -> Option<IntentResult> {
        let caps = CONVENTIONAL_PREFIX.captures(title)?;
        let kind = caps.get(1)?.as_str().to_lowercase();
        let scope = caps.get(2).map(|m| m.as_str().to_lowercase());
        let is_dep_scope = scope
            .as_deref()
            .map(|s| s.contains("deps") || s.contains("dependencies"))
            .unwrap_or(false);

        let intent = match kind.as_str() {
            "fix" | "hotfix" => Intent::Bugfix,
            "feat" | "feature" => Intent::Feature,
            "refactor" | "perf" => Intent::Refactor,
            "docs" | "doc" => Intent::Docs,
            "ci" | "build" | "style" | "test" | "chore" => {
                if is_dep_scope && matches!(kind.as_str(), "chore" | "build") {
                    Intent::Dependency
                } else {
                    Intent::Chore
                }
            }
            _ => return None,
        };

        Some(IntentResult {
            intent,
            confidence: 1.0,
            reason: format!("conventional-commit prefix '{kind}'"),
        })
    }

    async fn llm(title: &str, body: &str, provider: &ProviderAdapter) -> Option<IntentResult> {
        let prompt = format!(
            "Classify this change into exactly one of bugfix, feature, refactor, dependency, docs, chore. \
             Respond with strict JSON: {{\"intent\": \"...\", \"confidence\": 0..1, \"reason\": \"...\"}}.\n\
             Title: {title}\nBody: {}",
            &body.chars().take(1000).collect::<String>()
        );
        let raw = provider.generate_text(&prompt, GenerateOpts::default()).await.ok()?;
        let parsed: LlmIntentResponse = serde_json::from_str(raw.trim()).ok()?;
        let intent = Intent::from_str_loose(&parsed.intent)?;
        Some(IntentResult {
            intent,
            confidence: parsed.confidence.clamp(0.0, 1.0),
            reason: parsed.reason,
        })
    }

    fn keyword_heuristic(title: &str, body: &str, changed_files: &[String]) -> IntentResult {
        let text = format!("{title} {body}").to_lowercase();

        let touches_dep_file = changed_files.iter().any(|f| DEP_FILES.iter().any(|d| f.ends_with(d)));
        if touches_dep_file || DEP_KEYWORDS.iter().any(|k| text.contains(k)) {
            return IntentResult {
                intent: Intent::Dependency,
                confidence: 0.7,
                reason: "dependency keyword or manifest file change".into(),
            };
        }

        let all_docs = !changed_files.is_empty() && changed_files.iter().all(|f| f.ends_with(".md") || f.contains("docs/"));
        if all_docs {
            return IntentResult {
                intent: Intent::Docs,
                confidence: 0.6,
                reason: "all changed files are documentation".into(),
            };
        }

        if ["fix", "bug", "crash", "error", "issue", "resolve", "patch", "hotfix"]
            .iter()
            .any(|k| text.contains(k))
        {
            return IntentResult {
                intent: Intent::Bugfix,
                confidence: 0.6,
                reason: "bugfix keyword match".into(),
            };
        }

        if ["refactor", "restructure", "reorganize", "cleanup", "simplify", "extract", "move"]
            .iter()
            .any(|k| text.contains(k))
        {
            return IntentResult {
                intent: Intent::Refactor,
                confidence: 0.5,
                reason: "refactor keyword match".into(),
            };
        }

        debug!("intent heuristic defaulted to feature");
        IntentResult {
            intent: Intent::Feature,
            confidence: 0.5,
            reason: "no stronger signal found, defaulting to feature".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conventional_prefix_wins_with_full_confidence() {
        let result = IntentClassifier::classify("fix: handle panic", "", &[], None).await;
        assert_eq!(result.intent, Intent::Bugfix);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn chore_with_deps_scope_becomes_dependency() {
        let result = IntentClassifier::classify("chore(deps): bump tokio", "", &[], None).await;
        assert_eq!(result.intent, Intent::Dependency);
    }

    #[tokio::test]
    async fn keyword_heuristic_detects_bugfix() {
        let result = IntentClassifier::classify("handle the crash on startup", "", &[], None).await;
        assert_eq!(result.intent, Intent::Bugfix);
    }

    #[tokio::test]
    async fn falls_back_to_feature_by_default() {
        let result = IntentClassifier::classify("add support for widgets", "", &[], None).await;
        assert_eq!(result.intent, Intent::Feature);
    }
}
