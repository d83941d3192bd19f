//! Structured brainstorming prompts.
//!
//! A [`BrainstormRequest`] names a challenge, an ideation methodology and
//! optional context. [`BrainstormRequest::build_prompt`] turns it into the
//! framed prompt sent to the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::{ApprovalPolicy, EngineOptions, SandboxMode};
use crate::exec::ExecutionOptions;

pub const DEFAULT_IDEA_COUNT: u32 = 12;

/// Ideation framework the engine is asked to follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Methodology {
    Divergent,
    Convergent,
    Scamper,
    DesignThinking,
    Lateral,
    #[default]
    Auto,
}

impl Methodology {
    pub fn as_str(self) -> &'static str {
        match self {
            Methodology::Divergent => "divergent",
            Methodology::Convergent => "convergent",
            Methodology::Scamper => "scamper",
            Methodology::DesignThinking => "design-thinking",
            Methodology::Lateral => "lateral",
            Methodology::Auto => "auto",
        }
    }

    /// Framework section of the prompt.
    pub fn instructions(self, domain: Option<&str>) -> String {
        match self {
            Methodology::Divergent => "**Divergent Thinking Approach:**
- Generate maximum quantity of ideas without self-censoring
- Build on wild or seemingly impractical ideas
- Combine unrelated concepts for unexpected solutions
- Use \"Yes, and...\" thinking to expand each concept
- Postpone evaluation until all ideas are generated"
                .to_string(),
            Methodology::Convergent => "**Convergent Thinking Approach:**
- Focus on refining and improving existing concepts
- Synthesize related ideas into stronger solutions
- Apply critical evaluation criteria
- Prioritize based on feasibility and impact
- Develop implementation pathways for top ideas"
                .to_string(),
            Methodology::Scamper => "**SCAMPER Creative Triggers:**
- **Substitute:** What can be substituted or replaced?
- **Combine:** What can be combined or merged?
- **Adapt:** What can be adapted from other domains?
- **Modify:** What can be magnified, minimized, or altered?
- **Put to other use:** How else can this be used?
- **Eliminate:** What can be removed or simplified?
- **Reverse:** What can be rearranged or reversed?"
                .to_string(),
            Methodology::DesignThinking => "**Human-Centered Design Thinking:**
- **Empathize:** Consider user needs, pain points, and contexts
- **Define:** Frame problems from user perspective
- **Ideate:** Generate user-focused solutions
- **Consider Journey:** Think through complete user experience
- **Prototype Mindset:** Focus on testable, iterative concepts"
                .to_string(),
            Methodology::Lateral => "**Lateral Thinking Approach:**
- Make unexpected connections between unrelated fields
- Challenge fundamental assumptions
- Use random word association to trigger new directions
- Apply metaphors and analogies from other domains
- Reverse conventional thinking patterns"
                .to_string(),
            Methodology::Auto => {
                let lead = match domain {
                    Some(domain) => format!(
                        "Given the {domain} domain, apply the most effective combination of:"
                    ),
                    None => "Combine multiple methodologies:".to_string(),
                };
                format!(
                    "**Adaptive Approach:**
{lead}
- Divergent exploration with domain-specific knowledge
- SCAMPER triggers and lateral thinking
- Human-centered perspective for practical value"
                )
            }
        }
    }
}

impl fmt::Display for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Methodology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "divergent" => Ok(Methodology::Divergent),
            "convergent" => Ok(Methodology::Convergent),
            "scamper" => Ok(Methodology::Scamper),
            "design-thinking" => Ok(Methodology::DesignThinking),
            "lateral" => Ok(Methodology::Lateral),
            "auto" => Ok(Methodology::Auto),
            other => Err(format!(
                "unknown methodology '{other}' (expected divergent, convergent, scamper, design-thinking, lateral or auto)"
            )),
        }
    }
}

/// One brainstorming session, as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainstormRequest {
    pub prompt: String,
    pub methodology: Methodology,
    pub domain: Option<String>,
    pub constraints: Option<String>,
    /// Background, previous attempts or current state to build on.
    pub existing_context: Option<String>,
    pub idea_count: u32,
    /// Ask for feasibility, impact and innovation ratings per idea.
    pub include_analysis: bool,
    pub model: Option<String>,
    pub full_auto: bool,
    pub approval_policy: Option<ApprovalPolicy>,
    pub sandbox_mode: Option<SandboxMode>,
    pub yolo: bool,
    pub working_dir: Option<String>,
}

impl Default for BrainstormRequest {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            methodology: Methodology::default(),
            domain: None,
            constraints: None,
            existing_context: None,
            idea_count: DEFAULT_IDEA_COUNT,
            include_analysis: true,
            model: None,
            full_auto: false,
            approval_policy: None,
            sandbox_mode: None,
            yolo: false,
            working_dir: None,
        }
    }
}

impl BrainstormRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn engine_options(&self, execution: &ExecutionOptions) -> EngineOptions {
        EngineOptions {
            model: self.model.clone(),
            full_auto: self.full_auto,
            approval_policy: self.approval_policy,
            sandbox_mode: self.sandbox_mode,
            yolo: self.yolo,
            working_dir: self.working_dir.clone(),
            execution: execution.clone(),
            ..EngineOptions::default()
        }
    }

    /// First progress line reported before the engine starts.
    pub fn progress_message(&self) -> String {
        format!(
            "Generating {} ideas via {} methodology...",
            self.idea_count, self.methodology
        )
    }

    /// The framed prompt for the engine.
    pub fn build_prompt(&self) -> String {
        let domain = non_blank(&self.domain);
        let mut context = Vec::new();
        if let Some(domain) = domain {
            context.push(format!("Domain: {domain}"));
        }
        if let Some(constraints) = non_blank(&self.constraints) {
            context.push(format!("Constraints: {constraints}"));
        }
        if let Some(background) = non_blank(&self.existing_context) {
            context.push(format!("Background: {background}"));
        }

        let mut sections = vec![
            "# BRAINSTORMING SESSION".to_string(),
            format!("## Challenge: {}", self.prompt.trim()),
            format!("## Framework\n{}", self.methodology.instructions(domain)),
        ];
        if !context.is_empty() {
            sections.push(format!("## Context\n{}", context.join("\n")));
        }
        sections.push(format!(
            "## Requirements\nGenerate {} actionable ideas. Keep descriptions concise (2-3 sentences max).",
            self.idea_count
        ));
        if self.include_analysis {
            sections.push(
                "## Analysis\nRate each: Feasibility (1-5), Impact (1-5), Innovation (1-5)"
                    .to_string(),
            );
        }
        let mut format = String::from("## Format\n### Idea [N]: [Name]\nDescription: [2-3 sentences]");
        if self.include_analysis {
            format.push_str("\nRatings: F:[1-5] I:[1-5] N:[1-5]");
        }
        sections.push(format);
        sections.push("Begin:".to_string());
        sections.join("\n\n")
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let request: BrainstormRequest = serde_json::from_str(r#"{"prompt": "p"}"#).unwrap();
        assert_eq!(request.methodology, Methodology::Auto);
        assert_eq!(request.idea_count, DEFAULT_IDEA_COUNT);
        assert!(request.include_analysis);
    }

    #[test]
    fn test_methodology_names_round_trip() {
        for name in ["divergent", "convergent", "scamper", "design-thinking", "lateral", "auto"] {
            let parsed: Methodology = name.parse().unwrap();
            assert_eq!(parsed.to_string(), name);
            let json: Methodology = serde_json::from_str(&format!("\"{name}\"")).unwrap();
            assert_eq!(json, parsed);
        }
        assert!("brainwave".parse::<Methodology>().is_err());
    }

    #[test]
    fn test_prompt_carries_challenge_framework_and_context() {
        let request = BrainstormRequest {
            methodology: Methodology::Scamper,
            domain: Some("developer tooling".into()),
            constraints: Some("no network access".into()),
            existing_context: Some("we tried a plugin system".into()),
            idea_count: 5,
            ..BrainstormRequest::new("  faster code review  ")
        };
        let prompt = request.build_prompt();

        assert!(prompt.starts_with("# BRAINSTORMING SESSION\n\n## Challenge: faster code review\n\n"));
        assert!(prompt.contains("## Framework\n**SCAMPER Creative Triggers:**"));
        assert!(prompt.contains(
            "## Context\nDomain: developer tooling\nConstraints: no network access\nBackground: we tried a plugin system"
        ));
        assert!(prompt.contains("Generate 5 actionable ideas."));
        assert!(prompt.contains("## Analysis\nRate each: Feasibility (1-5)"));
        assert!(prompt.contains("Ratings: F:[1-5] I:[1-5] N:[1-5]"));
        assert!(prompt.ends_with("Begin:"));
    }

    #[test]
    fn test_prompt_without_analysis_or_context() {
        let request = BrainstormRequest {
            include_analysis: false,
            domain: Some("   ".into()),
            ..BrainstormRequest::new("names for a cat")
        };
        let prompt = request.build_prompt();
        assert!(!prompt.contains("## Context"));
        assert!(!prompt.contains("## Analysis"));
        assert!(!prompt.contains("Ratings:"));
        assert!(prompt.contains("Combine multiple methodologies:"));
    }

    #[test]
    fn test_auto_methodology_mentions_domain() {
        let text = Methodology::Auto.instructions(Some("finance"));
        assert!(text.contains("Given the finance domain"));
    }

    #[test]
    fn test_progress_message() {
        let request = BrainstormRequest {
            methodology: Methodology::DesignThinking,
            idea_count: 20,
            ..BrainstormRequest::new("p")
        };
        assert_eq!(
            request.progress_message(),
            "Generating 20 ideas via design-thinking methodology..."
        );
    }
}
