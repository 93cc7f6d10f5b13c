//! Prompt templates bundled at compile time, and the user prompt builder.

use std::collections::BTreeMap;

use crate::artifact::Artifact;

/// SOR codes merge instructions
pub const SOR_CODES: &str = include_str!("defaults/sor_codes.md");

/// Rules merge instructions
pub const RULES: &str = include_str!("defaults/rules.md");

/// Business-unit onboarding merge instructions
pub const BU_ONBOARDING: &str = include_str!("defaults/bu_onboarding.md");

/// Placeholder for a missing answer
pub const NO_ANSWER: &str = "(no answer)";

fn template(artifact: Artifact) -> &'static str {
    match artifact {
        Artifact::SorCodes => SOR_CODES,
        Artifact::Rules => RULES,
        Artifact::BuOnboarding => BU_ONBOARDING,
    }
}

/// System instruction for an artifact, with its current content embedded
pub fn system_prompt(artifact: Artifact, existing: &str) -> String {
    template(artifact)
        .trim_end()
        .replace("{{format}}", artifact.format().tag())
        .replace("{{existing}}", existing.trim_end())
}

/// `INPUT DATA:` followed by one `Qn:`/`An:` block per question
pub fn user_prompt(questions: &[String], answers: &BTreeMap<usize, String>) -> String {
    let mut parts = vec!["INPUT DATA:".to_string()];
    for (index, question) in questions.iter().enumerate() {
        let answer = answers
            .get(&index)
            .map(String::as_str)
            .unwrap_or(NO_ANSWER);
        parts.push(format!(
            "Q{n}: {question}\nA{n}: {answer}",
            n = index + 1,
            question = question,
            answer = answer
        ));
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_layout() {
        let questions = vec!["Partition".to_string(), "BUS UNIT".to_string()];
        let mut answers = BTreeMap::new();
        answers.insert(0, "P1".to_string());

        assert_eq!(
            user_prompt(&questions, &answers),
            "INPUT DATA:\n\nQ1: Partition\nA1: P1\n\nQ2: BUS UNIT\nA2: (no answer)"
        );
    }

    #[test]
    fn test_system_prompt_embeds_existing_content() {
        let prompt = system_prompt(Artifact::Rules, "rules:\n  inv_ref_id_rccRule: {}\n");
        assert!(prompt.contains("```yaml"));
        assert!(prompt.ends_with("rules:\n  inv_ref_id_rccRule: {}"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_every_artifact_has_instructions() {
        for artifact in Artifact::ALL {
            assert!(system_prompt(artifact, "x: 1").contains("Never add"));
        }
    }
}
