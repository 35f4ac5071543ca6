//! Prompt construction from matcher output.
//!
//! Pure string building over [`Match`]es and the loader's body cache.
//! Skills render as `<skill>` elements inside an `<active_skills>` block.

use std::sync::Arc;

use crate::capability::SkillKind;
use crate::error::Result;
use crate::loader::Loader;
use crate::matcher::Match;

#[derive(Debug)]
pub struct Injector {
    loader: Arc<Loader<SkillKind>>,
}

impl Injector {
    pub fn new(loader: Arc<Loader<SkillKind>>) -> Self {
        Self { loader }
    }

    /// Append the skill context for `matches` to `base`. Returns `base`
    /// unchanged when nothing matched.
    pub fn inject_to_prompt(&self, base: &str, matches: &[Match]) -> String {
        if matches.is_empty() {
            return base.to_string();
        }
        format!("{}\n\n{}", base.trim_end(), self.build_skill_context(matches))
    }

    /// Full context: name, score, reason and instruction body per skill.
    pub fn build_skill_context(&self, matches: &[Match]) -> String {
        if matches.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = matches
            .iter()
            .map(|m| {
                let body = self.body_or_description(&m.skill.name, &m.skill.description);
                format!(
                    "<skill>\n<name>{}</name>\n<relevance>{:.0}% ({})</relevance>\n<description>{}</description>\n<instructions>\n{}\n</instructions>\n</skill>",
                    m.skill.name,
                    m.score * 100.0,
                    if m.reason.is_empty() { "matched" } else { m.reason.as_str() },
                    m.skill.description,
                    body,
                )
            })
            .collect();
        format!(
            "<active_skills>\nThe following skills apply to this task. Follow their instructions.\n{}\n</active_skills>",
            parts.join("\n")
        )
    }

    /// Context for one named skill regardless of score.
    pub fn build_single_skill_context(&self, name: &str) -> Result<String> {
        let skill = self.loader.registry().get(name)?;
        let body = self.body_or_description(&skill.name, &skill.description);
        Ok(format!(
            "<active_skills>\n<skill>\n<name>{}</name>\n<description>{}</description>\n<instructions>\n{}\n</instructions>\n</skill>\n</active_skills>",
            skill.name, skill.description, body
        ))
    }

    /// Names and descriptions only.
    pub fn build_minimal_context(&self, matches: &[Match]) -> String {
        if matches.is_empty() {
            return String::new();
        }
        let lines: Vec<String> = matches
            .iter()
            .map(|m| format!("- {}: {}", m.skill.name, m.skill.description))
            .collect();
        format!("<available_skills>\n{}\n</available_skills>", lines.join("\n"))
    }

    fn body_or_description(&self, name: &str, description: &str) -> String {
        match self.loader.get_body(name) {
            Ok(body) if !body.trim().is_empty() => body,
            _ => description.to_string(),
        }
    }
}
