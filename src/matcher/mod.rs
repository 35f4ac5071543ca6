//! Skill relevance scoring.
//!
//! Every enabled skill is scored against a [`Task`] from four signals:
//! description keywords (up to 0.5), task type (0.3 literal, 0.25 via a
//! synonym), repo type (0.2) and tags (0.1, counted once). The sum is
//! clamped to 1.0 and zero scores are dropped.
//!
//! Results are ordered by descending score. Equal scores have no
//! guaranteed relative order; the name tie-break applied here only keeps
//! output reproducible and is not part of the contract.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::capability::{Skill, SkillKind};
use crate::registry::Registry;

const KEYWORD_WEIGHT: f64 = 0.5;
const TASK_TYPE_WEIGHT: f64 = 0.3;
const TASK_TYPE_SYNONYM_WEIGHT: f64 = 0.25;
const REPO_TYPE_WEIGHT: f64 = 0.2;
const TAG_WEIGHT: f64 = 0.1;
const KEYWORD_REASON_THRESHOLD: f64 = 0.3;
const MIN_KEYWORD_LEN: usize = 3;

/// A unit of work to find skills for.
#[derive(Debug, Clone, Default)]
pub struct Task {
    pub task_type: String,
    pub description: String,
    pub repo_type: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub skill: Arc<Skill>,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug)]
pub struct Matcher {
    registry: Arc<Registry<SkillKind>>,
}

impl Matcher {
    pub fn new(registry: Arc<Registry<SkillKind>>) -> Self {
        Self { registry }
    }

    pub fn match_task(&self, task: &Task) -> Vec<Match> {
        let keywords = extract_keywords(&task.description);
        let mut matches: Vec<Match> = self
            .registry
            .list_enabled()
            .into_iter()
            .filter_map(|skill| {
                let (score, reason) = score_skill(&skill, task, &keywords);
                (score > 0.0).then_some(Match { skill, score, reason })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.skill.name.cmp(&b.skill.name))
        });
        matches
    }

    /// The `limit` best matches.
    pub fn top(&self, task: &Task, limit: usize) -> Vec<Match> {
        let mut all = self.match_task(task);
        all.truncate(limit);
        all
    }

    pub fn match_by_description(&self, description: &str) -> Vec<Match> {
        self.match_task(&Task {
            description: description.to_string(),
            ..Default::default()
        })
    }

    pub fn match_by_type(&self, task_type: &str, description: &str) -> Vec<Match> {
        self.match_task(&Task {
            task_type: task_type.to_string(),
            description: description.to_string(),
            ..Default::default()
        })
    }

    pub fn match_for_repo(&self, repo_type: &str, description: &str, tags: &[String]) -> Vec<Match> {
        self.match_task(&Task {
            repo_type: repo_type.to_string(),
            description: description.to_string(),
            tags: tags.to_vec(),
            ..Default::default()
        })
    }
}

/// Score one skill. `keywords` must come from [`extract_keywords`] on the
/// task description.
pub fn score_skill(skill: &Skill, task: &Task, keywords: &[String]) -> (f64, String) {
    let desc = skill.description.to_lowercase();
    let mut score = 0.0;
    let mut reasons: Vec<&str> = Vec::new();

    if !keywords.is_empty() {
        let found = keywords.iter().filter(|k| desc.contains(k.as_str())).count();
        let ratio = found as f64 / keywords.len() as f64;
        score += ratio * KEYWORD_WEIGHT;
        if ratio > KEYWORD_REASON_THRESHOLD {
            reasons.push("keyword match");
        }
    }

    let task_type = task.task_type.trim().to_lowercase();
    if !task_type.is_empty() {
        if desc.contains(&task_type) {
            score += TASK_TYPE_WEIGHT;
            reasons.push("task type match");
        } else if synonyms(&task_type).iter().any(|s| desc.contains(s)) {
            score += TASK_TYPE_SYNONYM_WEIGHT;
            reasons.push("task type synonym match");
        }
    }

    let repo_type = task.repo_type.trim().to_lowercase();
    if !repo_type.is_empty() && desc.contains(&repo_type) {
        score += REPO_TYPE_WEIGHT;
        reasons.push("repo type match");
    }

    let tag_hit = task
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .any(|t| !t.is_empty() && desc.contains(&t));
    if tag_hit {
        score += TAG_WEIGHT;
        reasons.push("tag match");
    }

    if score <= 0.0 {
        return (0.0, String::new());
    }
    (score.min(1.0), reasons.join(", "))
}

// ── Keywords ────────────────────────────────────────────────

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "is", "are", "was", "were", "this", "that", "these", "those",
    "to", "of", "in", "for", "on", "with", "by", "at", "from", "it", "its", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could", "should", "can", "may",
    "might", "must", "about", "into", "through", "during", "before", "after", "above", "below",
    "between", "under", "again", "further", "then", "once", "here", "there", "when", "where",
    "why", "how", "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor",
    "not", "only", "own", "same", "so", "than", "too", "very", "just", "now", "also", "get", "use",
    "using", "used", "make", "made", "see", "seen", "come", "came", "know", "knew", "take", "took",
    "think", "thought", "say", "said", "go", "went", "help", "helps", "helped", "show", "shows",
    "showed", "he", "him", "his", "she", "her", "hers", "they", "them", "their", "theirs", "we",
    "us", "our", "ours", "you", "your", "yours", "i", "me", "my", "mine",
];

fn is_separator(c: char) -> bool {
    c.is_whitespace() || ",.!?;:()[]{}\"'`/\\|&*+=<>@#$%^".contains(c)
}

/// Lower-cased, de-duplicated content words of at least three bytes, in
/// order of first appearance.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut seen = HashSet::new();
    lower
        .split(is_separator)
        .filter(|w| w.len() >= MIN_KEYWORD_LEN && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(*w))
        .map(str::to_owned)
        .collect()
}

/// Curated synonyms for well-known task types.
pub fn synonyms(task_type: &str) -> &'static [&'static str] {
    match task_type {
        "overview" => &["introduction", "summary", "getting started", "quick start"],
        "architecture" => &["structure", "design", "pattern", "organization", "layout"],
        "api" => &["interface", "endpoint", "method", "function", "rpc", "rest", "grpc"],
        "business-flow" => &["workflow", "process", "logic", "flow", "business logic"],
        "deployment" => &["deploy", "install", "setup", "configure", "config", "production"],
        "database" => &["db", "sql", "schema", "model", "entity", "storage", "data"],
        "frontend" => &["ui", "client", "web", "react", "vue", "angular"],
        "backend" => &["server", "api", "service", "handler"],
        _ => &[],
    }
}
