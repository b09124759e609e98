use crate::config::EntityConfig;
use crate::models::Entity;
use regex::Regex;
use tracing::warn;

use super::EntityExtractor;

/// Regex-driven entity labelling. Patterns are tried in configuration order
/// and a span claimed by an earlier pattern is never relabelled.
pub struct PatternEntityExtractor {
    patterns: Vec<(String, Regex)>,
}

impl PatternEntityExtractor {
    pub fn from_config(config: &EntityConfig) -> Self {
        let mut patterns = Vec::with_capacity(config.patterns.len());
        for entry in &config.patterns {
            match Regex::new(&entry.pattern) {
                Ok(regex) => patterns.push((entry.label.clone(), regex)),
                Err(e) => warn!("Skipping entity pattern {}: {}", entry.label, e),
            }
        }
        Self { patterns }
    }
}

impl Default for PatternEntityExtractor {
    fn default() -> Self {
        Self::from_config(&EntityConfig::default())
    }
}

impl EntityExtractor for PatternEntityExtractor {
    fn entities(&self, text: &str) -> Vec<Entity> {
        let mut claimed: Vec<(usize, usize, &str)> = Vec::new();

        for (label, regex) in &self.patterns {
            for m in regex.find_iter(text) {
                let overlaps = claimed
                    .iter()
                    .any(|(start, end, _)| m.start() < *end && *start < m.end());
                if !overlaps {
                    claimed.push((m.start(), m.end(), label.as_str()));
                }
            }
        }

        claimed.sort_by_key(|(start, _, _)| *start);
        claimed
            .into_iter()
            .map(|(start, end, label)| Entity {
                label: label.to_string(),
                text: text[start..end].trim().to_string(),
            })
            .collect()
    }
}
