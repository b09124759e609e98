//! Context-aware rewriting of follow-up utterances.
//!
//! A neural coreference model gets the first try when one is configured. The
//! keyword rule table from the configuration covers everything else, and the
//! resolver never fails: the worst outcome is the user's own text.

use crate::config::{CorefConfig, CorefRule};
use crate::nlp::CoreferenceModel;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CoreferenceResolver {
    model: Option<Arc<dyn CoreferenceModel>>,
    config: CorefConfig,
    markers: Option<Regex>,
    pronouns: Option<Regex>,
}

impl CoreferenceResolver {
    pub fn new(config: CorefConfig, model: Option<Arc<dyn CoreferenceModel>>) -> Self {
        let markers = word_alternation(&config.markers);
        let pronouns = word_alternation(&config.pronouns);
        Self {
            model,
            config,
            markers,
            pronouns,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Rewrites `user_text` using the previous bot turn. The context window
    /// carries only the bot turn; the previous user turn is accepted for
    /// callers that track it.
    pub fn resolve(&self, user_text: &str, last_bot: Option<&str>, _last_user: Option<&str>) -> String {
        let last_bot = last_bot.map(str::trim).filter(|s| !s.is_empty());

        if let Some(model) = &self.model {
            let context = match last_bot {
                Some(bot) => format!("Bot: {}\nUser: {}", bot, user_text),
                None => user_text.to_string(),
            };
            match model.resolve(&context) {
                Ok(resolved) => {
                    let resolved = user_turn(&resolved);
                    if !resolved.is_empty() {
                        return resolved;
                    }
                }
                Err(e) => warn!("Coreference model failed, using keyword rules: {}", e),
            }
        }

        self.rewrite_with_rules(user_text, last_bot)
    }

    fn rewrite_with_rules(&self, user_text: &str, last_bot: Option<&str>) -> String {
        let Some(bot) = last_bot else {
            return user_text.to_string();
        };
        let has_marker = self
            .markers
            .as_ref()
            .map(|re| re.is_match(user_text))
            .unwrap_or(false);
        if !has_marker {
            return user_text.to_string();
        }

        let bot_lower = bot.to_lowercase();
        let Some(rule) = self.config.rules.iter().find(|rule| {
            rule.topic_keywords
                .iter()
                .any(|k| bot_lower.contains(&k.to_lowercase()))
        }) else {
            debug!("No coreference rule matches the previous bot turn");
            return user_text.to_string();
        };

        if let Some(rewritten) = self.replace_follow_up(user_text, rule) {
            return rewritten;
        }

        match (&rule.subject, &self.pronouns) {
            (Some(subject), Some(pronouns)) if pronouns.is_match(user_text) => {
                pronouns.replacen(user_text, 1, subject.as_str()).into_owned()
            }
            _ => user_text.to_string(),
        }
    }

    /// Swaps a follow-up phrase ("what about ...") for the rule's restatement.
    /// When the word right after the phrase is a role keyword, the phrase and
    /// that word are replaced together by the role-specific restatement.
    /// Everything else the user wrote is kept.
    fn replace_follow_up(&self, user_text: &str, rule: &CorefRule) -> Option<String> {
        // ASCII lowercasing keeps byte offsets aligned with `user_text`.
        let lowered = user_text.to_ascii_lowercase();

        for phrase in &self.config.follow_up_phrases {
            let phrase = phrase.to_ascii_lowercase();
            let Some(start) = lowered.find(&phrase) else {
                continue;
            };
            let end = start + phrase.len();

            let word_start = lowered[end..]
                .find(|c: char| !c.is_whitespace())
                .map(|i| end + i)
                .unwrap_or(lowered.len());
            let word_end = lowered[word_start..]
                .find(|c: char| !c.is_alphanumeric())
                .map(|i| word_start + i)
                .unwrap_or(lowered.len());
            let next_word = &lowered[word_start..word_end];

            let role = rule
                .roles
                .iter()
                .find(|role| !next_word.is_empty() && next_word.starts_with(&role.keyword.to_ascii_lowercase()));
            return Some(match role {
                Some(role) => format!("{}{}{}", &user_text[..start], role.restatement, &user_text[word_end..]),
                None => format!("{}{}{}", &user_text[..start], rule.restatement, &user_text[end..]),
            });
        }
        None
    }
}

/// Keeps only the rewritten user turn of a speaker-tagged window.
fn user_turn(resolved: &str) -> String {
    match resolved.rfind("User:") {
        Some(idx) => resolved[idx + "User:".len()..].trim().to_string(),
        None => resolved.trim().to_string(),
    }
}

fn word_alternation(words: &[String]) -> Option<Regex> {
    if words.is_empty() {
        return None;
    }
    let alternation = words
        .iter()
        .map(|w| regex::escape(w.trim()))
        .collect::<Vec<_>>()
        .join("|");
    match Regex::new(&format!(r"(?i)\b(?:{})\b", alternation)) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Invalid coreference keyword list: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};

    fn resolver() -> CoreferenceResolver {
        CoreferenceResolver::new(CorefConfig::default(), None)
    }

    struct EchoModel(String);

    impl CoreferenceModel for EchoModel {
        fn resolve(&self, _context: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    struct BrokenModel;

    impl CoreferenceModel for BrokenModel {
        fn resolve(&self, _context: &str) -> Result<String> {
            Err(anyhow!("model offline"))
        }
    }

    #[test]
    fn follow_up_about_managers_restates_leave_policy() {
        let resolved = resolver().resolve(
            "What about managers?",
            Some("Employees get 20 days under the annual leave policy."),
            None,
        );
        assert!(resolved.contains("leave policy"), "{}", resolved);
        assert!(resolved.contains("managers"), "{}", resolved);
        assert_eq!(resolved, "what is the leave policy for managers?");
    }

    #[test]
    fn words_between_phrase_and_role_are_kept() {
        let r = resolver();
        let bot = Some("Employees get 20 days under the annual leave policy.");

        let resolved = r.resolve("What about part-time employees?", bot, None);
        assert_eq!(resolved, "what is the leave policy for part-time employees?");

        let resolved = r.resolve("what about the expense form my manager signed?", bot, None);
        assert_eq!(resolved, "what is the leave policy for the expense form my manager signed?");
    }

    #[test]
    fn follow_up_without_role_uses_topic_restatement() {
        let resolved = resolver().resolve(
            "what about contractors",
            Some("Technical support is available 24/7."),
            None,
        );
        assert_eq!(resolved, "what is the technical support for contractors");
    }

    #[test]
    fn pronoun_is_replaced_by_rule_subject() {
        let resolved = resolver().resolve(
            "How do I apply for it?",
            Some("Our leave policy grants 20 days a year."),
            None,
        );
        assert_eq!(resolved, "How do I apply for the leave policy?");
    }

    #[test]
    fn markers_match_whole_words_only() {
        // "submit" contains "it" but is not an anaphor.
        let text = "How do I submit expenses?";
        assert_eq!(resolver().resolve(text, Some("Our leave policy is generous."), None), text);
    }

    #[test]
    fn unchanged_without_bot_turn_or_matching_rule() {
        let r = resolver();
        assert_eq!(r.resolve("What about managers?", None, None), "What about managers?");
        assert_eq!(
            r.resolve("What about managers?", Some("Invoices are due monthly."), None),
            "What about managers?"
        );
    }

    #[test]
    fn model_output_keeps_only_user_turn() {
        let r = CoreferenceResolver::new(
            CorefConfig::default(),
            Some(Arc::new(EchoModel(
                "Bot: The leave policy is strict.\nUser: Does the leave policy apply to interns?".into(),
            ))),
        );
        assert_eq!(
            r.resolve("Does it apply to interns?", Some("The leave policy is strict."), None),
            "Does the leave policy apply to interns?"
        );
    }

    #[test]
    fn model_failure_falls_back_to_rules() {
        let r = CoreferenceResolver::new(CorefConfig::default(), Some(Arc::new(BrokenModel)));
        assert_eq!(
            r.resolve("what about employees?", Some("The leave policy changed."), None),
            "what is the leave policy for employees?"
        );
    }
}
