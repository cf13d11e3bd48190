use crate::models::{PatternKind, RuleSource, TagRule};
use crate::tagging::normalize::normalize_tag_name;
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Sentinel tag names with special handling.
const TAG_LOCATION: &str = "__LOCATION__";
const TAG_CALLSIGN: &str = "__CALLSIGN__";
const TAG_CLEANUP: &str = "__CLEANUP__";

/// Result of running a rule pipeline over one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub tags: BTreeSet<String>,
    pub cleaned_name: String,
}

/// Evaluates tag-extraction rule pipelines. Compiled regexes are cached
/// across channels within one sync run.
pub struct TagEngine {
    regex_cache: HashMap<String, Option<Regex>>,
}

impl Default for TagEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TagEngine {
    pub fn new() -> Self {
        Self {
            regex_cache: HashMap::new(),
        }
    }

    /// Apply `rules` in ascending priority to `(channel_name, category_name)`.
    /// Matching always runs against the original inputs; removals apply to
    /// the evolving cleaned name.
    pub fn extract(
        &mut self,
        channel_name: &str,
        category_name: &str,
        rules: &[TagRule],
    ) -> Extraction {
        let mut tags = BTreeSet::new();
        let mut cleaned = channel_name.to_string();

        let mut sorted: Vec<&TagRule> = rules.iter().filter(|r| r.enabled).collect();
        sorted.sort_by_key(|r| r.priority);

        for rule in sorted {
            let search_texts: Vec<(&str, bool)> = match rule.source {
                RuleSource::ChannelName => vec![(channel_name, true)],
                RuleSource::CategoryName => vec![(category_name, false)],
                RuleSource::Both => vec![(channel_name, true), (category_name, false)],
            };

            for (text, can_remove) in &search_texts {
                let Some(matched) = self.match_pattern(text, &rule.pattern, rule.pattern_kind)
                else {
                    continue;
                };

                match rule.tag_name.as_str() {
                    TAG_LOCATION => {
                        if let Some(inner) = capture_delimited(&matched, '[', ']') {
                            tags.insert(normalize_tag_name(&inner));
                            cleaned = cleaned.replace(&matched, &inner);
                        }
                    }
                    TAG_CALLSIGN => {
                        if let Some(inner) = capture_delimited(&matched, '(', ')') {
                            tags.insert(normalize_tag_name(&inner));
                            cleaned = cleaned.replace(&matched, &inner);
                        }
                    }
                    TAG_CLEANUP => {
                        if rule.remove_from_name && *can_remove {
                            cleaned = remove_ci(&cleaned, &matched, rule.replacement.as_deref());
                        }
                    }
                    tag_name => {
                        tags.insert(normalize_tag_name(tag_name));
                        if rule.remove_from_name && *can_remove {
                            cleaned = remove_ci(&cleaned, &matched, rule.replacement.as_deref());
                        }
                    }
                }

                // First matching input wins for this rule
                break;
            }
        }

        Extraction {
            tags,
            cleaned_name: cleanup_name(&cleaned),
        }
    }

    /// Return the matched substring of `text`, or None.
    fn match_pattern(&mut self, text: &str, pattern: &str, kind: PatternKind) -> Option<String> {
        if text.is_empty() || pattern.is_empty() {
            return None;
        }

        match kind {
            PatternKind::Prefix => prefix_match_ci(text, pattern),
            PatternKind::Suffix => suffix_match_ci(text, pattern),
            PatternKind::Contains => {
                find_ci(text, pattern).map(|(start, end)| text[start..end].to_string())
            }
            PatternKind::Regex => {
                let regex = self
                    .regex_cache
                    .entry(pattern.to_string())
                    .or_insert_with(|| {
                        match RegexBuilder::new(pattern).case_insensitive(true).build() {
                            Ok(regex) => Some(regex),
                            Err(e) => {
                                warn!("Invalid regex pattern '{}': {}", pattern, e);
                                None
                            }
                        }
                    });
                regex
                    .as_ref()
                    .and_then(|r| r.find(text))
                    .map(|m| m.as_str().to_string())
            }
        }
    }
}

/// Case-insensitive substring search; returns byte offsets into `text`.
fn find_ci(text: &str, pattern: &str) -> Option<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let needle: Vec<char> = pattern.chars().collect();
    if needle.is_empty() || needle.len() > chars.len() {
        return None;
    }

    for start in 0..=chars.len() - needle.len() {
        let matches = needle
            .iter()
            .enumerate()
            .all(|(j, pc)| chars[start + j].1.to_lowercase().eq(pc.to_lowercase()));
        if matches {
            let begin = chars[start].0;
            let end = chars
                .get(start + needle.len())
                .map(|(i, _)| *i)
                .unwrap_or(text.len());
            return Some((begin, end));
        }
    }
    None
}

fn prefix_match_ci(text: &str, pattern: &str) -> Option<String> {
    find_ci(text, pattern).filter(|(start, _)| *start == 0).map(|(_, end)| text[..end].to_string())
}

fn suffix_match_ci(text: &str, pattern: &str) -> Option<String> {
    find_ci(text, pattern)
        .filter(|(_, end)| *end == text.len())
        .map(|(start, _)| text[start..].to_string())
}

/// Extract the content between the first `open`..`close` pair.
fn capture_delimited(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let rest = &text[start + open.len_utf8()..];
    let end = rest.find(close)?;
    let inner = rest[..end].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

/// Remove the first case-insensitive occurrence of `to_remove`, or replace
/// it when the rule carries a replacement.
fn remove_ci(original: &str, to_remove: &str, replacement: Option<&str>) -> String {
    let Some((start, end)) = find_ci(original, to_remove) else {
        return original.to_string();
    };
    let mut result = String::with_capacity(original.len());
    result.push_str(&original[..start]);
    if let Some(replacement) = replacement {
        result.push_str(replacement);
    }
    result.push_str(&original[end..]);
    result
}

/// Post-process a cleaned name: strip leading/trailing separator runs,
/// collapse whitespace, drop empty bracket pairs, trim.
fn cleanup_name(name: &str) -> String {
    let mut name = name.trim().to_string();

    let leading = Regex::new(r"^[:\-|•]+\s*").unwrap();
    name = leading.replace(&name, "").into_owned();
    let trailing = Regex::new(r"\s*[:\-|•]+$").unwrap();
    name = trailing.replace(&name, "").into_owned();

    let spaces = Regex::new(r"\s+").unwrap();
    name = spaces.replace_all(&name, " ").into_owned();

    for empty in [r"\(\s*\)", r"\[\s*\]", r"\{\s*\}"] {
        let re = Regex::new(empty).unwrap();
        name = re.replace_all(&name, "").into_owned();
    }

    name.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn rule(
        pattern: &str,
        kind: PatternKind,
        tag_name: &str,
        source: RuleSource,
        remove: bool,
        priority: i32,
    ) -> TagRule {
        TagRule {
            id: Uuid::new_v4(),
            ruleset_id: Uuid::new_v4(),
            name: format!("{pattern} -> {tag_name}"),
            pattern: pattern.to_string(),
            pattern_kind: kind,
            tag_name: tag_name.to_string(),
            source,
            remove_from_name: remove,
            replacement: None,
            priority,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn default_rules() -> Vec<TagRule> {
        vec![
            rule("US|", PatternKind::Prefix, "US", RuleSource::Both, true, 10),
            rule(r"^US:\s*", PatternKind::Regex, "US", RuleSource::ChannelName, true, 10),
            rule("ᵁᴴᴰ", PatternKind::Contains, "UHD", RuleSource::Both, true, 17),
            rule("ᴴᴰ", PatternKind::Contains, "HD", RuleSource::Both, true, 18),
            rule("ᴿᴬᵂ", PatternKind::Contains, "RAW", RuleSource::Both, true, 20),
            rule("⁶⁰ᶠᵖˢ", PatternKind::Contains, "60FPS", RuleSource::Both, true, 20),
            rule(r"\b4K\b", PatternKind::Regex, "4K", RuleSource::Both, true, 20),
            rule(r"\b3840P?\b", PatternKind::Regex, "4K", RuleSource::Both, true, 20),
            rule(
                r"\(([^\)]+)\)",
                PatternKind::Regex,
                "__CALLSIGN__",
                RuleSource::ChannelName,
                true,
                86,
            ),
        ]
    }

    #[test]
    fn extracts_quality_tags_and_cleans_name() {
        let mut engine = TagEngine::new();
        let extraction = engine.extract(
            "US: FASHION ONE ᵁᴴᴰ 3840P",
            "US| ENTERTAINMENT ᴴᴰ/ᴿᴬᵂ ⁶⁰ᶠᵖˢ",
            &default_rules(),
        );

        for tag in ["US", "UHD", "4K", "HD", "RAW", "60FPS"] {
            assert!(extraction.tags.contains(tag), "missing tag {tag}: {:?}", extraction.tags);
        }
        assert_eq!(extraction.cleaned_name, "FASHION ONE");
    }

    #[test]
    fn extracts_callsign_from_parentheses() {
        let mut engine = TagEngine::new();
        let extraction = engine.extract(
            "US: TELEMUNDO 51 MIAMI (WSCV)",
            "US| ENTERTAINMENT ᴴᴰ/ᴿᴬᵂ ⁶⁰ᶠᵖˢ",
            &default_rules(),
        );

        for tag in ["US", "HD", "RAW", "60FPS", "WSCV"] {
            assert!(extraction.tags.contains(tag), "missing tag {tag}: {:?}", extraction.tags);
        }
        assert_eq!(extraction.cleaned_name, "TELEMUNDO 51 MIAMI WSCV");
    }

    #[test]
    fn location_brackets_become_tags() {
        let mut engine = TagEngine::new();
        let rules = vec![
            rule(r"^US:\s*", PatternKind::Regex, "US", RuleSource::ChannelName, true, 10),
            rule(
                r"\[([^\]]+)\]",
                PatternKind::Regex,
                "__LOCATION__",
                RuleSource::ChannelName,
                true,
                85,
            ),
        ];
        let extraction = engine.extract("US: NBC 13 HD [MONTANA]", "US| LOCALS", &rules);

        assert!(extraction.tags.contains("MONTANA"));
        assert_eq!(extraction.cleaned_name, "NBC 13 HD MONTANA");
    }

    #[test]
    fn invalid_regex_contributes_nothing() {
        let mut engine = TagEngine::new();
        let rules = vec![rule("[unclosed", PatternKind::Regex, "BAD", RuleSource::Both, true, 1)];
        let extraction = engine.extract("Some Channel", "Category", &rules);

        assert!(extraction.tags.is_empty());
        assert_eq!(extraction.cleaned_name, "Some Channel");
    }

    #[test]
    fn cleanup_rule_removes_without_tagging() {
        let mut engine = TagEngine::new();
        let rules = vec![rule(
            r"\s*\|\s*SLOW$",
            PatternKind::Regex,
            "__CLEANUP__",
            RuleSource::ChannelName,
            true,
            5,
        )];
        let extraction = engine.extract("ESPN | SLOW", "Sports", &rules);

        assert!(extraction.tags.is_empty());
        assert_eq!(extraction.cleaned_name, "ESPN");
    }

    #[test]
    fn extraction_is_deterministic() {
        let rules = default_rules();
        let mut first = TagEngine::new();
        let mut second = TagEngine::new();
        let name = "US: TELEMUNDO 51 MIAMI (WSCV)";
        let category = "US| ENTERTAINMENT ᴴᴰ/ᴿᴬᵂ ⁶⁰ᶠᵖˢ";

        assert_eq!(first.extract(name, category, &rules), second.extract(name, category, &rules));
    }

    #[test]
    fn tags_are_closed_under_normalization() {
        let mut engine = TagEngine::new();
        let extraction = engine.extract(
            "US: FASHION ONE ᵁᴴᴰ 3840P",
            "US| ENTERTAINMENT ᴴᴰ/ᴿᴬᵂ ⁶⁰ᶠᵖˢ",
            &default_rules(),
        );
        for tag in &extraction.tags {
            assert_eq!(&crate::tagging::normalize_tag_name(tag), tag);
        }
    }
}
