//! Channel-name mappings.
//!
//! Providers lag behind rebrands; playlists keep the old channel name while
//! EPG feeds move to the new one. An ordered mapping list rewrites names
//! before matching.

use crate::models::{EpgChannelNameMapping, NameMappingMatchType};
use regex::RegexBuilder;
use tracing::{debug, warn};

/// Apply the first matching mapping to `name`. Returns the (possibly
/// rewritten) name and the name of the applied mapping.
pub fn apply_name_mappings(
    name: &str,
    mappings: &[EpgChannelNameMapping],
) -> (String, Option<String>) {
    if name.is_empty() {
        return (name.to_string(), None);
    }

    for mapping in mappings {
        let old = &mapping.old_name;
        let new = &mapping.new_name;

        let transformed = match mapping.match_type {
            NameMappingMatchType::Exact => {
                let matched = if mapping.case_sensitive {
                    name == old
                } else {
                    name.eq_ignore_ascii_case(old)
                };
                matched.then(|| new.clone())
            }
            NameMappingMatchType::Contains => {
                let escaped = regex::escape(old);
                match RegexBuilder::new(&escaped)
                    .case_insensitive(!mapping.case_sensitive)
                    .build()
                {
                    Ok(re) if re.is_match(name) => Some(re.replace_all(name, new.as_str()).into_owned()),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Invalid name mapping '{}': {}", mapping.name, e);
                        None
                    }
                }
            }
            NameMappingMatchType::Prefix => {
                let matched = name.is_char_boundary(old.len())
                    && if mapping.case_sensitive {
                        name.starts_with(old.as_str())
                    } else {
                        name.len() >= old.len() && name[..old.len()].eq_ignore_ascii_case(old)
                    };
                matched.then(|| format!("{new}{}", &name[old.len()..]))
            }
            NameMappingMatchType::Suffix => {
                let matched = name.len() >= old.len()
                    && name.is_char_boundary(name.len() - old.len())
                    && if mapping.case_sensitive {
                        name.ends_with(old.as_str())
                    } else {
                        name[name.len() - old.len()..].eq_ignore_ascii_case(old)
                    };
                matched.then(|| format!("{}{new}", &name[..name.len() - old.len()]))
            }
            NameMappingMatchType::Regex => {
                match RegexBuilder::new(old)
                    .case_insensitive(!mapping.case_sensitive)
                    .build()
                {
                    Ok(re) if re.is_match(name) => Some(re.replace_all(name, new.as_str()).into_owned()),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Invalid regex in name mapping '{}': {}", mapping.name, e);
                        None
                    }
                }
            }
        };

        if let Some(transformed) = transformed {
            debug!(
                "Channel name mapping applied: '{}' -> '{}' (mapping: {})",
                name, transformed, mapping.name
            );
            return (transformed, Some(mapping.name.clone()));
        }
    }

    (name.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn mapping(old: &str, new: &str, match_type: NameMappingMatchType) -> EpgChannelNameMapping {
        EpgChannelNameMapping {
            id: Uuid::new_v4(),
            name: format!("{old} -> {new}"),
            old_name: old.to_string(),
            new_name: new.to_string(),
            match_type,
            case_sensitive: false,
            priority: 100,
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn exact_mapping_replaces_whole_name() {
        let mappings = vec![mapping("Paramount Network", "Paramount", NameMappingMatchType::Exact)];
        let (name, applied) = apply_name_mappings("paramount network", &mappings);
        assert_eq!(name, "Paramount");
        assert!(applied.is_some());
    }

    #[test]
    fn contains_mapping_rewrites_substring() {
        let mappings = vec![mapping("HDTV", "HD", NameMappingMatchType::Contains)];
        let (name, _) = apply_name_mappings("CNN HDTV East", &mappings);
        assert_eq!(name, "CNN HD East");
    }

    #[test]
    fn prefix_and_suffix_mappings_keep_the_rest() {
        let prefix = vec![mapping("UKTV ", "U&", NameMappingMatchType::Prefix)];
        assert_eq!(apply_name_mappings("UKTV Gold", &prefix).0, "U&Gold");

        let suffix = vec![mapping(" Channel", "", NameMappingMatchType::Suffix)];
        assert_eq!(apply_name_mappings("History Channel", &suffix).0, "History");
    }

    #[test]
    fn first_matching_mapping_wins() {
        let mappings = vec![
            mapping("Sky One", "Sky Showcase", NameMappingMatchType::Exact),
            mapping("Sky", "SKY", NameMappingMatchType::Contains),
        ];
        assert_eq!(apply_name_mappings("Sky One", &mappings).0, "Sky Showcase");
    }

    #[test]
    fn unmatched_name_is_untouched() {
        let mappings = vec![mapping("Sky One", "Sky Showcase", NameMappingMatchType::Exact)];
        let (name, applied) = apply_name_mappings("ESPN", &mappings);
        assert_eq!(name, "ESPN");
        assert!(applied.is_none());
    }
}
