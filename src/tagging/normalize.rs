use regex::Regex;

/// Unicode superscript and small-cap letters that show up in provider
/// quality markers, mapped to their ASCII equivalents.
const SUPERSCRIPT_MAP: &[(char, char)] = &[
    ('ᴿ', 'R'),
    ('ᴬ', 'A'),
    ('ᵂ', 'W'),
    ('ᴹ', 'M'),
    ('ᴰ', 'D'),
    ('⁶', '6'),
    ('⁰', '0'),
    ('ᶠ', 'F'),
    ('ᵖ', 'P'),
    ('ˢ', 'S'),
];

/// Normalize a tag name for storage: uppercase, fold known formatting
/// characters to ASCII, keep word characters/spaces/hyphens, collapse
/// whitespace to underscores. Idempotent.
pub fn normalize_tag_name(tag_name: &str) -> String {
    let mut normalized: String = tag_name
        .to_uppercase()
        .chars()
        .map(|c| {
            SUPERSCRIPT_MAP
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect();

    let strip = Regex::new(r"[^\w\s-]").unwrap();
    normalized = strip.replace_all(&normalized, "").into_owned();

    let spaces = Regex::new(r"\s+").unwrap();
    normalized = spaces.replace_all(&normalized, "_").into_owned();

    let underscores = Regex::new(r"_+").unwrap();
    normalized = underscores.replace_all(&normalized, "_").into_owned();

    normalized.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_and_folds_superscripts() {
        assert_eq!(normalize_tag_name("ᴿᴬᵂ"), "RAW");
        assert_eq!(normalize_tag_name("⁶⁰ᶠᵖˢ"), "60FPS");
        assert_eq!(normalize_tag_name("hd"), "HD");
    }

    #[test]
    fn collapses_whitespace_and_strips_punctuation() {
        assert_eq!(normalize_tag_name("New  York"), "NEW_YORK");
        assert_eq!(normalize_tag_name("  24/7  "), "247");
        assert_eq!(normalize_tag_name("_US_"), "US");
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in ["ᴿᴬᵂ", "New  York", "  24/7  ", "WSCV", "CHICO-READING"] {
            let once = normalize_tag_name(input);
            assert_eq!(normalize_tag_name(&once), once);
        }
    }
}
