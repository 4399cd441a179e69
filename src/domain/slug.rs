//! Slug derivation for resource rows.
//!
//! A slug is derived from a designated source field ("Kabar Sekolah" becomes
//! `kabar-sekolah`, "基础教程" becomes `ji-chu-jiao-cheng`). When the base
//! slug is already taken by another row of the same resource type a numeric
//! suffix is appended (`-2`, `-3`, ...). Derivation is pure: the same source
//! and the same set of taken slugs always give the same answer.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive the base slug for `input`: transliterated, lowercase, hyphenated ASCII.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(transliterate_to_ascii(input));
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// First of `base`, `base-2`, `base-3`, ... for which `is_taken` answers `false`.
pub fn next_free_slug<F>(base: &str, mut is_taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !is_taken(base) {
        return base.to_string();
    }
    let mut n: u64 = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Derive the slug for `input` and pick the first candidate not in `taken`.
pub fn first_free_slug<F>(input: &str, is_taken: F) -> Result<String, SlugError>
where
    F: FnMut(&str) -> bool,
{
    let base = derive_slug(input)?;
    Ok(next_free_slug(&base, is_taken))
}

/// Whether `slug` is `base` itself or `base-<n>`.
pub fn in_family(base: &str, slug: &str) -> bool {
    match slug.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            // slugify transliterates accented latin and drops what it cannot map
            None => output.push(ch),
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_lowercases_and_hyphenates() {
        assert_eq!(derive_slug("Sports").unwrap(), "sports");
        assert_eq!(derive_slug("  Hari Guru Nasional! ").unwrap(), "hari-guru-nasional");
        assert_eq!(derive_slug("Café Olé").unwrap(), "cafe-ole");
    }

    #[test]
    fn derive_slug_transliterates_chinese() {
        assert_eq!(derive_slug("基础教程 2024").unwrap(), "ji-chu-jiao-cheng-2024");
    }

    #[test]
    fn derive_slug_rejects_blank_and_symbol_only_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
        assert!(matches!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn derivation_is_idempotent_for_unchanged_source() {
        let taken = ["sports".to_string()];
        let first = first_free_slug("Sports Day", |s| taken.iter().any(|t| t == s)).unwrap();
        let second = first_free_slug("Sports Day", |s| taken.iter().any(|t| t == s)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let taken = ["sports".to_string(), "sports-2".to_string()];
        let slug = first_free_slug("Sports", |s| taken.iter().any(|t| t == s)).unwrap();
        assert_eq!(slug, "sports-3");
    }

    #[test]
    fn suffix_search_has_no_upper_bound() {
        let taken: Vec<String> = std::iter::once("upacara-bendera".to_string())
            .chain((2..=40).map(|n| format!("upacara-bendera-{n}")))
            .collect();
        let slug = first_free_slug("Upacara Bendera", |s| taken.iter().any(|t| t == s)).unwrap();
        assert_eq!(slug, "upacara-bendera-41");
    }

    #[test]
    fn gaps_in_the_family_are_reused() {
        let taken = ["rapat".to_string(), "rapat-3".to_string()];
        assert_eq!(next_free_slug("rapat", |s| taken.iter().any(|t| t == s)), "rapat-2");
    }

    #[test]
    fn family_membership_requires_a_numeric_suffix() {
        assert!(in_family("rapat", "rapat"));
        assert!(in_family("rapat", "rapat-12"));
        assert!(!in_family("rapat", "rapat-guru"));
        assert!(!in_family("rapat", "rapat-"));
        assert!(!in_family("rapat", "rapatan"));
    }
}
