//! Address text normalization and cache-key derivation.
//!
//! The cache is content-addressed: two inputs that normalize to the same
//! string (and carry the same country) share one cache entry. Everything in
//! here must therefore be deterministic across processes and platforms.

use deunicode::deunicode;
use sha2::{Digest, Sha256};

use crate::country::country_code;

/// Number of hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 40;

/// Collapse whitespace (including line breaks) and drop control and
/// zero-width characters. Case and punctuation are preserved.
pub fn clean(value: &str) -> String {
    let filtered: String = value
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !matches!(c, '\u{200b}'..='\u{200d}' | '\u{feff}'))
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fold to a lowercase ASCII form with punctuation runs replaced by a single
/// space.
pub fn normalize(value: &str) -> String {
    let ascii = deunicode(value);
    let mut out = String::with_capacity(ascii.len());
    let mut pending_space = false;
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Stable content hash of an already normalized string.
pub fn fingerprint(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..FINGERPRINT_LEN].to_string()
}

/// Fingerprint of raw address text, or `None` when nothing is left after
/// cleaning.
pub fn text_fingerprint(value: &str) -> Option<String> {
    let normalized = normalize(&clean(value));
    if normalized.is_empty() {
        return None;
    }
    Some(fingerprint(&normalized))
}

/// `{cc}-{fingerprint}` when the country hint is a known country, else the
/// bare fingerprint.
pub fn namespaced_fingerprint(value: &str, country: Option<&str>) -> Option<String> {
    let fp = text_fingerprint(value)?;
    match country.and_then(country_code) {
        Some(cc) => Some(format!("{}-{}", cc, fp)),
        None => Some(fp),
    }
}

/// Derive the cache key for an address.
///
/// Returns `None` when caching is disabled for this call or the input is
/// empty after cleaning; callers treat that as "do not cache", not failure.
pub fn derive_key(
    raw_text: &str,
    country: Option<&str>,
    use_cache: bool,
    prefix: &str,
) -> Option<String> {
    if !use_cache {
        return None;
    }
    let key = namespaced_fingerprint(raw_text, country)?;
    Some(format!("{}/{}", prefix, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "Cowley Road, Cambridge, CB4 0WS, United Kingdom";

    #[test]
    fn test_clean() {
        assert_eq!(
            clean("  Cowley Road\n   Cambridge\t CB4 0WS "),
            "Cowley Road Cambridge CB4 0WS"
        );
        assert_eq!(clean("a\u{200b}b"), "ab");
        assert_eq!(clean(" \n\t "), "");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("St John’s Innovation Centre"), "st john s innovation centre");
        assert_eq!(normalize("Straße 12, München"), "strasse 12 munchen");
        assert_eq!(normalize("--DUDA-EPURENI--"), "duda epureni");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = derive_key(ADDR, Some("gb"), true, "addrgeo");
        let b = derive_key(ADDR, Some("gb"), true, "addrgeo");
        assert!(a.is_some());
        assert_eq!(a, b);
        // sha256("abc"), truncated
        assert_eq!(fingerprint("abc"), "ba7816bf8f01cfea414140de5dae2223b00361a3");
    }

    #[test]
    fn test_key_ignores_formatting_noise() {
        let a = derive_key(ADDR, Some("gb"), true, "p");
        let b = derive_key(
            "cowley road\n cambridge  cb4 0ws\nunited kingdom",
            Some("GB"),
            true,
            "p",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_country_namespace() {
        let key = derive_key(ADDR, Some("United Kingdom"), true, "addrgeo").unwrap();
        assert!(key.starts_with("addrgeo/gb-"));
        assert_eq!(key.len(), "addrgeo/gb-".len() + FINGERPRINT_LEN);

        let bare = derive_key(ADDR, Some("Atlantis"), true, "addrgeo").unwrap();
        assert!(!bare.contains('-'));
        assert_eq!(bare, derive_key(ADDR, None, true, "addrgeo").unwrap());
        assert_ne!(key, bare);
    }

    #[test]
    fn test_key_none() {
        assert_eq!(derive_key(ADDR, None, false, "addrgeo"), None);
        assert_eq!(derive_key("", None, true, "addrgeo"), None);
        assert_eq!(derive_key("   \n\t", Some("gb"), true, "addrgeo"), None);
        assert_eq!(derive_key(",;.", Some("gb"), true, "addrgeo"), None);
    }
}
