//! Caption normalization and content keys
//!
//! Two captions that differ only in accents, letter case or whitespace share a
//! cache entry. The same function runs on read and on write.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Normalize caption text for cache addressing
///
/// Lower-cases, decomposes (NFD) and drops Latin combining accents, so
/// precomposed and decomposed spellings agree. Then collapses runs of
/// whitespace to one space and trims.
///
/// # Examples
///
/// ```
/// use ricettario_store::normalize_caption;
///
/// assert_eq!(normalize_caption("  Caffè   LATTE\n"), "caffe latte");
/// ```
pub fn normalize_caption(text: &str) -> String {
    let lowered: String = text.chars().flat_map(char::to_lowercase).collect();
    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.nfd().filter(|c| !is_latin_diacritic(*c)) {
        match fold_latin(c) {
            Some(s) => folded.push_str(s),
            None => folded.push(c),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of an already normalized caption
pub fn cache_key(normalized: &str) -> String {
    format!("{:x}", Sha256::digest(normalized.as_bytes()))
}

/// Combining Diacritical Marks block, the accents Latin letters decompose into
fn is_latin_diacritic(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Latin letters with no canonical decomposition
fn fold_latin(c: char) -> Option<&'static str> {
    let base = match c {
        'đ' => "d",
        'ħ' => "h",
        'ı' => "i",
        'ŀ' | 'ł' => "l",
        'ø' => "o",
        'ŧ' => "t",
        'ß' => "ss",
        'æ' => "ae",
        'œ' => "oe",
        _ => return None,
    };
    Some(base)
}
