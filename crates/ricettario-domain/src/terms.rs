//! Ingredient vocabulary normalization
//!
//! Captions mix Italian and English freely. The vocabulary lists of an
//! [`ExtractionRecord`] are mapped onto a single English vocabulary so the
//! browser can filter on them.

use crate::ExtractionRecord;

/// Italian term and its English equivalent
const ITALIAN_TERMS: &[(&str, &str)] = &[
    ("pomodoro", "tomato"),
    ("pomodori", "tomato"),
    ("pomodorini", "cherry tomato"),
    ("zucchine", "zucchini"),
    ("zucchina", "zucchini"),
    ("aglio", "garlic"),
    ("cipolla", "onion"),
    ("cipolle", "onion"),
    ("basilico", "basil"),
    ("prezzemolo", "parsley"),
    ("parmigiano", "parmesan"),
    ("parmigiano reggiano", "parmesan"),
    ("olio d'oliva", "olive oil"),
    ("olio di oliva", "olive oil"),
    ("olio evo", "olive oil"),
    ("sale", "salt"),
    ("pepe", "pepper"),
    ("peperoncino", "chili"),
    ("melanzane", "eggplant"),
    ("melanzana", "eggplant"),
    ("peperoni", "bell pepper"),
    ("funghi", "mushroom"),
    ("patate", "potato"),
    ("carote", "carrot"),
    ("spinaci", "spinach"),
    ("pollo", "chicken"),
    ("manzo", "beef"),
    ("maiale", "pork"),
    ("guanciale", "guanciale"),
    ("pancetta", "pancetta"),
    ("salmone", "salmon"),
    ("tonno", "tuna"),
    ("gamberi", "shrimp"),
    ("uova", "egg"),
    ("uovo", "egg"),
    ("burro", "butter"),
    ("farina", "flour"),
    ("zucchero", "sugar"),
    ("latte", "milk"),
    ("limone", "lemon"),
];

/// Map one term onto the English vocabulary
///
/// Lower-cases and trims; terms without a known translation pass through.
pub fn normalize_term(term: &str) -> String {
    let cleaned = term.trim().to_lowercase();
    ITALIAN_TERMS
        .iter()
        .find(|(it, _)| *it == cleaned)
        .map(|(_, en)| (*en).to_string())
        .unwrap_or(cleaned)
}

/// Normalize a list of terms, dropping blanks and duplicates
///
/// The first occurrence of each normalized term keeps its position.
pub fn normalize_terms(terms: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(terms.len());
    for term in terms {
        let normalized = normalize_term(term);
        if !normalized.is_empty() && !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// Normalize the vocabulary lists of a record
///
/// Only `proteins`, `vegetables` and `key_ingredients` are touched. The free
/// text ingredient lines keep their original wording.
pub fn normalize_record(mut record: ExtractionRecord) -> ExtractionRecord {
    record.proteins = normalize_terms(&record.proteins);
    record.vegetables = normalize_terms(&record.vegetables);
    record.key_ingredients = normalize_terms(&record.key_ingredients);
    record
}
