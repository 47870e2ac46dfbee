//! Unit normalization and amount parsing for ingredient validation.
//!
//! The base mapping covers the Russian culinary units the source site uses.
//! Corrections accumulated in the patch store are overlaid on top of it at
//! validation time; overlay entries win over base entries for the same key.

use std::collections::BTreeMap;

/// Canonical unit tokens a parsed ingredient may carry without a mapping.
pub const ALLOWED_UNITS: &[&str] = &["г", "мл", "шт", "ст.л", "ч.л", "чашка", "л", "кг"];

/// Base surface-token -> canonical-unit mapping.
const BASE_UNIT_MAPPING: &[(&str, &str)] = &[
    // Grams
    ("г", "г"),
    ("грамм", "г"),
    ("грамма", "г"),
    ("граммов", "г"),
    ("гр", "г"),
    // Milliliters
    ("мл", "мл"),
    ("миллилитр", "мл"),
    ("миллилитра", "мл"),
    ("миллилитров", "мл"),
    // Pieces
    ("шт", "шт"),
    ("штук", "шт"),
    ("штука", "шт"),
    ("штуки", "шт"),
    // Tablespoons
    ("ст.л", "ст.л"),
    ("ст. ложка", "ст.л"),
    ("ст. ложки", "ст.л"),
    ("ст ложка", "ст.л"),
    ("ст ложки", "ст.л"),
    ("столовых ложек", "ст.л"),
    ("столовые ложки", "ст.л"),
    ("столовая ложка", "ст.л"),
    ("ст. ложек", "ст.л"),
    ("ст. лож.", "ст.л"),
    ("ст лож.", "ст.л"),
    // Teaspoons
    ("ч.л", "ч.л"),
    ("ч. ложка", "ч.л"),
    ("ч. ложки", "ч.л"),
    ("ч ложка", "ч.л"),
    ("ч ложки", "ч.л"),
    ("чайных ложек", "ч.л"),
    ("чайные ложки", "ч.л"),
    ("чайная ложка", "ч.л"),
    ("ч. ложек", "ч.л"),
    ("ч. лож.", "ч.л"),
    ("ч лож.", "ч.л"),
    // Cups
    ("чашка", "чашка"),
    ("чашки", "чашка"),
    ("чашек", "чашка"),
    ("стакан", "чашка"),
    ("стакана", "чашка"),
    ("стаканов", "чашка"),
    ("ст", "чашка"),
    // Liters
    ("л", "л"),
    ("литр", "л"),
    ("литра", "л"),
    ("литров", "л"),
    // Kilograms
    ("кг", "кг"),
    ("килограмм", "кг"),
    ("килограмма", "кг"),
    ("килограммов", "кг"),
];

/// Map a raw unit token to its canonical form, overlay entries first.
///
/// Lookup order: exact match in the overlay, exact match in the base table,
/// then a substring pass (overlay before base) for keys longer than two
/// characters to catch inflected forms like "ст. ложками". Returns `None`
/// when no mapping applies.
pub fn map_unit(raw: &str, overlay: &BTreeMap<String, String>) -> Option<String> {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }

    if let Some(canonical) = overlay.get(&lower) {
        return Some(canonical.clone());
    }
    if let Some((_, canonical)) = BASE_UNIT_MAPPING.iter().find(|(k, _)| *k == lower) {
        return Some((*canonical).to_string());
    }

    for (key, canonical) in overlay {
        if key.chars().count() > 2 && lower.contains(key.as_str()) {
            return Some(canonical.clone());
        }
    }
    for (key, canonical) in BASE_UNIT_MAPPING {
        if key.chars().count() > 2 && lower.contains(key) {
            return Some((*canonical).to_string());
        }
    }

    None
}

/// Whether a unit token is acceptable without mapping: one of the canonical
/// units, or a canonical form some overlay entry maps to (operator-chosen
/// targets like "pinch" count once the mapping exists).
pub fn is_canonical(unit: &str, overlay: &BTreeMap<String, String>) -> bool {
    let trimmed = unit.trim();
    ALLOWED_UNITS.contains(&trimmed) || overlay.values().any(|v| v == trimmed)
}

/// Parse an amount string into a number.
///
/// Accepts plain numbers, comma decimals ("0,5"), and ranges ("2-3", which
/// average). Empty amounts and "по вкусу" read as zero. Negative amounts are
/// rejected.
pub fn parse_amount(raw: &str) -> Result<f64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.to_lowercase() == "по вкусу" {
        return Ok(0.0);
    }

    let normalized = trimmed.replace(',', ".");

    if let Some((first, second)) = normalized.split_once('-') {
        let first_value = first.trim().parse::<f64>();
        let second_value = second.trim().parse::<f64>();
        let value = match (first_value, second_value) {
            (Ok(a), Ok(b)) => (a + b) / 2.0,
            (Ok(a), Err(_)) => a,
            _ => return Err(format!("could not parse amount: {}", raw)),
        };
        return non_negative(value, raw);
    }

    match normalized.parse::<f64>() {
        Ok(value) => non_negative(value, raw),
        Err(_) => Err(format!("could not parse amount: {}", raw)),
    }
}

fn non_negative(value: f64, raw: &str) -> Result<f64, String> {
    if value < 0.0 {
        Err(format!("amount cannot be negative: {}", raw))
    } else {
        Ok(value)
    }
}
