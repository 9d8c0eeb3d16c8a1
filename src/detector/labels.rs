// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed label table for the acne lesion classes.

/// Class labels in model output order. Fixed at build time; never mutated.
pub const ACNE_CLASSES: [&str; 8] = [
    "Whiteheads",
    "Blackheads",
    "Papules",
    "Pustules",
    "Nodules",
    "Cysts",
    "Post-Inflammatory Hyperpigmentation",
    "Scarring",
];

/// Resolve a class id to its label.
///
/// Total over all of `i64`: ids outside the table resolve to a synthetic
/// `class_<id>` name instead of failing the request.
pub fn class_name(class_id: i64) -> String {
    usize::try_from(class_id)
        .ok()
        .and_then(|idx| ACNE_CLASSES.get(idx))
        .map(|name| (*name).to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}
