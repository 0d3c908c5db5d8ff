//! Name and label heuristics that classify raw items.
//!
//! The site labels rarity in Chinese; English spellings (both the database
//! enum names and Steam's "X Grade" names) are accepted as well.

use crate::types::{ItemCategory, MeleeSubType, RarityTier};

/// Chinese rarity vocabulary, including the short and "级" spellings.
const RARITY_LABELS_ZH: &[(&str, RarityTier)] = &[
    ("消费级", RarityTier::Consumer),
    ("消费", RarityTier::Consumer),
    ("工业级", RarityTier::Industrial),
    ("工业", RarityTier::Industrial),
    ("军规级", RarityTier::MilSpec),
    ("军规", RarityTier::MilSpec),
    ("受限", RarityTier::Restricted),
    ("保密", RarityTier::Classified),
    ("隐秘", RarityTier::Covert),
    ("违禁", RarityTier::Contraband),
    ("非凡", RarityTier::Exceptional),
];

/// English vocabulary after normalization (lowercase, `-` and spaces folded to `_`).
const RARITY_LABELS_EN: &[(&str, RarityTier)] = &[
    ("consumer", RarityTier::Consumer),
    ("consumer_grade", RarityTier::Consumer),
    ("industrial", RarityTier::Industrial),
    ("industrial_grade", RarityTier::Industrial),
    ("mil_spec", RarityTier::MilSpec),
    ("milspec", RarityTier::MilSpec),
    ("mil_spec_grade", RarityTier::MilSpec),
    ("restricted", RarityTier::Restricted),
    ("classified", RarityTier::Classified),
    ("covert", RarityTier::Covert),
    ("contraband", RarityTier::Contraband),
    ("exceptional", RarityTier::Exceptional),
    ("extraordinary", RarityTier::Exceptional),
];

/// Labels of the lowest grades. "Normal"/"base grade" has no canonical tier at all.
const LOW_QUALITY_LABELS_ZH: &[&str] = &[
    "普通级", "普通", "消费级", "消费", "工业级", "工业", "军规级", "军规",
];

const LOW_QUALITY_LABELS_EN: &[&str] = &[
    "normal",
    "base_grade",
    "consumer",
    "consumer_grade",
    "industrial",
    "industrial_grade",
    "mil_spec",
    "milspec",
    "mil_spec_grade",
];

const GLOVE_KEYWORDS: &[&str] = &["手套", "裹手", "glove", "hand wraps"];

/// Weapon-case and collection markers, in both vocabularies.
const PARENT_MARKERS_ZH: &[&str] = &["武器箱", "收藏品"];
const PARENT_MARKERS_EN: &[&str] = &["weapon case", "collection"];

const NAME_SEPARATORS: &[char] = &['|', '｜'];

fn normalize_en(label: &str) -> String {
    label
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Map a site rarity label to a canonical tier.
pub fn map_rarity(label: &str) -> Option<RarityTier> {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some((_, tier)) = RARITY_LABELS_ZH.iter().find(|(l, _)| *l == trimmed) {
        return Some(*tier);
    }
    let normalized = normalize_en(trimmed);
    RARITY_LABELS_EN
        .iter()
        .find(|(l, _)| *l == normalized)
        .map(|(_, tier)| *tier)
}

/// True for labels of the four lowest grades (normal, consumer, industrial, mil-spec).
pub fn is_low_quality(label: &str) -> bool {
    let trimmed = label.trim();
    if LOW_QUALITY_LABELS_ZH.contains(&trimmed) {
        return true;
    }
    let normalized = normalize_en(trimmed);
    LOW_QUALITY_LABELS_EN.contains(&normalized.as_str())
}

/// Melee-class items are exactly those labelled with the exceptional tier.
pub fn classify_melee_or_skin(label: &str) -> ItemCategory {
    match map_rarity(label) {
        Some(RarityTier::Exceptional) => ItemCategory::Melee,
        _ => ItemCategory::Skin,
    }
}

/// Knife unless the name carries a glove keyword.
pub fn classify_melee_sub_type(name: &str) -> MeleeSubType {
    let lower = name.to_lowercase();
    if GLOVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        MeleeSubType::Glove
    } else {
        MeleeSubType::Knife
    }
}

/// Weapon type from a `"<Weapon> | <Finish>"` name.
pub fn extract_weapon_type(name: &str) -> Option<String> {
    let (weapon, _) = name.split_once(NAME_SEPARATORS)?;
    let weapon = weapon.trim();
    if weapon.is_empty() {
        None
    } else {
        Some(weapon.to_string())
    }
}

/// True if `name` looks like a weapon case or collection.
pub fn is_parent_name_match(name: &str) -> bool {
    if PARENT_MARKERS_ZH.iter().any(|m| name.contains(m)) {
        return true;
    }
    let lower = name.to_lowercase();
    PARENT_MARKERS_EN.iter().any(|m| lower.contains(m))
}

/// Substrings used to query the parent table for eligible parents.
pub fn parent_name_markers() -> impl Iterator<Item = &'static str> {
    PARENT_MARKERS_ZH
        .iter()
        .chain(PARENT_MARKERS_EN.iter())
        .copied()
}
