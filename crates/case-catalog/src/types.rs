//! Core data types for catalog parents, raw detail records and classified items.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Canonical rarity tiers, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RarityTier {
    Consumer,
    Industrial,
    MilSpec,
    Restricted,
    Classified,
    Covert,
    Contraband,
    /// Knives and gloves only, by the site's convention.
    Exceptional,
}

impl RarityTier {
    /// All tiers in ascending order.
    pub const ALL: [RarityTier; 8] = [
        RarityTier::Consumer,
        RarityTier::Industrial,
        RarityTier::MilSpec,
        RarityTier::Restricted,
        RarityTier::Classified,
        RarityTier::Covert,
        RarityTier::Contraband,
        RarityTier::Exceptional,
    ];

    /// The database enum value for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            RarityTier::Consumer => "consumer",
            RarityTier::Industrial => "industrial",
            RarityTier::MilSpec => "mil_spec",
            RarityTier::Restricted => "restricted",
            RarityTier::Classified => "classified",
            RarityTier::Covert => "covert",
            RarityTier::Contraband => "contraband",
            RarityTier::Exceptional => "exceptional",
        }
    }

    /// Tiers kept by the default harvest: `restricted` and above.
    pub fn retained() -> impl Iterator<Item = RarityTier> {
        Self::ALL
            .into_iter()
            .filter(|t| *t >= RarityTier::Restricted)
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RarityTier {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::UnknownRarity(s.to_string()))
    }
}

/// How a container can be obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObtainMethod {
    Rare,
    Regular,
    Discontinued,
}

impl ObtainMethod {
    /// Map a site label (Chinese or English) to an obtain method.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "稀有" => Some(ObtainMethod::Rare),
            "常规" => Some(ObtainMethod::Regular),
            "绝版" => Some(ObtainMethod::Discontinued),
            other => match other.to_ascii_lowercase().as_str() {
                "rare" => Some(ObtainMethod::Rare),
                "regular" => Some(ObtainMethod::Regular),
                "discontinued" => Some(ObtainMethod::Discontinued),
                _ => None,
            },
        }
    }
}

/// Sub-type of a melee-class item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeleeSubType {
    Knife,
    Glove,
}

impl MeleeSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeleeSubType::Knife => "knife",
            MeleeSubType::Glove => "glove",
        }
    }
}

/// Which partition (and which tables) an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Skin,
    Melee,
}

/// A catalog parent ("container") as stored in the parent table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogParent {
    /// Store-assigned identity; absent before the first upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "qaq_id")]
    pub external_id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obtain_method: Option<ObtainMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// An unvalidated item as received in a detail payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItemRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<i64>,
    #[serde(default)]
    pub short_name: Option<String>,
    /// Free-text rarity label in the site's vocabulary.
    #[serde(default)]
    pub rln: Option<String>,
}

impl RawItemRecord {
    pub fn new(id: i64, short_name: &str, rln: &str) -> Self {
        Self {
            id: Some(id),
            short_name: Some(short_name.to_string()),
            rln: Some(rln.to_string()),
        }
    }

    /// Decode one JSON value. Non-objects and objects with mistyped fields yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }

    /// Decode a list of JSON values, dropping entries that are not item objects.
    pub fn from_values(values: &[Value]) -> Vec<Self> {
        values
            .iter()
            .filter_map(|v| {
                let record = Self::from_value(v);
                if record.is_none() {
                    tracing::warn!("skipping undecodable item record: {v}");
                }
                record
            })
            .collect()
    }
}

/// Read an integer identity from a number or a numeric string. Non-positive ids count as missing.
pub fn id_from_value(value: &Value) -> Option<i64> {
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    id.filter(|id| *id > 0)
}

fn lenient_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_from_value))
}

/// A weapon skin row for the skin table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinItem {
    #[serde(rename = "qaq_id")]
    pub external_id: i64,
    #[serde(rename = "qaq_url")]
    pub url: String,
    pub name: String,
    pub weapon_type: Option<String>,
    pub rarity: RarityTier,
}

/// A knife or glove row for the melee table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeleeItem {
    #[serde(rename = "qaq_id")]
    pub external_id: i64,
    #[serde(rename = "qaq_url")]
    pub url: String,
    pub name: String,
    #[serde(rename = "item_type")]
    pub sub_type: MeleeSubType,
    pub rarity: RarityTier,
}

/// A parent→item association still keyed by external ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingLink {
    pub parent_external_id: i64,
    pub item_external_id: i64,
    pub category: ItemCategory,
}

/// Output of one detail transformation, partitioned by category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transformed {
    pub skins: Vec<SkinItem>,
    pub melee: Vec<MeleeItem>,
    pub skin_links: Vec<PendingLink>,
    pub melee_links: Vec<PendingLink>,
}

impl Transformed {
    /// Number of item rows across both partitions.
    pub fn item_count(&self) -> usize {
        self.skins.len() + self.melee.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }
}

/// Errors raised by catalog configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Unknown rarity tier: {0}")]
    UnknownRarity(String),

    #[error("Invalid URL template (missing {{id}}): {0}")]
    InvalidTemplate(String),
}

/// Convenience result type.
pub type CatalogResult<T> = Result<T, CatalogError>;
