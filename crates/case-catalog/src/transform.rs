//! Detail transformation: raw item records → partitioned rows and pending links.

use crate::classify::{
    classify_melee_or_skin, classify_melee_sub_type, extract_weapon_type, is_low_quality,
    is_parent_name_match, map_rarity,
};
use crate::types::{
    CatalogError, CatalogResult, ItemCategory, MeleeItem, PendingLink, RarityTier,
    RawItemRecord, SkinItem, Transformed,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Default item page URL on the catalog site.
pub const DEFAULT_ITEM_URL_TEMPLATE: &str = "https://csqaq.com/goods/{id}";

/// Knobs for one transformation: where item pages live and which tiers are kept.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOptions {
    item_url_template: String,
    allowed: BTreeSet<RarityTier>,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            item_url_template: DEFAULT_ITEM_URL_TEMPLATE.to_string(),
            allowed: RarityTier::retained().collect(),
        }
    }
}

impl TransformOptions {
    /// Use a different item URL template. The template must contain `{id}`.
    pub fn with_item_url_template(mut self, template: &str) -> CatalogResult<Self> {
        if !template.contains("{id}") {
            return Err(CatalogError::InvalidTemplate(template.to_string()));
        }
        self.item_url_template = template.to_string();
        Ok(self)
    }

    /// Narrow the allowed tier set. Tiers below `restricted` are still
    /// rejected by the low-quality pre-filter.
    pub fn with_allowed<I>(mut self, tiers: I) -> Self
    where
        I: IntoIterator<Item = RarityTier>,
    {
        self.allowed = tiers.into_iter().collect();
        self
    }

    pub fn allows(&self, tier: RarityTier) -> bool {
        self.allowed.contains(&tier)
    }

    pub fn item_url(&self, external_id: i64) -> String {
        self.item_url_template
            .replace("{id}", &external_id.to_string())
    }
}

/// Transform one detail payload for `parent_external_id`.
///
/// Records are processed in input order and each lands in at most one
/// partition. Rejected records are dropped; low-quality ones without logging.
pub fn transform(
    raw_items: &[RawItemRecord],
    parent_external_id: i64,
    options: &TransformOptions,
) -> Transformed {
    let mut out = Transformed::default();

    for record in raw_items {
        let (external_id, name) = match (record.id, record.short_name.as_deref()) {
            (Some(id), Some(name)) if !name.trim().is_empty() => (id, name),
            _ => {
                warn!("skipping item missing id or short_name: {record:?}");
                continue;
            }
        };

        // The payload sometimes embeds the container itself.
        if is_parent_name_match(name) {
            debug!("skipping parent entry {name} (qaq_id={external_id})");
            continue;
        }

        let label = record.rln.as_deref().unwrap_or_default();
        if is_low_quality(label) {
            continue;
        }

        let Some(rarity) = map_rarity(label) else {
            warn!("skipping item with unmapped rarity: {name} (rln={label:?}, qaq_id={external_id})");
            continue;
        };

        if !options.allows(rarity) {
            debug!("skipping {name}: tier {rarity} not allowed");
            continue;
        }

        let url = options.item_url(external_id);
        match classify_melee_or_skin(label) {
            ItemCategory::Melee => {
                out.melee.push(MeleeItem {
                    external_id,
                    url,
                    name: name.to_string(),
                    sub_type: classify_melee_sub_type(name),
                    rarity,
                });
                out.melee_links.push(PendingLink {
                    parent_external_id,
                    item_external_id: external_id,
                    category: ItemCategory::Melee,
                });
            }
            ItemCategory::Skin => {
                out.skins.push(SkinItem {
                    external_id,
                    url,
                    name: name.to_string(),
                    weapon_type: extract_weapon_type(name),
                    rarity,
                });
                out.skin_links.push(PendingLink {
                    parent_external_id,
                    item_external_id: external_id,
                    category: ItemCategory::Skin,
                });
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeleeSubType;

    fn scenario() -> Vec<RawItemRecord> {
        vec![
            RawItemRecord::new(1, "AK-47 | Redline", "隐秘"),
            RawItemRecord::new(2, "Karambit | Fade", "非凡"),
            RawItemRecord::new(3, "P250 | Sand Dune", "消费"),
        ]
    }

    #[test]
    fn test_scenario_partitions() {
        let out = transform(&scenario(), 500, &TransformOptions::default());

        assert_eq!(out.skins.len(), 1);
        assert_eq!(out.skins[0].external_id, 1);
        assert_eq!(out.skins[0].weapon_type.as_deref(), Some("AK-47"));
        assert_eq!(out.skins[0].rarity, RarityTier::Covert);
        assert_eq!(out.skins[0].url, "https://csqaq.com/goods/1");

        assert_eq!(out.melee.len(), 1);
        assert_eq!(out.melee[0].external_id, 2);
        assert_eq!(out.melee[0].sub_type, MeleeSubType::Knife);
        assert_eq!(out.melee[0].rarity, RarityTier::Exceptional);

        assert_eq!(out.skin_links.len() + out.melee_links.len(), 2);
        assert_eq!(out.skin_links[0].parent_external_id, 500);
        assert_eq!(out.melee_links[0].item_external_id, 2);
    }

    #[test]
    fn test_low_quality_never_emitted() {
        let raw: Vec<_> = ["消费", "消费级", "工业", "工业级", "军规", "军规级", "普通", "consumer", "mil-spec"]
            .iter()
            .enumerate()
            .map(|(i, l)| RawItemRecord::new(i as i64 + 1, "Glock-18 | Candy Apple", l))
            .collect();
        let out = transform(&raw, 1, &TransformOptions::default());
        assert!(out.is_empty());
        assert!(out.skin_links.is_empty() && out.melee_links.is_empty());
    }

    #[test]
    fn test_rejects_missing_fields_and_parent_entry() {
        let raw = vec![
            RawItemRecord { id: None, short_name: Some("AWP | Asiimov".into()), rln: Some("隐秘".into()) },
            RawItemRecord { id: Some(9), short_name: None, rln: Some("隐秘".into()) },
            RawItemRecord::new(10, "幻彩武器箱", "隐秘"),
            RawItemRecord::new(11, "AWP | Asiimov", "unknown-tier"),
            RawItemRecord { id: Some(12), short_name: Some("M4A4 | Howl".into()), rln: None },
        ];
        let out = transform(&raw, 1, &TransformOptions::default());
        assert!(out.is_empty());
    }

    #[test]
    fn test_order_preserved_within_partitions() {
        let raw = vec![
            RawItemRecord::new(5, "M4A4 | Asiimov", "隐秘"),
            RawItemRecord::new(6, "Sport Gloves | Vice", "非凡"),
            RawItemRecord::new(4, "AWP | Hyper Beast", "保密"),
            RawItemRecord::new(7, "Bayonet | Doppler", "非凡"),
            RawItemRecord::new(3, "MP7 | Nemesis", "受限"),
        ];
        let out = transform(&raw, 1, &TransformOptions::default());
        let skin_ids: Vec<_> = out.skins.iter().map(|s| s.external_id).collect();
        let melee_ids: Vec<_> = out.melee.iter().map(|m| m.external_id).collect();
        assert_eq!(skin_ids, vec![5, 4, 3]);
        assert_eq!(melee_ids, vec![6, 7]);
        assert_eq!(out.melee[0].sub_type, MeleeSubType::Glove);
        let link_ids: Vec<_> = out.skin_links.iter().map(|l| l.item_external_id).collect();
        assert_eq!(link_ids, skin_ids);
    }

    #[test]
    fn test_narrowed_allowed_set() {
        let options = TransformOptions::default()
            .with_allowed([RarityTier::Covert, RarityTier::Exceptional]);
        let raw = vec![
            RawItemRecord::new(1, "MP7 | Nemesis", "受限"),
            RawItemRecord::new(2, "AK-47 | Fire Serpent", "隐秘"),
        ];
        let out = transform(&raw, 1, &options);
        assert_eq!(out.skins.len(), 1);
        assert_eq!(out.skins[0].external_id, 2);
    }

    #[test]
    fn test_item_url_template() {
        let options = TransformOptions::default()
            .with_item_url_template("https://mirror.example/item/{id}")
            .unwrap();
        assert_eq!(options.item_url(12), "https://mirror.example/item/12");
        assert!(TransformOptions::default()
            .with_item_url_template("https://no-placeholder")
            .is_err());
    }
}
