//! Case catalog: data model, item classification and detail-payload transformation.
//!
//! Everything in this crate is pure: it turns loosely-typed records captured
//! from the catalog site into schema-shaped rows, and never performs I/O.

pub mod classify;
pub mod parents;
pub mod payload;
pub mod transform;
pub mod types;

pub use classify::{
    classify_melee_or_skin, classify_melee_sub_type, extract_weapon_type, is_low_quality,
    is_parent_name_match, map_rarity,
};
pub use parents::{transform_parents, transform_parents_at};
pub use payload::{extract_records, DetailEnvelope};
pub use transform::{transform, TransformOptions};
pub use types::*;
