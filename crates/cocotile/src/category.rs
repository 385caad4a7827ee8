//! Damage-category vocabulary and raw-label resolution.
//!
//! The vocabulary is closed: four categories with table-assigned IDs and
//! colors. IDs never depend on which raw labels a dataset happens to
//! contain, so category IDs are stable across runs.

use std::collections::BTreeSet;
use std::fmt;

/// The two raw labels that merge into [`Category::Uncertain`]. Both denote
/// the same downstream class and must not be rasterized twice.
pub const MERGED_UNCERTAIN_LABELS: [&str; 2] = ["Possibly damaged", "Damaged"];

/// Fixed damage-category vocabulary.
///
/// Declaration order is vocabulary order; `Ord` follows it, so ordered sets
/// of categories enumerate as undamaged, damaged, uncertain, buildings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Undamaged,
    Damaged,
    Uncertain,
    Buildings,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Undamaged,
        Category::Damaged,
        Category::Uncertain,
        Category::Buildings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Undamaged => "undamaged",
            Category::Damaged => "damaged",
            Category::Uncertain => "uncertain",
            Category::Buildings => "buildings",
        }
    }

    /// Stable 1-based ID from the vocabulary table.
    pub fn id(self) -> u32 {
        match self {
            Category::Undamaged => 1,
            Category::Damaged => 2,
            Category::Uncertain => 3,
            Category::Buildings => 4,
        }
    }

    /// Burn color for this category's masks.
    pub fn rgb(self) -> [u8; 3] {
        match self {
            Category::Undamaged => [0, 255, 0],
            Category::Damaged => [255, 0, 0],
            Category::Uncertain => [255, 255, 0],
            Category::Buildings => [255, 255, 255],
        }
    }

    /// Map a raw `damage_gra` value to its category. Unrecognized or empty
    /// labels fall back to `Buildings`, the catch-all building-footprint
    /// class.
    pub fn from_raw_label(raw: &str) -> Category {
        match raw {
            "No visible damage" => Category::Undamaged,
            "Destroyed" => Category::Damaged,
            "Possibly damaged" | "Damaged" => Category::Uncertain,
            _ => Category::Buildings,
        }
    }

    /// Exact-color lookup used when matching mask pixels back to categories.
    pub fn from_rgb(rgb: [u8; 3]) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.rgb() == rgb)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// True when `raw` is one of the two labels merged into `Uncertain`.
pub fn is_merged_uncertain(raw: &str) -> bool {
    MERGED_UNCERTAIN_LABELS.contains(&raw)
}

/// Resolve the set of raw labels present in a dataset to the run's category
/// vocabulary.
///
/// Every run gets at least one category: with no raw labels, or none
/// recognized, the result is the single `Buildings` fallback so every pixel
/// has a class.
pub fn resolve_categories<'a, I>(raw_labels: I) -> BTreeSet<Category>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut set: BTreeSet<Category> = raw_labels
        .into_iter()
        .map(Category::from_raw_label)
        .collect();
    if set.is_empty() {
        set.insert(Category::Buildings);
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_unknown_and_blank_labels_resolve_to_buildings_only() {
        for labels in [vec![], vec!["unknown"], vec![""]] {
            let set = resolve_categories(labels);
            assert_eq!(set.len(), 1);
            assert!(set.contains(&Category::Buildings));
            assert_eq!(set.iter().next().unwrap().id(), 4);
        }
    }

    #[test]
    fn ambiguous_damage_labels_merge_into_one_uncertain_entry() {
        let set = resolve_categories(["Possibly damaged", "Damaged"]);
        assert_eq!(set.len(), 1);
        assert!(set.contains(&Category::Uncertain));
        assert_eq!(set.iter().next().unwrap().id(), 3);
    }

    #[test]
    fn ids_come_from_the_table_not_discovery_order() {
        // Discovery order reversed; IDs must still be the table's.
        let set = resolve_categories(["Destroyed", "No visible damage"]);
        let ids: Vec<u32> = set.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn color_round_trip_is_exact() {
        for c in Category::ALL {
            assert_eq!(Category::from_rgb(c.rgb()), Some(c));
        }
        assert_eq!(Category::from_rgb([1, 2, 3]), None);
    }
}
