//! Normalizes labels from the image-classification service into a [`WasteItem`].

use serde::{Deserialize, Serialize};

use crate::db::models::classification::{NON_RECYCLABLE_PREFIX, RECYCLABLE_PREFIX};

pub const UNKNOWN_ITEM: &str = "unknown";
pub const UNKNOWN_MATERIAL: &str = "Unknown Material";

/// `(label keyword, recyclable, material)`, matched in order.
const LABEL_MAP: [(&str, bool, &str); 17] = [
    ("plastic bottle", true, "Plastic"),
    ("bottle", true, "Plastic"),
    ("can", true, "Aluminum"),
    ("paper", true, "Paper"),
    ("food", false, "Organic Waste"),
    ("wrapper", false, "Plastic Film"),
    ("plastic", true, "Plastic"),
    ("glass", true, "Glass"),
    ("metal", true, "Metal"),
    ("organic", false, "Organic Waste"),
    ("battery", false, "Hazardous Waste"),
    ("electronics", false, "Hazardous Waste"),
    ("chemical", false, "Hazardous Waste"),
    ("paint", false, "Hazardous Waste"),
    ("clothes", false, "Donatable"),
    ("furniture", false, "Donatable"),
    ("book", false, "Donatable"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasteItem {
    pub item: String,
    pub material: String,
    pub recyclable: bool,
}

impl WasteItem {
    pub fn unknown() -> Self {
        Self {
            item: UNKNOWN_ITEM.to_string(),
            material: UNKNOWN_MATERIAL.to_string(),
            recyclable: false,
        }
    }

    /// `"Recyclable - Plastic"` / `"Non-Recyclable - Organic Waste"`
    pub fn result(&self) -> String {
        let prefix = if self.recyclable {
            RECYCLABLE_PREFIX
        } else {
            NON_RECYCLABLE_PREFIX
        };
        format!("{} - {}", prefix, self.material)
    }
}

/// Picks the first label mentioning a known keyword, then the first keyword (in map order)
/// that label mentions. Labels are compared lowercased.
pub fn classify_labels<S: AsRef<str>>(labels: &[S]) -> WasteItem {
    let lowered: Vec<String> = labels
        .iter()
        .map(|l| l.as_ref().trim().to_lowercase())
        .collect();

    let Some(label) = lowered
        .iter()
        .find(|l| LABEL_MAP.iter().any(|(key, _, _)| l.contains(key)))
    else {
        tracing::debug!(?lowered, "no known waste keyword in labels");
        return WasteItem::unknown();
    };

    LABEL_MAP
        .iter()
        .find(|(key, _, _)| label.contains(key))
        .map(|(key, recyclable, material)| WasteItem {
            item: key.to_string(),
            material: material.to_string(),
            recyclable: *recyclable,
        })
        .unwrap_or_else(WasteItem::unknown)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_first_matching_label_wins() {
        let item = classify_labels(&["Person", "Plastic Bottle", "Food"]);
        assert_eq!(item.item, "plastic bottle");
        assert!(item.recyclable);
        assert_eq!(item.result(), "Recyclable - Plastic");
    }

    #[test]
    fn test_keyword_order_within_label() {
        // "can" comes before "metal" in the map
        let item = classify_labels(&["metal can"]);
        assert_eq!(item.item, "can");
        assert_eq!(item.material, "Aluminum");
    }

    #[test]
    fn test_non_recyclable() {
        let item = classify_labels(&["AA battery"]);
        assert!(!item.recyclable);
        assert_eq!(item.result(), "Non-Recyclable - Hazardous Waste");
    }

    #[test]
    fn test_unknown_labels() {
        let item = classify_labels(&["sky", "cloud"]);
        assert_eq!(item, WasteItem::unknown());
        assert_eq!(item.result(), "Non-Recyclable - Unknown Material");

        let none: [&str; 0] = [];
        assert_eq!(classify_labels(&none), WasteItem::unknown());
    }
}
