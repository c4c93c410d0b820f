use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque record identity. Assigned at creation, stable for the record's
/// life, never reused (restore mints a fresh one).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WineType {
    Red,
    White,
    #[serde(rename = "rosé")]
    Rose,
    Sparkling,
    Dessert,
}

impl std::fmt::Display for WineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WineType::Red => "red",
            WineType::White => "white",
            WineType::Rose => "rosé",
            WineType::Sparkling => "sparkling",
            WineType::Dessert => "dessert",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for WineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "red" => Ok(WineType::Red),
            "white" => Ok(WineType::White),
            "rosé" | "rose" => Ok(WineType::Rose),
            "sparkling" => Ok(WineType::Sparkling),
            "dessert" => Ok(WineType::Dessert),
            other => Err(format!("unknown wine type: {}", other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rebuy {
    Yes,
    Maybe,
    No,
}

impl std::str::FromStr for Rebuy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" => Ok(Rebuy::Yes),
            "maybe" => Ok(Rebuy::Maybe),
            "no" => Ok(Rebuy::No),
            other => Err(format!("unknown rebuy decision: {}", other)),
        }
    }
}

/// A bottle currently in the cellar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogRecord {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub producer: String,
    #[serde(rename = "type")]
    pub wine_type: WineType,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub grape: String,
    pub boldness: u8,
    pub tannins: u8,
    pub acidity: u8,
    #[serde(default)]
    pub price: Option<f64>,
    pub quantity: u32,
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub notes: String,
    /// Base64-encoded label/product image, stripped first under storage
    /// pressure.
    #[serde(default)]
    pub image: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// Descriptive fields for a bottle that doesn't have an identity yet.
/// `CatalogRecord::from_draft` assigns the id and `added_at`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BottleDraft {
    pub name: String,
    #[serde(default)]
    pub producer: String,
    #[serde(rename = "type", default)]
    pub wine_type: Option<WineType>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub grape: String,
    #[serde(default = "default_scale")]
    pub boldness: u8,
    #[serde(default = "default_scale")]
    pub tannins: u8,
    #[serde(default = "default_scale")]
    pub acidity: u8,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub image: Option<String>,
}

fn default_scale() -> u8 {
    3
}

fn default_quantity() -> u32 {
    1
}

/// Clamp a 1..=5 taste attribute.
pub fn clamp_scale(value: u8) -> u8 {
    value.clamp(1, 5)
}

impl CatalogRecord {
    pub fn from_draft(draft: BottleDraft) -> Self {
        Self {
            id: RecordId::generate(),
            name: draft.name,
            producer: draft.producer,
            wine_type: draft.wine_type.unwrap_or(WineType::Red),
            year: draft.year,
            region: draft.region,
            grape: draft.grape,
            boldness: clamp_scale(draft.boldness),
            tannins: clamp_scale(draft.tannins),
            acidity: clamp_scale(draft.acidity),
            price: draft.price,
            quantity: draft.quantity.max(1),
            store: draft.store,
            notes: draft.notes,
            image: draft.image,
            added_at: Utc::now(),
        }
    }
}

/// A consumed/removed bottle retained with a verdict. Created only by
/// archiving a catalog record (copy + delete, never a shared reference).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    #[serde(flatten)]
    pub record: CatalogRecord,
    pub rating: u8,
    #[serde(default)]
    pub rebuy: Option<Rebuy>,
    #[serde(default)]
    pub archive_notes: String,
    pub archived_at: DateTime<Utc>,
}

impl ArchiveRecord {
    pub fn id(&self) -> &RecordId {
        &self.record.id
    }
}

/// The full cellar: active bottles plus the archive of consumed ones.
/// `CellarManager` is the sole mutator; stores and channels only ever see
/// whole snapshots of this.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub active: Vec<CatalogRecord>,
    #[serde(default)]
    pub archive: Vec<ArchiveRecord>,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.archive.is_empty()
    }

    /// Sort both lists descending by their timestamp field. `sort_by` is
    /// stable, so equal timestamps keep their prior order.
    pub fn sort(&mut self) {
        self.active.sort_by(|a, b| b.added_at.cmp(&a.added_at));
        self.archive.sort_by(|a, b| b.archived_at.cmp(&a.archived_at));
    }

    pub fn total_bottles(&self) -> u64 {
        self.active.iter().map(|r| u64::from(r.quantity)).sum()
    }

    pub fn find_active(&self, id: &RecordId) -> Option<&CatalogRecord> {
        self.active.iter().find(|r| &r.id == id)
    }

    pub fn find_archived(&self, id: &RecordId) -> Option<&ArchiveRecord> {
        self.archive.iter().find(|r| r.id() == id)
    }

    /// Copy with every embedded image dropped. Used by the cache store's
    /// quota-retry path.
    pub fn without_images(&self) -> Collection {
        let mut copy = self.clone();
        for record in &mut copy.active {
            record.image = None;
        }
        for entry in &mut copy.archive {
            entry.record.image = None;
        }
        copy
    }

    pub fn has_images(&self) -> bool {
        self.active.iter().any(|r| r.image.is_some())
            || self.archive.iter().any(|a| a.record.image.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bottle(name: &str, ts: i64) -> CatalogRecord {
        let mut record = CatalogRecord::from_draft(BottleDraft {
            name: name.to_string(),
            ..Default::default()
        });
        record.added_at = Utc.timestamp_opt(ts, 0).unwrap();
        record
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let mut collection = Collection {
            active: vec![bottle("old", 100), bottle("tie-a", 200), bottle("tie-b", 200)],
            archive: vec![],
        };
        collection.sort();

        let names: Vec<&str> = collection.active.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["tie-a", "tie-b", "old"]);
    }

    #[test]
    fn test_wire_field_names() {
        let record = bottle("Reserva", 100);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("addedAt").is_some());
        assert_eq!(json["type"], "red");
        assert_eq!(json["quantity"], 1);
    }

    #[test]
    fn test_rose_round_trips_with_accent() {
        let json = serde_json::to_string(&WineType::Rose).unwrap();
        assert_eq!(json, "\"rosé\"");
        let back: WineType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WineType::Rose);
    }

    #[test]
    fn test_archive_record_flattens_catalog_fields() {
        let entry = ArchiveRecord {
            record: bottle("Reserva", 100),
            rating: 4,
            rebuy: Some(Rebuy::Yes),
            archive_notes: String::new(),
            archived_at: Utc.timestamp_opt(200, 0).unwrap(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["name"], "Reserva");
        assert_eq!(json["rating"], 4);
        assert_eq!(json["rebuy"], "yes");
        assert!(json.get("archivedAt").is_some());
    }

    #[test]
    fn test_without_images() {
        let mut record = bottle("Reserva", 100);
        record.image = Some("aGVsbG8=".to_string());
        let collection = Collection {
            active: vec![record],
            archive: vec![],
        };
        assert!(collection.has_images());
        let stripped = collection.without_images();
        assert!(!stripped.has_images());
        assert_eq!(stripped.active[0].name, "Reserva");
    }

    #[test]
    fn test_draft_clamps_attributes_and_quantity() {
        let record = CatalogRecord::from_draft(BottleDraft {
            name: "x".to_string(),
            boldness: 9,
            tannins: 0,
            quantity: 0,
            ..Default::default()
        });
        assert_eq!(record.boldness, 5);
        assert_eq!(record.tannins, 1);
        assert_eq!(record.quantity, 1);
    }
}
