use serde::{Deserialize, Serialize};

/// Where a place is: coordinates when known, otherwise a free-text locality.
/// Any other shape is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Location {
    Point { lat: f64, lon: f64 },
    Named(String),
    Raw(serde_json::Value),
}

/// A raw corpus record, in the shape the place catalogue is stored in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaceRecord {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type", alias = "category", skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, rename = "imageUrl", alias = "image_url", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, rename = "related_places", alias = "related")]
    pub related: Vec<String>,
}

impl PlaceRecord {
    /// Explicit id, or one derived from the name.
    pub fn resolved_id(&self) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => stable_id(&self.name),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Unknown place"
        } else {
            self.name.trim()
        }
    }
}

/// `p_` + lowercase alphanumeric slug of `name`, words joined by `_`.
pub fn stable_id(name: &str) -> String {
    let slug = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    if slug.is_empty() {
        format!("p_{}", &blake3::hash(name.as_bytes()).to_hex()[..8])
    } else {
        format!("p_{}", slug)
    }
}

/// Text embedded as an entry's primary vector: `name: description`.
pub fn content_text(record: &PlaceRecord) -> String {
    format!("{}: {}", record.display_name(), record.description.trim())
}

/// Subject-relation-object sentences for an entry's links and category.
pub fn relation_text(id: &str, category: Option<&str>, related: &[String]) -> String {
    let mut triples: Vec<String> = related
        .iter()
        .filter(|r| !r.trim().is_empty())
        .map(|r| format!("{} related_to {}", id, r.trim()))
        .collect();
    let category = category.map(str::trim).filter(|c| !c.is_empty()).unwrap_or("place");
    triples.push(format!("{} is_a {}", id, category));
    triples.join(" . ")
}

/// An indexed corpus entry. Both vectors are populated before an entry
/// enters the index.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeEntry {
    pub id: String,
    pub name: String,
    pub body: String,
    pub category: String,
    pub location: Option<Location>,
    pub image_url: Option<String>,
    pub related: Vec<String>,
    pub embedding: Vec<f32>,
    pub relation_embedding: Vec<f32>,
}

impl KnowledgeEntry {
    pub fn from_record(record: &PlaceRecord, embedding: Vec<f32>, relation_embedding: Vec<f32>) -> Self {
        Self {
            id: record.resolved_id(),
            name: record.display_name().to_string(),
            body: record.description.trim().to_string(),
            category: record
                .category
                .clone()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| "place".to_string()),
            location: record.location.clone(),
            image_url: record.image_url.clone().filter(|u| !u.trim().is_empty()),
            related: record.related.clone(),
            embedding,
            relation_embedding,
        }
    }
}
