use serde::{Deserialize, Serialize};

/// One entry of the voter roll, keyed by its EPIC (elector photo
/// identity card) number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct VoterRecord {
    #[serde(default, alias = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub epic_no: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_in_regional_lang: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly_constituency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parliamentary_constituency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_station: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, rename = "dataSource", skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl VoterRecord {
    /// "Relation: Name" when the record carries a relative, falling back to
    /// the father's name.
    pub fn relation_display(&self) -> Option<String> {
        match (&self.relation_type, &self.relation_name) {
            (Some(kind), Some(name)) if !name.is_empty() => Some(format!("{}: {}", kind, name)),
            _ => self.father_name.clone().filter(|n| !n.is_empty()),
        }
    }

    /// City, district and state joined for a one-line location.
    pub fn location_display(&self) -> String {
        [&self.city, &self.district, &self.state]
            .iter()
            .filter_map(|part| part.as_deref())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
