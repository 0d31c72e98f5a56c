//! Party (event) records.
use chrono::{DateTime, Utc};
use partybox_common::ids::PartyId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct Party {
    pub id: PartyId,
    pub name: String,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable fields of a party, shared by create and update.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq)]
pub struct PartyDraft {
    pub name: String,
    pub location: String,
    pub starts_at: DateTime<Utc>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl PartyDraft {
    /// Trim text fields and collapse blank optional fields to `None`.
    pub fn normalized(self) -> Result<Self, String> {
        let name = self.name.trim().to_string();
        let location = self.location.trim().to_string();
        if name.is_empty() {
            return Err("name is required".to_string());
        }
        if location.is_empty() {
            return Err("location is required".to_string());
        }
        Ok(Self {
            name,
            location,
            starts_at: self.starts_at,
            description: non_blank(self.description),
            image_url: non_blank(self.image_url),
        })
    }

    pub fn into_party(self, id: PartyId, now: DateTime<Utc>) -> Party {
        Party {
            id,
            name: self.name,
            location: self.location,
            starts_at: self.starts_at,
            description: self.description,
            image_url: self.image_url,
            created_at: now,
            updated_at: now,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
