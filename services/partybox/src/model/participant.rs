//! Participant records and the persisted quota-history shape.
//!
//! # Purpose
//! Defines the typed participant used by the ledger and API, plus the raw
//! document shapes (`StoredParticipant`, `StoredFeedback`) kept by the store
//! backends.
//!
//! # Key invariants
//! - Raw shapes are decoded exactly once, here, into typed records.
//! - History entries written before the base/quota split only carry
//!   `newQuota`; that value stands in for both `quota` and `baseQuota`.
//! - A participant missing `baseQuota` reads as its current `quota`.
//! - Decoded history is ordered newest first.
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use partybox_common::ids::ParticipantId;
use partybox_common::{Feedback, ParticipantView, QuotaValues};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub surname: String,
    pub base_quota: u32,
    pub quota: u32,
    /// Newest first, at most the ledger's history limit.
    pub quota_history: Vec<Feedback>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn values(&self) -> QuotaValues {
        QuotaValues::new(self.base_quota, self.quota)
    }

    pub fn from_stored(stored: StoredParticipant) -> Self {
        let quota = stored.quota.unwrap_or(0);
        let base_quota = stored.base_quota.unwrap_or(quota);
        Self {
            id: stored.id,
            name: stored.name,
            surname: stored.surname,
            base_quota: clamp_quota(base_quota),
            quota: clamp_quota(quota),
            quota_history: decode_history(stored.quota_history.unwrap_or_default()),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }

    pub fn view(&self) -> ParticipantView {
        ParticipantView {
            id: self.id,
            name: self.name.clone(),
            surname: self.surname.clone(),
            base_quota: self.base_quota,
            quota: self.quota,
            quota_history: self.quota_history.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParticipant {
    pub name: String,
    pub surname: String,
}

impl NewParticipant {
    pub fn validated(name: &str, surname: &str) -> Result<Self, String> {
        let name = name.trim();
        let surname = surname.trim();
        if name.is_empty() {
            return Err("name is required".to_string());
        }
        if surname.is_empty() {
            return Err("surname is required".to_string());
        }
        Ok(Self {
            name: name.to_string(),
            surname: surname.to_string(),
        })
    }

    /// Fresh participants start with zeroed counters and an empty history.
    pub fn into_stored(self, id: ParticipantId, now: DateTime<Utc>) -> StoredParticipant {
        StoredParticipant {
            id,
            name: self.name,
            surname: self.surname,
            quota: Some(0),
            base_quota: Some(0),
            quota_history: Some(Vec::new()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Participant document as kept by a backend. Counter and history fields are
/// optional because older documents may predate them.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredParticipant {
    pub id: ParticipantId,
    pub name: String,
    pub surname: String,
    pub quota: Option<i64>,
    pub base_quota: Option<i64>,
    pub quota_history: Option<Vec<StoredFeedback>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// History entry as persisted (camelCase JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFeedback {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_int"
    )]
    pub base_quota: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_int"
    )]
    pub quota: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_int"
    )]
    pub difference: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_lenient_int"
    )]
    pub new_quota: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl StoredFeedback {
    pub fn from_feedback(feedback: &Feedback) -> Self {
        Self {
            timestamp: feedback.timestamp,
            base_quota: feedback.base_quota.map(i64::from),
            quota: feedback.quota.map(i64::from),
            difference: feedback.difference,
            new_quota: None,
            field: None,
        }
    }

    pub fn into_feedback(self) -> Feedback {
        let legacy = self.new_quota;
        Feedback {
            timestamp: self.timestamp,
            base_quota: self.base_quota.or(legacy).map(clamp_quota),
            quota: self.quota.or(legacy).map(clamp_quota),
            difference: self.difference,
        }
    }
}

/// Decode persisted history into typed entries, newest first.
pub fn decode_history(entries: Vec<StoredFeedback>) -> Vec<Feedback> {
    let mut history: Vec<Feedback> = entries
        .into_iter()
        .map(StoredFeedback::into_feedback)
        .collect();
    // Stable: entries sharing a timestamp keep their stored order.
    history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    history
}

/// Decode raw JSON history entries one by one. Entries that do not decode are
/// logged and left out so one bad record cannot hide the participant.
pub fn decode_stored_entries(owner: ParticipantId, entries: Vec<Value>) -> Vec<StoredFeedback> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(
            |(index, entry)| match serde_json::from_value::<StoredFeedback>(entry) {
                Ok(decoded) => Some(decoded),
                Err(err) => {
                    tracing::warn!(
                        participant = %owner,
                        index,
                        error = %err,
                        "skipping undecodable quota history entry"
                    );
                    None
                }
            },
        )
        .collect()
}

impl StoredParticipant {
    /// Whether this document predates the history and base quota fields.
    pub fn needs_normalization(&self) -> bool {
        self.quota_history.is_none() || self.base_quota.is_none() || self.quota.is_none()
    }

    /// Fill missing fields in place: empty history, zero quota, and a base
    /// quota equal to the current quota.
    pub fn normalize(&mut self) -> bool {
        if !self.needs_normalization() {
            return false;
        }
        let quota = *self.quota.get_or_insert(0);
        self.base_quota.get_or_insert(quota);
        self.quota_history.get_or_insert_with(Vec::new);
        true
    }
}

fn clamp_quota(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Millis(i64),
    Extended {
        #[serde(rename = "$date")]
        date: Box<RawTimestamp>,
    },
}

impl RawTimestamp {
    fn into_utc(self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Text(text) => parse_text_timestamp(text.trim()),
            RawTimestamp::Millis(millis) => Utc.timestamp_millis_opt(millis).single(),
            RawTimestamp::Extended { date } => date.into_utc(),
        }
    }
}

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%a %b %d %Y %H:%M:%S GMT%z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// ISO-8601 and RFC 3339/2822 text, plus the strings a JavaScript `Date`
/// prints. Zone-less values are taken as UTC.
fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Some(value.with_timezone(&Utc));
    }
    if let Ok(value) = DateTime::parse_from_rfc2822(text) {
        return Some(value.with_timezone(&Utc));
    }
    // `Date.prototype.toString` appends the zone name in parentheses.
    let text = text.split(" (").next().unwrap_or(text);
    OFFSET_FORMATS
        .iter()
        .find_map(|format| DateTime::parse_from_str(text, format).ok())
        .map(|value| value.with_timezone(&Utc))
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|naive| naive.and_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    RawTimestamp::deserialize(deserializer)?
        .into_utc()
        .ok_or_else(|| serde::de::Error::custom("unrecognized timestamp"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
}

fn deserialize_lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<RawNumber>::deserialize(deserializer)?.map(|number| match number {
            RawNumber::Int(value) => value,
            RawNumber::Float(value) => value.round() as i64,
        }),
    )
}
