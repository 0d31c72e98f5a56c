// Shared data types used by the partybox service and its client.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub type Result<T> = std::result::Result<T, Error>;

/// Upper bound on stored and displayed quota history entries.
pub const MAX_HISTORY_ITEMS: usize = 20;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid id: {0}")]
    InvalidId(String),
    #[error("{field} must not be negative (got {value})")]
    NegativeQuota { field: &'static str, value: i64 },
    #[error("{field} is out of range (got {value})")]
    QuotaOutOfRange { field: &'static str, value: i64 },
}

pub mod ids {
    // Strongly typed IDs so parties and participants never get mixed up.
    use super::{Error, Result};
    use serde::{Deserialize, Serialize};
    use std::fmt;
    use std::str::FromStr;
    use utoipa::ToSchema;
    use uuid::Uuid;

    macro_rules! id_type {
        ($name:ident) => {
            #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
            #[serde(transparent)]
            pub struct $name(Uuid);

            impl $name {
                pub fn new() -> Self {
                    Self(Uuid::new_v4())
                }

                pub fn from_uuid(uuid: Uuid) -> Self {
                    Self(uuid)
                }

                pub fn as_uuid(&self) -> Uuid {
                    self.0
                }
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::new()
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = Error;

                fn from_str(input: &str) -> Result<Self> {
                    let uuid =
                        Uuid::parse_str(input).map_err(|_| Error::InvalidId(input.into()))?;
                    Ok(Self(uuid))
                }
            }
        };
    }

    id_type!(PartyId);
    id_type!(ParticipantId);
}

/// A participant's pair of counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuotaValues {
    pub base_quota: u32,
    pub quota: u32,
}

impl QuotaValues {
    pub fn new(base_quota: u32, quota: u32) -> Self {
        Self { base_quota, quota }
    }

    /// Validate raw, possibly negative input coming off the wire.
    pub fn try_from_raw(base_quota: i64, quota: i64) -> Result<Self> {
        Ok(Self {
            base_quota: checked_quota("base_quota", base_quota)?,
            quota: checked_quota("quota", quota)?,
        })
    }
}

fn checked_quota(field: &'static str, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(Error::NegativeQuota { field, value });
    }
    u32::try_from(value).map_err(|_| Error::QuotaOutOfRange { field, value })
}

/// One audit record of a quota change, as served to clients.
///
/// `base_quota` and `quota` are optional because entries written before the
/// base/quota split only carried the new quota.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Feedback {
    pub timestamp: DateTime<Utc>,
    pub base_quota: Option<u32>,
    pub quota: Option<u32>,
    pub difference: Option<i64>,
}

impl Feedback {
    /// Build the record for a committed change from `previous_quota` to `values`.
    pub fn recorded(timestamp: DateTime<Utc>, values: QuotaValues, previous_quota: u32) -> Self {
        Self {
            timestamp,
            base_quota: Some(values.base_quota),
            quota: Some(values.quota),
            difference: Some(i64::from(values.quota) - i64::from(previous_quota)),
        }
    }
}

/// Participant as returned by the roster read path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ParticipantView {
    pub id: ids::ParticipantId,
    pub name: String,
    pub surname: String,
    pub base_quota: u32,
    pub quota: u32,
    /// Newest first.
    pub quota_history: Vec<Feedback>,
}

impl ParticipantView {
    pub fn values(&self) -> QuotaValues {
        QuotaValues::new(self.base_quota, self.quota)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ParticipantListResponse {
    pub items: Vec<ParticipantView>,
}

/// Body of the quota mutation endpoint. Signed on purpose: negative input is
/// rejected by validation rather than by the JSON decoder.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema)]
pub struct QuotaUpdateRequest {
    pub base_quota: i64,
    pub quota: i64,
}

impl From<QuotaValues> for QuotaUpdateRequest {
    fn from(values: QuotaValues) -> Self {
        Self {
            base_quota: i64::from(values.base_quota),
            quota: i64::from(values.quota),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QuotaOutcome {
    Applied,
    Unchanged,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct QuotaUpdateResponse {
    pub outcome: QuotaOutcome,
    pub participant: ParticipantView,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ParticipantCreateRequest {
    pub name: String,
    pub surname: String,
}

#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Administrator session; send `token` as `Authorization: Bearer <token>`.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    /// Unix seconds.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::ids::ParticipantId;
    use super::*;
    use std::str::FromStr;

    #[test]
    fn participant_id_round_trip() {
        let id = ParticipantId::new();
        let parsed = ParticipantId::from_str(&id.to_string()).expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn participant_id_rejects_invalid_input() {
        let err = ParticipantId::from_str("not-a-uuid").expect_err("invalid");
        assert!(matches!(err, Error::InvalidId(s) if s == "not-a-uuid"));
    }

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = ParticipantId::new();
        let json = serde_json::to_value(id).expect("json");
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn quota_values_reject_negative_input() {
        let err = QuotaValues::try_from_raw(-1, 3).expect_err("negative base");
        assert!(matches!(err, Error::NegativeQuota { field: "base_quota", value: -1 }));
        let err = QuotaValues::try_from_raw(0, -5).expect_err("negative quota");
        assert!(matches!(err, Error::NegativeQuota { field: "quota", value: -5 }));
        let err = QuotaValues::try_from_raw(0, i64::from(u32::MAX) + 1).expect_err("overflow");
        assert!(matches!(err, Error::QuotaOutOfRange { .. }));
        assert_eq!(
            QuotaValues::try_from_raw(2, 7).expect("valid"),
            QuotaValues::new(2, 7)
        );
    }

    #[test]
    fn recorded_feedback_carries_signed_difference() {
        let now = Utc::now();
        let up = Feedback::recorded(now, QuotaValues::new(5, 8), 5);
        assert_eq!(up.difference, Some(3));
        assert_eq!(up.base_quota, Some(5));
        assert_eq!(up.quota, Some(8));
        let down = Feedback::recorded(now, QuotaValues::new(5, 1), 4);
        assert_eq!(down.difference, Some(-3));
    }
}
