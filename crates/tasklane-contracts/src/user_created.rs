//! Announcement that a user account exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tasklane_core::integration::IntegrationEvent;
use uuid::Uuid;

/// Published by the Account service once a new user is committed.
///
/// Serialized as `{"UserId": "...", "CreatedDateTime": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserCreatedIntegration {
    /// The new user's identifier.
    pub user_id: Uuid,
    /// When the integration event was produced, in UTC.
    pub created_date_time: DateTime<Utc>,
}

impl UserCreatedIntegration {
    /// Creates the announcement for `user_id`.
    #[must_use]
    pub fn new(user_id: Uuid, created_date_time: DateTime<Utc>) -> Self {
        Self {
            user_id,
            created_date_time,
        }
    }
}

impl IntegrationEvent for UserCreatedIntegration {
    const CHANNEL: &'static str = "UserCreatedIntegration";

    fn dedup_key(&self) -> String {
        format!("{}:{}", Self::CHANNEL, self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> UserCreatedIntegration {
        UserCreatedIntegration::new(
            Uuid::parse_str("3f2b8c4e-1d2a-4b6e-9f00-0a1b2c3d4e5f").unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_serializes_with_pascal_case_field_names() {
        // Act
        let json = serde_json::to_value(sample()).unwrap();

        // Assert
        assert_eq!(
            json,
            serde_json::json!({
                "UserId": "3f2b8c4e-1d2a-4b6e-9f00-0a1b2c3d4e5f",
                "CreatedDateTime": "2026-01-15T10:00:00Z"
            })
        );
    }

    #[test]
    fn test_deserializes_payload_from_another_service() {
        let payload = concat!(
            r#"{"UserId":"3f2b8c4e-1d2a-4b6e-9f00-0a1b2c3d4e5f","#,
            r#""CreatedDateTime":"2026-01-15T10:00:00+00:00"}"#
        );

        let event: UserCreatedIntegration = serde_json::from_str(payload).unwrap();

        assert_eq!(event, sample());
    }

    #[test]
    fn test_channel_and_dedup_key() {
        assert_eq!(UserCreatedIntegration::CHANNEL, "UserCreatedIntegration");
        assert_eq!(
            sample().dedup_key(),
            "UserCreatedIntegration:3f2b8c4e-1d2a-4b6e-9f00-0a1b2c3d4e5f"
        );
    }
}
