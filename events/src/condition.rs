use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use asset_model::ConditionKind;

/// One unit of work delivered over the condition stream: a request to
/// run the named action against one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub id: Uuid,
    pub kind: ConditionKind,
    pub asset_id: String,
    pub facility: String,
    pub created_at: DateTime<Utc>,
}

impl Condition {
    pub fn new(kind: ConditionKind, asset_id: impl Into<String>, facility: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            asset_id: asset_id.into(),
            facility: facility.into(),
            created_at: Utc::now(),
        }
    }
}

/// Subject conditions for a facility are published on.
pub fn subject(facility: &str) -> String {
    format!("assayer.conditions.{facility}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_round_trips() {
        let condition = Condition::new(ConditionKind::InventoryOutofband, "srv-1", "dc13");
        let json = serde_json::to_string(&condition).unwrap();
        assert!(json.contains("inventoryOutofband"));

        let decoded: Condition = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id, condition.id);
        assert_eq!(decoded.asset_id, "srv-1");
        assert_eq!(decoded.kind, ConditionKind::InventoryOutofband);
    }

    #[test]
    fn subjects_are_facility_scoped() {
        assert_eq!(subject("dc13"), "assayer.conditions.dc13");
        assert_ne!(subject("dc13"), subject("dc14"));
    }
}
