use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushToken {
    pub user_id: Uuid,
    pub expo_push_token: String,
    pub device_id: String,
}
