use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveType {
    pub id: u64,
    pub name: String,
    pub active: bool,
}
