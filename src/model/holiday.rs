use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub id: u64,
    pub name: String,
    pub date: NaiveDate,
    pub description: Option<String>,
}
