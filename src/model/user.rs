use super::role::Role;

#[derive(Debug, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub role: Role,
    pub is_active: bool,
}
