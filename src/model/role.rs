use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Manager,
    Employee,
}

/// Roles are persisted as a comma separated set, e.g. `ADMIN,MANAGER`.
/// Unknown entries are dropped and duplicates collapsed.
pub fn parse_roles(raw: &str) -> Vec<Role> {
    let mut roles: Vec<Role> = Vec::new();
    for part in raw.split(',') {
        if let Ok(role) = part.trim().parse::<Role>() {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
    }
    roles
}

pub fn join_roles(roles: &[Role]) -> String {
    let mut seen: Vec<Role> = Vec::with_capacity(roles.len());
    for role in roles {
        if !seen.contains(role) {
            seen.push(*role);
        }
    }
    seen.iter().map(|r| r.as_ref()).collect::<Vec<_>>().join(",")
}
