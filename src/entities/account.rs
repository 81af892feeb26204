//! Account entity - a login identity and its role on the platform.
//!
//! Group admins own groups, collectors record payments for the groups assigned to them,
//! members read their own rotation, and platform admins oversee everyone else.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role resolved once at the boundary and carried by every core call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform administrator
    #[sea_orm(string_value = "admin")]
    Admin,
    /// Owner of one root group and its sub-groups
    #[sea_orm(string_value = "group_admin")]
    GroupAdmin,
    /// Staff collecting monthly payments
    #[sea_orm(string_value = "collector")]
    Collector,
    /// Enrolled saver
    #[sea_orm(string_value = "member")]
    Member,
}

/// Account database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name, unique across the platform
    #[sea_orm(unique)]
    pub username: String,
    pub role: Role,
    /// Blocked accounts are rejected when the principal is resolved
    pub is_blocked: bool,
    /// bcrypt hash of the login credential, if one was issued
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
