//! Subscription plan entity - the static catalog of plans and their quotas.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription plan database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscription_plans")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(unique)]
    pub name: String,
    /// Price in paise
    pub price: i64,
    pub duration_days: i32,
    /// Ceiling on memberships per group
    pub max_members: i32,
    /// Ceiling on groups per owner, root included
    pub max_groups: i32,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
