//! Group subscription entity - the plan attached to a root group.
//!
//! Sub-groups never carry a row here; they resolve their root's subscription by lookup.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Group subscription database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "group_subscriptions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Root group, at most one subscription each
    #[sea_orm(unique)]
    pub group_id: i64,
    pub plan_id: i64,
    pub start_date: Option<DateTimeUtc>,
    /// `None` means no expiry
    pub end_date: Option<DateTimeUtc>,
    pub is_active: bool,
    /// Gateway order awaiting confirmation
    pub pending_order_id: Option<String>,
    /// Plan the pending order pays for
    pub pending_plan_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id",
        on_delete = "Cascade"
    )]
    Group,
    #[sea_orm(
        belongs_to = "super::subscription_plan::Entity",
        from = "Column::PlanId",
        to = "super::subscription_plan::Column::Id"
    )]
    Plan,
}

impl Related<super::subscription_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
