//! Member entity - the person behind one or more memberships.
//!
//! The member's login account is created at enrollment with a generated credential.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Member identity database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "members")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    /// Phone number, also used as the login username
    #[sea_orm(unique)]
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    /// Login account issued at enrollment
    pub account_id: Option<i64>,
    /// Group admin whose tenancy this member belongs to
    pub owner_id: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id",
        on_delete = "SetNull"
    )]
    Account,
    /// One member can hold memberships in several groups
    #[sea_orm(has_many = "super::membership::Entity")]
    Memberships,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
