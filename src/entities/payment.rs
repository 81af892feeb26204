//! Payment entity - the append-only ledger of money received.
//!
//! Member contributions reference a membership. Subscription-funding payments reference
//! only the root group and carry the plan and the period they paid for.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How the money arrived.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "cash")]
    Cash,
    #[sea_orm(string_value = "upi")]
    Upi,
    #[sea_orm(string_value = "bank")]
    Bank,
    /// Settled through the online payment gateway
    #[sea_orm(string_value = "gateway")]
    Gateway,
}

/// Outcome of the payment. Only `Success` counts towards balances and the monthly rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "pending")]
    Pending,
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Paying membership; `None` for subscription payments
    pub membership_id: Option<i64>,
    pub group_id: i64,
    /// Staff account that recorded the payment
    pub collector_id: Option<i64>,
    /// Amount in paise
    pub amount: i64,
    pub paid_date: Date,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Plan funded by this payment, for subscription payments only
    pub subscription_plan_id: Option<i64>,
    pub subscription_start: Option<Date>,
    pub subscription_end: Option<Date>,
    #[sea_orm(unique)]
    pub transaction_id: String,
    #[sea_orm(unique)]
    pub invoice_number: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::membership::Entity",
        from = "Column::MembershipId",
        to = "super::membership::Column::Id",
        on_delete = "Cascade"
    )]
    Membership,
    #[sea_orm(
        belongs_to = "super::group::Entity",
        from = "Column::GroupId",
        to = "super::group::Column::Id"
    )]
    Group,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Membership.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
