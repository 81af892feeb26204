//! Auction entity - one monthly payout event of a group.
//!
//! An auction is Scheduled until a winner is assigned and Closed afterwards. The closure
//! is recorded in `closed_at`, so removing the winning membership (which clears
//! `winner_id`) does not reopen the auction.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Auction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auctions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub group_id: i64,
    /// 1-based sequence number, unique within the group
    pub month_no: i32,
    pub auction_date: Date,
    /// Winning membership; cleared if that membership is removed
    pub winner_id: Option<i64>,
    /// Winning bid in paise
    pub bid_amount: Option<i64>,
    /// Set exactly once, together with the winner
    pub closed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

/// Auction state machine. There is no way back from `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionState {
    Scheduled,
    Closed,
}

impl Model {
    #[must_use]
    pub const fn state(&self) -> AuctionState {
        if self.closed_at.is_some() {
            AuctionState::Closed
        } else {
            AuctionState::Scheduled
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
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
        belongs_to = "super::membership::Entity",
        from = "Column::WinnerId",
        to = "super::membership::Column::Id",
        on_delete = "SetNull"
    )]
    Winner,
}

impl Related<super::group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
