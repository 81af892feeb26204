//! Group entity - one savings-group cycle.
//!
//! A group without a parent is a root group and is the only kind that can carry a
//! subscription; sub-groups point at their root. `total_amount` is always
//! `monthly_amount * duration_months` and is rewritten by every operation that touches
//! either factor.

use chrono::{Datelike, Months, NaiveDate};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Group database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chitti_groups")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    /// Short public code, `CH-XXXXXX`
    #[sea_orm(unique)]
    pub code: String,
    /// Account of the group admin that owns this group
    pub owner_id: i64,
    /// Root group this sub-group belongs to; `None` for root groups
    pub parent_id: Option<i64>,
    /// Monthly contribution in paise
    pub monthly_amount: i64,
    pub duration_months: i32,
    /// Derived: `monthly_amount * duration_months`, in paise
    pub total_amount: i64,
    pub start_date: Date,
    pub is_active: bool,
    /// Collector account assigned to this group
    pub collector_id: Option<i64>,
    /// Highest token number ever handed out in this group
    pub last_token_no: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

/// Where a group is in its rotation on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupStatus {
    /// Start date is in the future
    Upcoming,
    /// Inside the rotation window
    Running,
    /// Window has passed or the group was closed
    Completed,
}

impl Model {
    /// Whether this is a root group.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The root group id: the parent for sub-groups, itself otherwise.
    #[must_use]
    pub fn root_id(&self) -> i64 {
        self.parent_id.unwrap_or(self.id)
    }

    /// First day after the rotation window (`start_date + duration_months`).
    #[must_use]
    pub fn window_end(&self) -> NaiveDate {
        let months = u32::try_from(self.duration_months).unwrap_or(0);
        self.start_date
            .checked_add_months(Months::new(months))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Inclusive last day of the rotation window.
    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.window_end().pred_opt().unwrap_or(self.start_date)
    }

    /// Whether `date` falls inside `[start_date, window_end)`.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date < self.window_end()
    }

    /// 1-based rotation month that `date` falls in; zero or negative before the start.
    #[must_use]
    pub fn month_index(&self, date: NaiveDate) -> i32 {
        (date.year() - self.start_date.year()) * 12
            + (i32::try_from(date.month()).unwrap_or(0)
                - i32::try_from(self.start_date.month()).unwrap_or(0))
            + 1
    }

    /// Rotation month running on `today`, clamped to `0..=duration_months`.
    #[must_use]
    pub fn current_month(&self, today: NaiveDate) -> i32 {
        if today < self.start_date {
            return 0;
        }
        self.month_index(today).min(self.duration_months)
    }

    /// Lifecycle state of the group on `today`.
    #[must_use]
    pub fn status(&self, today: NaiveDate) -> GroupStatus {
        if !self.is_active {
            GroupStatus::Completed
        } else if today < self.start_date {
            GroupStatus::Upcoming
        } else if today <= self.end_date() {
            GroupStatus::Running
        } else {
            GroupStatus::Completed
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Sub-groups point at their root group
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentId",
        to = "Column::Id",
        on_delete = "Cascade"
    )]
    Parent,
    /// Owning group admin
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::OwnerId",
        to = "super::account::Column::Id",
        on_delete = "Cascade"
    )]
    Owner,
    /// One group has many memberships
    #[sea_orm(has_many = "super::membership::Entity")]
    Memberships,
    /// One group has many auctions
    #[sea_orm(has_many = "super::auction::Entity")]
    Auctions,
}

impl Related<super::membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Memberships.def()
    }
}

impl Related<super::auction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Auctions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
