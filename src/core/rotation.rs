//! Auction scheduling.
//!
//! A group gets at most one auction per calendar month and at most `duration_months`
//! auctions in total. Month numbers are handed out in creation order and never taken
//! from the caller.

use crate::{
    core::{
        context::AppContext,
        ledger::month_bounds,
        locks::LockKey,
        principal::{Principal, Role},
        scope::{self, Access},
    },
    entities::{Auction, Group, auction, group},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};

/// Auctions of a group ordered by date, ties broken by creation.
pub async fn auctions_by_date<C>(db: &C, group_id: i64) -> Result<Vec<auction::Model>>
where
    C: ConnectionTrait,
{
    Ok(Auction::find()
        .filter(auction::Column::GroupId.eq(group_id))
        .order_by_asc(auction::Column::AuctionDate)
        .order_by_asc(auction::Column::Id)
        .all(db)
        .await?)
}

fn check_in_window(group: &group::Model, date: NaiveDate) -> Result<()> {
    if group.contains(date) {
        Ok(())
    } else {
        Err(Error::AuctionDateOutOfRange {
            date,
            start: group.start_date,
            end: group.window_end(),
        })
    }
}

async fn check_month_free<C>(
    db: &C,
    group_id: i64,
    date: NaiveDate,
    exclude: Option<i64>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let (year, month) = (date.year(), date.month());
    let (first, last) = month_bounds(year, month)?;
    let mut query = Auction::find()
        .filter(auction::Column::GroupId.eq(group_id))
        .filter(auction::Column::AuctionDate.between(first, last));
    if let Some(id) = exclude {
        query = query.filter(auction::Column::Id.ne(id));
    }
    if query.count(db).await? > 0 {
        return Err(Error::DuplicateMonthAuction { year, month });
    }
    Ok(())
}

/// Schedules an auction for `group_id` on `auction_date`.
///
/// Checks run in order and the first failure wins: date inside the group window, no other
/// auction that calendar month, fewer auctions than `duration_months`. The new auction
/// gets `month_no = existing + 1`; `requested_month_no` is informational only.
pub async fn create_auction(
    ctx: &AppContext,
    principal: &Principal,
    group_id: i64,
    auction_date: NaiveDate,
    requested_month_no: Option<i32>,
) -> Result<auction::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "schedule auctions")?;
    scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Group(group_id)).await;
    let txn = ctx.database.begin().await?;

    let group = Group::find_by_id(group_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("group", group_id))?;

    check_in_window(&group, auction_date)?;
    check_month_free(&txn, group.id, auction_date, None).await?;

    let existing = Auction::find()
        .filter(auction::Column::GroupId.eq(group.id))
        .count(&txn)
        .await?;
    let existing = i32::try_from(existing).unwrap_or(i32::MAX);
    if existing >= group.duration_months {
        return Err(Error::AuctionLimitReached {
            duration_months: group.duration_months,
        });
    }

    let month_no = existing + 1;
    if requested_month_no.is_some_and(|requested| requested != month_no) {
        tracing::debug!(
            group_id,
            requested = ?requested_month_no,
            month_no,
            "Ignoring requested month number"
        );
    }

    let auction = auction::ActiveModel {
        group_id: Set(group.id),
        month_no: Set(month_no),
        auction_date: Set(auction_date),
        winner_id: Set(None),
        bid_amount: Set(None),
        closed_at: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!(
        auction_id = auction.id,
        group_id,
        month_no,
        date = %auction_date,
        "Auction scheduled"
    );
    Ok(auction)
}

/// Moves an auction to another date. The month number stays as it was, which is how
/// chronological position and `month_no` can drift apart.
pub async fn reschedule_auction(
    ctx: &AppContext,
    principal: &Principal,
    auction_id: i64,
    auction_date: NaiveDate,
) -> Result<auction::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "reschedule auctions")?;
    let (auction, group) =
        scope::auction_for(&ctx.database, principal, auction_id, Access::Manage).await?;
    if auction.is_closed() {
        return Err(Error::AuctionAlreadyClosed { auction_id });
    }

    let _guard = ctx.locks.lock(LockKey::Group(group.id)).await;
    let txn = ctx.database.begin().await?;

    let group = Group::find_by_id(group.id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("group", group.id))?;
    check_in_window(&group, auction_date)?;
    check_month_free(&txn, group.id, auction_date, Some(auction_id)).await?;

    let result = Auction::update_many()
        .col_expr(auction::Column::AuctionDate, Expr::value(auction_date))
        .filter(auction::Column::Id.eq(auction_id))
        .filter(auction::Column::ClosedAt.is_null())
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::AuctionAlreadyClosed { auction_id });
    }
    let updated = Auction::find_by_id(auction_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("auction", auction_id))?;
    txn.commit().await?;

    tracing::info!(auction_id, date = %auction_date, "Auction rescheduled");
    Ok(updated)
}

/// Auctions of a group the principal can read, by date.
pub async fn list_auctions(
    db: &DatabaseConnection,
    principal: &Principal,
    group_id: i64,
) -> Result<Vec<auction::Model>> {
    let group = scope::group_for(db, principal, group_id, Access::Read).await?;
    auctions_by_date(db, group.id).await
}

/// One cell of the month grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthSlot {
    /// Position in the grid, 1-based
    pub month_no: i32,
    pub auction: Option<auction::Model>,
}

/// An auction whose stored month number disagrees with its position in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthDivergence {
    pub auction_id: i64,
    pub position: i32,
    pub stored_month_no: i32,
}

/// Lays auctions ordered by date against months `1..=duration_months`. The Nth auction by
/// date lands in month N whatever its stored `month_no`.
#[must_use]
pub fn month_grid(duration_months: i32, auctions: Vec<auction::Model>) -> Vec<MonthSlot> {
    let mut auctions = auctions.into_iter();
    (1..=duration_months)
        .map(|month_no| MonthSlot {
            month_no,
            auction: auctions.next(),
        })
        .collect()
}

/// Slots whose auction carries a different `month_no` than its position.
#[must_use]
pub fn month_sequence_divergences(slots: &[MonthSlot]) -> Vec<MonthDivergence> {
    slots
        .iter()
        .filter_map(|slot| {
            let auction = slot.auction.as_ref()?;
            (auction.month_no != slot.month_no).then_some(MonthDivergence {
                auction_id: auction.id,
                position: slot.month_no,
                stored_month_no: auction.month_no,
            })
        })
        .collect()
}

/// The month grid of a group. Divergent month numbers are logged, not corrected.
pub async fn months_with_auctions(
    db: &DatabaseConnection,
    principal: &Principal,
    group_id: i64,
) -> Result<Vec<MonthSlot>> {
    let group = scope::group_for(db, principal, group_id, Access::Read).await?;
    let slots = month_grid(group.duration_months, auctions_by_date(db, group.id).await?);

    for divergence in month_sequence_divergences(&slots) {
        tracing::warn!(
            group_id,
            auction_id = divergence.auction_id,
            position = divergence.position,
            stored_month_no = divergence.stored_month_no,
            "Auction month number differs from its chronological position"
        );
    }
    Ok(slots)
}

/// Consistency check over a group's month grid.
pub async fn check_month_sequence(
    db: &DatabaseConnection,
    principal: &Principal,
    group_id: i64,
) -> Result<Vec<MonthDivergence>> {
    let group = scope::group_for(db, principal, group_id, Access::Read).await?;
    let slots = month_grid(group.duration_months, auctions_by_date(db, group.id).await?);
    Ok(month_sequence_divergences(&slots))
}
