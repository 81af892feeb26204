//! Winner selection.
//!
//! Closing an auction is a single conditional update on `closed_at IS NULL`, so even two
//! writers that both passed validation cannot both close it. The group lock on top makes
//! the loser of a race see the committed winner and fail with
//! [`Error::AuctionAlreadyClosed`].

use crate::{
    core::{
        context::AppContext,
        ledger::{MemberStatus, evaluate_status, total_paid},
        locks::LockKey,
        principal::{Principal, Role},
        scope::{self, Access},
    },
    entities::{Auction, Group, Membership, auction, group, membership},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rand::seq::SliceRandom;
use sea_orm::{QueryOrder, TransactionTrait, prelude::*, sea_query::Expr};
use std::collections::HashSet;

/// Memberships of the auction's group that have not won any auction of that group yet,
/// by token number. Fails on a closed auction.
pub async fn eligible_members_for<C>(db: &C, auction: &auction::Model) -> Result<Vec<membership::Model>>
where
    C: ConnectionTrait,
{
    if auction.is_closed() {
        return Err(Error::AuctionAlreadyClosed {
            auction_id: auction.id,
        });
    }

    let winners: HashSet<i64> = Auction::find()
        .filter(auction::Column::GroupId.eq(auction.group_id))
        .filter(auction::Column::WinnerId.is_not_null())
        .all(db)
        .await?
        .into_iter()
        .filter_map(|a| a.winner_id)
        .collect();

    let memberships = Membership::find()
        .filter(membership::Column::GroupId.eq(auction.group_id))
        .order_by_asc(membership::Column::TokenNo)
        .all(db)
        .await?;
    Ok(memberships
        .into_iter()
        .filter(|m| !winners.contains(&m.id))
        .collect())
}

/// Eligible memberships of an auction the principal can read.
pub async fn eligible_members(
    db: &DatabaseConnection,
    principal: &Principal,
    auction_id: i64,
) -> Result<Vec<membership::Model>> {
    let (auction, _) = scope::auction_for(db, principal, auction_id, Access::Read).await?;
    eligible_members_for(db, &auction).await
}

/// Validates and closes the auction inside an open transaction. Nothing is written unless
/// every precondition holds.
pub async fn assign_winner_in<C>(
    db: &C,
    auction_id: i64,
    membership_id: i64,
    bid_amount: Option<i64>,
    today: NaiveDate,
) -> Result<auction::Model>
where
    C: ConnectionTrait,
{
    if bid_amount.is_some_and(|bid| bid < 0) {
        return Err(Error::validation("bid_amount", "cannot be negative"));
    }
    let auction = Auction::find_by_id(auction_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("auction", auction_id))?;
    if auction.is_closed() {
        return Err(Error::AuctionAlreadyClosed { auction_id });
    }

    let membership = Membership::find_by_id(membership_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))?;
    if membership.group_id != auction.group_id {
        return Err(Error::WrongGroup {
            membership_id,
            group_id: auction.group_id,
        });
    }
    let group = Group::find_by_id(auction.group_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("group", auction.group_id))?;

    let status = evaluate_status(
        membership.has_left,
        total_paid(db, membership.id).await?,
        &group,
        today,
    );
    if !status.can_win() {
        return Err(Error::IneligibleMember {
            membership_id,
            status: status.to_string(),
        });
    }
    let already_won = Auction::find()
        .filter(auction::Column::GroupId.eq(auction.group_id))
        .filter(auction::Column::WinnerId.eq(membership_id))
        .count(db)
        .await?
        > 0;
    if already_won {
        return Err(Error::IneligibleMember {
            membership_id,
            status: "already won".to_string(),
        });
    }

    let mut update = Auction::update_many()
        .col_expr(auction::Column::WinnerId, Expr::value(membership_id))
        .col_expr(auction::Column::ClosedAt, Expr::value(Utc::now()));
    if let Some(bid) = bid_amount {
        update = update.col_expr(auction::Column::BidAmount, Expr::value(bid));
    }
    let result = update
        .filter(auction::Column::Id.eq(auction_id))
        .filter(auction::Column::ClosedAt.is_null())
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::AuctionAlreadyClosed { auction_id });
    }

    Auction::find_by_id(auction_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("auction", auction_id))
}

/// Assigns `membership_id` as the winner of `auction_id` and closes it.
pub async fn assign_winner(
    ctx: &AppContext,
    principal: &Principal,
    auction_id: i64,
    membership_id: i64,
    bid_amount: Option<i64>,
    today: NaiveDate,
) -> Result<auction::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "assign winners")?;
    let (auction, _) =
        scope::auction_for(&ctx.database, principal, auction_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Group(auction.group_id)).await;
    let txn = ctx.database.begin().await?;
    let closed = assign_winner_in(&txn, auction_id, membership_id, bid_amount, today).await?;
    txn.commit().await?;

    tracing::info!(auction_id, membership_id, "Auction closed");
    Ok(closed)
}

/// Result of a random draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpinOutcome {
    pub auction: auction::Model,
    pub winner: membership::Model,
    /// How many memberships were in the draw
    pub candidates: usize,
}

async fn drawable<C>(
    db: &C,
    auction: &auction::Model,
    group: &group::Model,
    today: NaiveDate,
) -> Result<Vec<membership::Model>>
where
    C: ConnectionTrait,
{
    let mut candidates = Vec::new();
    for membership in eligible_members_for(db, auction).await? {
        let paid = total_paid(db, membership.id).await?;
        let status: MemberStatus = evaluate_status(membership.has_left, paid, group, today);
        if status.can_win() {
            candidates.push(membership);
        }
    }
    Ok(candidates)
}

/// Draws a winner and closes the auction. Draw and close run under one lock and one
/// transaction.
///
/// The draw pool is narrower than [`eligible_members`]: prior winners are excluded as
/// there, and members who are Defaulted or Left on `today` are dropped as well, since
/// [`assign_winner`] would refuse them. The pick is uniform over what remains, and an
/// empty pool fails with [`Error::NoEligibleMembers`] even when `eligible_members` is
/// not empty. [`SpinOutcome::candidates`] reports the pool size.
pub async fn spin(
    ctx: &AppContext,
    principal: &Principal,
    auction_id: i64,
    today: NaiveDate,
) -> Result<SpinOutcome> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "spin auctions")?;
    let (auction, _) =
        scope::auction_for(&ctx.database, principal, auction_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Group(auction.group_id)).await;
    let txn = ctx.database.begin().await?;

    let auction = Auction::find_by_id(auction_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("auction", auction_id))?;
    let group = Group::find_by_id(auction.group_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("group", auction.group_id))?;

    let candidates = drawable(&txn, &auction, &group, today).await?;
    let winner = {
        let mut rng = rand::thread_rng();
        candidates.choose(&mut rng).cloned()
    };
    let Some(winner) = winner else {
        return Err(Error::NoEligibleMembers { auction_id });
    };

    let closed = assign_winner_in(&txn, auction_id, winner.id, None, today).await?;
    txn.commit().await?;

    tracing::info!(
        auction_id,
        membership_id = winner.id,
        candidates = candidates.len(),
        "Auction closed by draw"
    );
    Ok(SpinOutcome {
        auction: closed,
        winner,
        candidates: candidates.len(),
    })
}
