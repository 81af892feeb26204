//! Ownership scoping.
//!
//! Every entry point resolves its target record through this module, so the tenancy rule
//! lives in one place. A record the principal may not touch is reported exactly like a
//! missing one.

use crate::{
    core::principal::{Principal, Role},
    entities::{Auction, Group, Member, Membership, Payment, auction, group, member, membership, payment},
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, prelude::*};

/// What the caller intends to do with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Look only
    Read,
    /// Record payments against it
    Collect,
    /// Change the group, its members or its auctions
    Manage,
}

/// Member profile ids linked to the principal's login account.
async fn linked_member_ids<C>(db: &C, principal: &Principal) -> Result<Vec<i64>>
where
    C: ConnectionTrait,
{
    let members = Member::find()
        .filter(member::Column::AccountId.eq(principal.account_id))
        .all(db)
        .await?;
    Ok(members.into_iter().map(|m| m.id).collect())
}

/// Whether `principal` may perform `access` on `group`.
pub async fn allows<C>(
    db: &C,
    principal: &Principal,
    group: &group::Model,
    access: Access,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let allowed = match principal.role {
        Role::Admin => true,
        Role::GroupAdmin => group.owner_id == principal.account_id,
        Role::Collector => {
            access != Access::Manage && group.collector_id == Some(principal.account_id)
        }
        Role::Member => {
            if access != Access::Read {
                return Ok(false);
            }
            let member_ids = linked_member_ids(db, principal).await?;
            !member_ids.is_empty()
                && Membership::find()
                    .filter(membership::Column::GroupId.eq(group.id))
                    .filter(membership::Column::MemberId.is_in(member_ids))
                    .count(db)
                    .await?
                    > 0
        }
    };
    Ok(allowed)
}

/// Loads a group the principal may access.
pub async fn group_for<C>(
    db: &C,
    principal: &Principal,
    group_id: i64,
    access: Access,
) -> Result<group::Model>
where
    C: ConnectionTrait,
{
    let group = Group::find_by_id(group_id).one(db).await?;
    match group {
        Some(group) if allows(db, principal, &group, access).await? => Ok(group),
        _ => Err(Error::not_found("group", group_id)),
    }
}

/// All groups the principal can see, oldest first.
pub async fn visible_groups<C>(db: &C, principal: &Principal) -> Result<Vec<group::Model>>
where
    C: ConnectionTrait,
{
    let query = Group::find().order_by_asc(group::Column::Id);
    let groups = match principal.role {
        Role::Admin => query.all(db).await?,
        Role::GroupAdmin => {
            query
                .filter(group::Column::OwnerId.eq(principal.account_id))
                .all(db)
                .await?
        }
        Role::Collector => {
            query
                .filter(group::Column::CollectorId.eq(principal.account_id))
                .all(db)
                .await?
        }
        Role::Member => {
            let member_ids = linked_member_ids(db, principal).await?;
            if member_ids.is_empty() {
                return Ok(Vec::new());
            }
            let group_ids: Vec<i64> = Membership::find()
                .filter(membership::Column::MemberId.is_in(member_ids))
                .all(db)
                .await?
                .into_iter()
                .map(|m| m.group_id)
                .collect();
            query
                .filter(group::Column::Id.is_in(group_ids))
                .all(db)
                .await?
        }
    };
    Ok(groups)
}

/// Loads a membership and its group. Members may only read their own memberships.
pub async fn membership_for<C>(
    db: &C,
    principal: &Principal,
    membership_id: i64,
    access: Access,
) -> Result<(membership::Model, group::Model)>
where
    C: ConnectionTrait,
{
    let missing = || Error::not_found("membership", membership_id);
    let membership = Membership::find_by_id(membership_id)
        .one(db)
        .await?
        .ok_or_else(missing)?;
    let group = Group::find_by_id(membership.group_id)
        .one(db)
        .await?
        .ok_or_else(missing)?;

    let allowed = if principal.role == Role::Member {
        access == Access::Read
            && linked_member_ids(db, principal)
                .await?
                .contains(&membership.member_id)
    } else {
        allows(db, principal, &group, access).await?
    };

    if allowed {
        Ok((membership, group))
    } else {
        Err(missing())
    }
}

/// Loads an auction and its group.
pub async fn auction_for<C>(
    db: &C,
    principal: &Principal,
    auction_id: i64,
    access: Access,
) -> Result<(auction::Model, group::Model)>
where
    C: ConnectionTrait,
{
    let missing = || Error::not_found("auction", auction_id);
    let auction = Auction::find_by_id(auction_id)
        .one(db)
        .await?
        .ok_or_else(missing)?;
    let group = Group::find_by_id(auction.group_id)
        .one(db)
        .await?
        .ok_or_else(missing)?;

    if allows(db, principal, &group, access).await? {
        Ok((auction, group))
    } else {
        Err(missing())
    }
}

/// Loads a payment and its group. Subscription payments are visible to the group's
/// owner and platform admins only.
pub async fn payment_for<C>(
    db: &C,
    principal: &Principal,
    payment_id: i64,
    access: Access,
) -> Result<(payment::Model, group::Model)>
where
    C: ConnectionTrait,
{
    let missing = || Error::not_found("payment", payment_id);
    let payment = Payment::find_by_id(payment_id)
        .one(db)
        .await?
        .ok_or_else(missing)?;

    let group = match payment.membership_id {
        Some(membership_id) => {
            match membership_for(db, principal, membership_id, access).await {
                Ok((_, group)) => group,
                Err(Error::NotFound { .. }) => return Err(missing()),
                Err(e) => return Err(e),
            }
        }
        None => {
            if !matches!(principal.role, Role::Admin | Role::GroupAdmin) {
                return Err(missing());
            }
            let group = Group::find_by_id(payment.group_id)
                .one(db)
                .await?
                .ok_or_else(missing)?;
            if !allows(db, principal, &group, access).await? {
                return Err(missing());
            }
            group
        }
    };
    Ok((payment, group))
}
