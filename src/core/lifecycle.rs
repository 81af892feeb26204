//! Group lifecycle: creating, editing, closing and deleting groups, and enrolling and
//! removing members.
//!
//! Creation is gated by the subscription quotas. Group creation serialises on the owner,
//! enrollment on the group, so two concurrent requests cannot both pass the count check.

use crate::{
    core::{
        accounts,
        context::AppContext,
        locks::LockKey,
        notify::{Delivery, Notification},
        principal::{Principal, Role},
        rotation,
        scope::{self, Access},
        subscription,
    },
    entities::{
        Account, Auction, Group, GroupSubscription, Member, Membership, Payment, auction, group,
        group_subscription, member, membership, payment,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use rand::{Rng, distributions::Alphanumeric};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use uuid::Uuid;

const CODE_ATTEMPTS: usize = 5;

/// Input for a new group.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub name: String,
    /// Paise
    pub monthly_amount: i64,
    pub duration_months: i32,
    pub start_date: NaiveDate,
}

fn validate_terms(monthly_amount: i64, duration_months: i32) -> Result<i64> {
    if monthly_amount <= 0 {
        return Err(Error::validation("monthly_amount", "must be positive"));
    }
    if duration_months <= 0 {
        return Err(Error::validation("duration_months", "must be at least one month"));
    }
    monthly_amount
        .checked_mul(i64::from(duration_months))
        .ok_or_else(|| Error::validation("monthly_amount", "total amount is too large"))
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("name", "cannot be empty"));
    }
    Ok(name.to_string())
}

async fn unused_group_code<C>(db: &C) -> Result<String>
where
    C: ConnectionTrait,
{
    for _ in 0..CODE_ATTEMPTS {
        let code = format!(
            "CH-{}",
            Uuid::new_v4().simple().to_string()[..6].to_uppercase()
        );
        let taken = Group::find()
            .filter(group::Column::Code.eq(code.as_str()))
            .count(db)
            .await?
            > 0;
        if !taken {
            return Ok(code);
        }
    }
    Err(Error::validation("code", "could not generate a unique group code"))
}

/// Creates a group for the calling group admin.
///
/// The owner's first group becomes their root group and needs no subscription. Every
/// later group is a child of that root and must pass the group quota.
pub async fn create_group(
    ctx: &AppContext,
    principal: &Principal,
    new: NewGroup,
    now: DateTime<Utc>,
) -> Result<group::Model> {
    principal.require(&[Role::GroupAdmin], "create groups")?;
    let name = validate_name(&new.name)?;
    let total_amount = validate_terms(new.monthly_amount, new.duration_months)?;
    let owner_id = principal.account_id;

    let _guard = ctx.locks.lock(LockKey::Owner(owner_id)).await;
    let txn = ctx.database.begin().await?;

    let parent_id = match subscription::root_group_of(&txn, owner_id).await? {
        Some(root) => {
            subscription::check_group_quota(&txn, owner_id, now).await?;
            Some(root.id)
        }
        None => None,
    };

    let group = group::ActiveModel {
        name: Set(name),
        code: Set(unused_group_code(&txn).await?),
        owner_id: Set(owner_id),
        parent_id: Set(parent_id),
        monthly_amount: Set(new.monthly_amount),
        duration_months: Set(new.duration_months),
        total_amount: Set(total_amount),
        start_date: Set(new.start_date),
        is_active: Set(true),
        collector_id: Set(None),
        last_token_no: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!(
        group_id = group.id,
        owner_id,
        code = %group.code,
        root = group.is_root(),
        "Group created"
    );
    Ok(group)
}

/// Group fields an edit may change. `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub monthly_amount: Option<i64>,
    pub duration_months: Option<i32>,
    pub start_date: Option<NaiveDate>,
}

/// Edits a group and recomputes `total_amount`. The duration may not drop below the
/// number of auctions already scheduled, and every scheduled auction must stay inside the
/// edited window.
pub async fn update_group(
    ctx: &AppContext,
    principal: &Principal,
    group_id: i64,
    update: GroupUpdate,
) -> Result<group::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "edit groups")?;
    scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Group(group_id)).await;
    let txn = ctx.database.begin().await?;

    let existing = Group::find_by_id(group_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("group", group_id))?;
    let monthly_amount = update.monthly_amount.unwrap_or(existing.monthly_amount);
    let duration_months = update.duration_months.unwrap_or(existing.duration_months);
    let start_date = update.start_date.unwrap_or(existing.start_date);
    let total_amount = validate_terms(monthly_amount, duration_months)?;

    let auctions = rotation::auctions_by_date(&txn, group_id).await?;
    if usize::try_from(duration_months).unwrap_or(0) < auctions.len() {
        return Err(Error::validation(
            "duration_months",
            format!("group already has {} auctions", auctions.len()),
        ));
    }
    let window = group::Model {
        start_date,
        duration_months,
        ..existing.clone()
    };
    if let Some(outside) = auctions.iter().find(|a| !window.contains(a.auction_date)) {
        let field = if start_date == existing.start_date {
            "duration_months"
        } else {
            "start_date"
        };
        return Err(Error::validation(
            field,
            format!(
                "auction {} on {} would fall outside {} .. {}",
                outside.id,
                outside.auction_date,
                window.start_date,
                window.window_end()
            ),
        ));
    }

    let mut active: group::ActiveModel = existing.into();
    if let Some(name) = update.name {
        active.name = Set(validate_name(&name)?);
    }
    active.start_date = Set(start_date);
    active.monthly_amount = Set(monthly_amount);
    active.duration_months = Set(duration_months);
    active.total_amount = Set(total_amount);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(group_id, total_amount, "Group updated");
    Ok(updated)
}

/// Closes a running group early: the duration is cut to the months elapsed by `today`
/// (at least one, and never short of the auctions already scheduled) and the group is
/// deactivated. A group already past its end date is left as it is.
pub async fn close_group(
    ctx: &AppContext,
    principal: &Principal,
    group_id: i64,
    today: NaiveDate,
) -> Result<group::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "close groups")?;
    scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Group(group_id)).await;
    let txn = ctx.database.begin().await?;

    let existing = Group::find_by_id(group_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("group", group_id))?;
    if today >= existing.end_date() {
        return Ok(existing);
    }

    let auctions = rotation::auctions_by_date(&txn, group_id).await?;
    let latest = auctions
        .last()
        .map_or(0, |a| existing.month_index(a.auction_date));
    let duration_months = existing
        .month_index(today)
        .max(i32::try_from(auctions.len()).unwrap_or(i32::MAX))
        .max(latest)
        .max(1);
    let total_amount = validate_terms(existing.monthly_amount, duration_months)?;

    let mut active: group::ActiveModel = existing.into();
    active.duration_months = Set(duration_months);
    active.total_amount = Set(total_amount);
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now());
    let closed = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(group_id, duration_months, "Group closed");
    Ok(closed)
}

/// Deletes a group with no payment history. A root group that still has children cannot
/// be deleted.
pub async fn delete_group(ctx: &AppContext, principal: &Principal, group_id: i64) -> Result<()> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "delete groups")?;
    let group = scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Owner(group.owner_id)).await;
    let txn = ctx.database.begin().await?;

    let payments = Payment::find()
        .filter(payment::Column::GroupId.eq(group_id))
        .count(&txn)
        .await?;
    if payments > 0 {
        return Err(Error::GroupHasPaymentHistory { group_id });
    }
    let children = Group::find()
        .filter(group::Column::ParentId.eq(group_id))
        .count(&txn)
        .await?;
    if children > 0 {
        return Err(Error::validation(
            "group_id",
            "delete the sub-groups of this group first",
        ));
    }

    Auction::delete_many()
        .filter(auction::Column::GroupId.eq(group_id))
        .exec(&txn)
        .await?;
    Membership::delete_many()
        .filter(membership::Column::GroupId.eq(group_id))
        .exec(&txn)
        .await?;
    GroupSubscription::delete_many()
        .filter(group_subscription::Column::GroupId.eq(group_id))
        .exec(&txn)
        .await?;
    Group::delete_by_id(group_id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(group_id, "Group deleted");
    Ok(())
}

/// Assigns (or with `None`, clears) the collector of a group.
pub async fn assign_collector(
    ctx: &AppContext,
    principal: &Principal,
    group_id: i64,
    collector_id: Option<i64>,
) -> Result<group::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "assign collectors")?;
    let group = scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;

    if let Some(collector_id) = collector_id {
        let collector = Account::find_by_id(collector_id)
            .one(&ctx.database)
            .await?
            .ok_or_else(|| Error::not_found("account", collector_id))?;
        if collector.role != Role::Collector || collector.is_blocked {
            return Err(Error::validation(
                "collector_id",
                "account is not an active collector",
            ));
        }
    }

    let _guard = ctx.locks.lock(LockKey::Group(group_id)).await;
    let mut active: group::ActiveModel = group.into();
    active.collector_id = Set(collector_id);
    active.updated_at = Set(Utc::now());
    let updated = active.update(&ctx.database).await?;

    tracing::info!(group_id, collector_id = ?collector_id, "Collector assigned");
    Ok(updated)
}

/// Identity details of a member being enrolled.
#[derive(Debug, Clone)]
pub struct MemberDetails {
    pub name: String,
    /// Also the member's login username
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl MemberDetails {
    fn validated(self) -> Result<Self> {
        let name = validate_name(&self.name)?;
        let phone = self.phone.trim().to_string();
        let digits = phone.strip_prefix('+').unwrap_or(&phone);
        if digits.len() < 7 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::validation("phone", "must be a phone number"));
        }
        let email = self
            .email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(Error::validation("email", "must be an email address"));
        }
        Ok(Self {
            name,
            phone,
            email,
            address: self.address.filter(|a| !a.trim().is_empty()),
        })
    }
}

/// Random alphanumeric one-time password.
#[must_use]
pub fn generate_credential(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// A completed enrollment. `credential` is the plain one-time password; only its hash is
/// stored.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub member: member::Model,
    pub membership: membership::Model,
    pub credential: String,
    /// Whether the credential notification was queued; `Dropped` means resend manually
    pub delivery: Delivery,
}

/// Enrolls a new member into a group.
///
/// Fails with [`Error::MemberLimitReached`] or [`Error::NoActiveSubscription`] when the
/// quota does not allow another member. The new membership gets the next token number,
/// which is never reused even if higher tokens were removed.
pub async fn enroll_member(
    ctx: &AppContext,
    principal: &Principal,
    group_id: i64,
    details: MemberDetails,
    now: DateTime<Utc>,
) -> Result<Enrollment> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "enroll members")?;
    let details = details.validated()?;
    scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;

    let credential = generate_credential(ctx.settings.credential_length);
    let password_hash = bcrypt::hash(&credential, ctx.settings.password_hash_cost)?;

    let _guard = ctx.locks.lock(LockKey::Group(group_id)).await;
    let txn = ctx.database.begin().await?;

    let group = Group::find_by_id(group_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("group", group_id))?;
    subscription::check_member_quota(&txn, &group, now).await?;

    let phone_taken = Member::find()
        .filter(member::Column::Phone.eq(details.phone.as_str()))
        .count(&txn)
        .await?
        > 0;
    if phone_taken {
        return Err(Error::validation("phone", "a member with this phone already exists"));
    }

    let account = accounts::register_account_with_hash(
        &txn,
        &details.phone,
        Role::Member,
        Some(password_hash),
    )
    .await?;
    let member = member::ActiveModel {
        name: Set(details.name),
        phone: Set(details.phone),
        email: Set(details.email),
        address: Set(details.address),
        account_id: Set(Some(account.id)),
        owner_id: Set(group.owner_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let highest = Membership::find()
        .filter(membership::Column::GroupId.eq(group.id))
        .order_by_desc(membership::Column::TokenNo)
        .one(&txn)
        .await?
        .map_or(0, |m| m.token_no);
    let token_no = group.last_token_no.max(highest) + 1;

    let membership = membership::ActiveModel {
        group_id: Set(group.id),
        member_id: Set(member.id),
        token_no: Set(token_no),
        has_left: Set(false),
        joined_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mut counter: group::ActiveModel = group.into();
    counter.last_token_no = Set(token_no);
    counter.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(
        group_id,
        membership_id = membership.id,
        token_no,
        "Member enrolled"
    );

    let delivery = ctx.outbox.emit(Notification::MemberCredentials {
        recipient: member.email.clone().unwrap_or_else(|| member.phone.clone()),
        member_name: member.name.clone(),
        username: account.username,
        credential: credential.clone(),
    });
    if delivery == Delivery::Dropped {
        tracing::warn!(
            membership_id = membership.id,
            "Credential notification not queued, resend manually"
        );
    }

    Ok(Enrollment {
        member,
        membership,
        credential,
        delivery,
    })
}

/// Removes a membership and its payments. Auctions it won keep their closed state with no
/// winner; remaining token numbers are not renumbered.
pub async fn remove_member(ctx: &AppContext, principal: &Principal, membership_id: i64) -> Result<()> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "remove members")?;
    let (membership, group) =
        scope::membership_for(&ctx.database, principal, membership_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Group(group.id)).await;
    // Payment writes serialise on the membership key
    let _membership_guard = ctx.locks.lock(LockKey::Membership(membership.id)).await;
    let txn = ctx.database.begin().await?;

    Auction::update_many()
        .col_expr(auction::Column::WinnerId, Expr::value(Option::<i64>::None))
        .filter(auction::Column::WinnerId.eq(membership.id))
        .exec(&txn)
        .await?;
    Payment::delete_many()
        .filter(payment::Column::MembershipId.eq(membership.id))
        .exec(&txn)
        .await?;
    Membership::delete_by_id(membership.id).exec(&txn).await?;
    txn.commit().await?;

    tracing::info!(group_id = group.id, membership_id, token_no = membership.token_no, "Member removed");
    Ok(())
}

async fn set_left(
    ctx: &AppContext,
    principal: &Principal,
    membership_id: i64,
    has_left: bool,
) -> Result<membership::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "change member standing")?;
    let (membership, group) =
        scope::membership_for(&ctx.database, principal, membership_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Group(group.id)).await;
    let mut active: membership::ActiveModel = membership.into();
    active.has_left = Set(has_left);
    let updated = active.update(&ctx.database).await?;

    tracing::info!(membership_id, has_left, "Member standing changed");
    Ok(updated)
}

/// Flags a membership as Left. Left members cannot win.
pub async fn mark_member_left(
    ctx: &AppContext,
    principal: &Principal,
    membership_id: i64,
) -> Result<membership::Model> {
    set_left(ctx, principal, membership_id, true).await
}

/// Clears the Left flag.
pub async fn reinstate_member(
    ctx: &AppContext,
    principal: &Principal,
    membership_id: i64,
) -> Result<membership::Model> {
    set_left(ctx, principal, membership_id, false).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        ledger::{self, NewPayment},
        rotation, winner,
    };
    use crate::entities::payment::PaymentMethod;
    use crate::test_utils::{create_account, day, details, enroll, owner_with_group, test_context};
    use chrono::Months;

    #[test]
    fn test_credentials_are_random_alphanumerics() {
        let a = generate_credential(12);
        let b = generate_credential(12);
        assert_eq!(a.len(), 12);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_member_details_validation() {
        let ok = details(" Asha ", " +919000000001 ").validated().unwrap();
        assert_eq!(ok.name, "Asha");
        assert_eq!(ok.phone, "+919000000001");

        assert!(details("Asha", "12ab").validated().is_err());
        let mut bad_email = details("Asha", "9000000001");
        bad_email.email = Some("nope".to_string());
        assert!(matches!(
            bad_email.validated(),
            Err(Error::Validation { field: "email", .. })
        ));
    }

    #[tokio::test]
    async fn test_root_group_total_and_code() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 5).await?;
        let root = &tenant.root;
        assert!(root.is_root());
        assert_eq!(root.total_amount, root.monthly_amount * i64::from(root.duration_months));
        assert_eq!(root.code.len(), 9);
        assert!(root.code.starts_with("CH-"));

        let overflow = create_group(
            &ctx,
            &tenant.owner,
            NewGroup {
                name: "huge".to_string(),
                monthly_amount: i64::MAX,
                duration_months: 2,
                start_date: root.start_date,
            },
            Utc::now(),
        )
        .await;
        assert!(matches!(overflow, Err(Error::Validation { .. })));

        let collector = create_account(&ctx.database, "collector", Role::Collector).await?;
        assert!(matches!(
            create_group(
                &ctx,
                &collector,
                NewGroup {
                    name: "nope".to_string(),
                    monthly_amount: 1,
                    duration_months: 1,
                    start_date: root.start_date,
                },
                Utc::now(),
            )
            .await,
            Err(Error::PermissionDenied { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_tokens_are_never_reused() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let a = enroll(&ctx, &tenant, "A", "9000000001").await?.membership;
        let b = enroll(&ctx, &tenant, "B", "9000000002").await?.membership;
        let c = enroll(&ctx, &tenant, "C", "9000000003").await?.membership;
        assert_eq!((a.token_no, b.token_no, c.token_no), (1, 2, 3));

        remove_member(&ctx, &tenant.owner, b.id).await?;
        let d = enroll(&ctx, &tenant, "D", "9000000004").await?.membership;
        assert_eq!(d.token_no, 4);

        // Removing the highest token does not free it either
        remove_member(&ctx, &tenant.owner, d.id).await?;
        let e = enroll(&ctx, &tenant, "E", "9000000005").await?.membership;
        assert_eq!(e.token_no, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_member_quota() -> Result<()> {
        let (ctx, mut rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 2).await?;
        let first = enroll(&ctx, &tenant, "A", "9000000001").await?;

        let duplicate_phone = enroll(&ctx, &tenant, "A again", "9000000001").await;
        assert!(matches!(
            duplicate_phone,
            Err(Error::Validation { field: "phone", .. })
        ));

        enroll(&ctx, &tenant, "B", "9000000002").await?;
        let over = enroll(&ctx, &tenant, "C", "9000000003").await;
        assert!(matches!(over, Err(Error::MemberLimitReached { max_members: 2 })));

        // Credentials went to the outbox and the stored hash matches
        let queued = rx.recv().await.unwrap();
        assert!(matches!(
            queued,
            Notification::MemberCredentials { ref credential, .. } if *credential == first.credential
        ));
        assert_eq!(first.delivery, Delivery::Queued);
        let account = Account::find_by_id(first.member.account_id.unwrap())
            .one(&ctx.database)
            .await?
            .unwrap();
        assert_eq!(account.username, "9000000001");
        assert!(bcrypt::verify(&first.credential, account.password_hash.as_deref().unwrap())?);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_enrollment_respects_quota() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 1).await?;

        let (a, b) = tokio::join!(
            enroll(&ctx, &tenant, "A", "9000000001"),
            enroll(&ctx, &tenant, "B", "9000000002"),
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(Error::MemberLimitReached { .. })))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_child_groups_respect_quota() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let child = |name: &str| NewGroup {
            name: name.to_string(),
            monthly_amount: 10_000,
            duration_months: 3,
            start_date: tenant.root.start_date,
        };

        let (a, b) = tokio::join!(
            create_group(&ctx, &tenant.owner, child("one"), Utc::now()),
            create_group(&ctx, &tenant.owner, child("two"), Utc::now()),
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(Error::GroupLimitReached { .. })))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_removed_winner_leaves_auction_closed() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let a = enroll(&ctx, &tenant, "A", "9000000001").await?.membership;
        let auction = rotation::create_auction(
            &ctx,
            &tenant.owner,
            tenant.root.id,
            tenant.root.start_date,
            None,
        )
        .await?;
        let today = Utc::now().date_naive();
        winner::assign_winner(&ctx, &tenant.owner, auction.id, a.id, None, today).await?;

        remove_member(&ctx, &tenant.owner, a.id).await?;
        let reread = Auction::find_by_id(auction.id)
            .one(&ctx.database)
            .await?
            .unwrap();
        assert_eq!(reread.winner_id, None);
        assert!(reread.is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_close_recompute_total() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 3, 10).await?;
        let group = create_group(
            &ctx,
            &tenant.owner,
            NewGroup {
                name: "2024".to_string(),
                monthly_amount: 10_000,
                duration_months: 12,
                start_date: day(2024, 1, 1),
            },
            Utc::now(),
        )
        .await?;

        let updated = update_group(
            &ctx,
            &tenant.owner,
            group.id,
            GroupUpdate {
                monthly_amount: Some(20_000),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(updated.total_amount, 240_000);

        for month in 0..4 {
            let date = day(2024, 1, 10).checked_add_months(Months::new(month)).unwrap();
            rotation::create_auction(&ctx, &tenant.owner, group.id, date, None).await?;
        }
        let shrink = update_group(
            &ctx,
            &tenant.owner,
            group.id,
            GroupUpdate {
                duration_months: Some(3),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(
            shrink,
            Err(Error::Validation {
                field: "duration_months",
                ..
            })
        ));

        // Closed in month 3 but four auctions were already held
        let closed = close_group(&ctx, &tenant.owner, group.id, day(2024, 3, 15)).await?;
        assert!(!closed.is_active);
        assert_eq!(closed.duration_months, 4);
        assert_eq!(closed.total_amount, 80_000);

        // Past its end date, closing changes nothing
        let untouched = close_group(&ctx, &tenant.owner, tenant.root.id, day(2999, 1, 1)).await?;
        assert!(untouched.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_edits_keep_auctions_inside_the_window() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 3, 10).await?;
        let group = create_group(
            &ctx,
            &tenant.owner,
            NewGroup {
                name: "Q1".to_string(),
                monthly_amount: 10_000,
                duration_months: 3,
                start_date: day(2024, 1, 1),
            },
            Utc::now(),
        )
        .await?;
        rotation::create_auction(&ctx, &tenant.owner, group.id, day(2024, 1, 5), None).await?;
        rotation::create_auction(&ctx, &tenant.owner, group.id, day(2024, 3, 5), None).await?;

        let moved = update_group(
            &ctx,
            &tenant.owner,
            group.id,
            GroupUpdate {
                start_date: Some(day(2025, 1, 1)),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(
            moved,
            Err(Error::Validation {
                field: "start_date",
                ..
            })
        ));

        // Two auctions fit in two months by count, but March falls off the end
        let shrunk = update_group(
            &ctx,
            &tenant.owner,
            group.id,
            GroupUpdate {
                duration_months: Some(2),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(
            shrunk,
            Err(Error::Validation {
                field: "duration_months",
                ..
            })
        ));

        let reread = Group::find_by_id(group.id).one(&ctx.database).await?.unwrap();
        assert_eq!(reread.start_date, day(2024, 1, 1));
        assert_eq!(reread.duration_months, 3);

        // A window that still covers both auctions is fine
        let widened = update_group(
            &ctx,
            &tenant.owner,
            group.id,
            GroupUpdate {
                start_date: Some(day(2023, 11, 1)),
                duration_months: Some(6),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(widened.total_amount, 60_000);

        // Closing in month 3 keeps the month-5 auction inside the window
        let closed = close_group(&ctx, &tenant.owner, group.id, day(2024, 1, 20)).await?;
        assert_eq!(closed.duration_months, 5);
        assert!(closed.contains(day(2024, 3, 5)));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_group_guards() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 3, 10).await?;
        let child = create_group(
            &ctx,
            &tenant.owner,
            NewGroup {
                name: "child".to_string(),
                monthly_amount: 10_000,
                duration_months: 3,
                start_date: tenant.root.start_date,
            },
            Utc::now(),
        )
        .await?;
        let member = lifecycle_member(&ctx, &tenant.owner, child.id).await?;
        ledger::record_payment(
            &ctx,
            &tenant.owner,
            NewPayment {
                membership_id: member.id,
                amount: 10_000,
                paid_date: child.start_date,
                method: PaymentMethod::Cash,
            },
        )
        .await?;

        assert!(matches!(
            delete_group(&ctx, &tenant.owner, tenant.root.id).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            delete_group(&ctx, &tenant.owner, child.id).await,
            Err(Error::GroupHasPaymentHistory { .. })
        ));

        let empty = create_group(
            &ctx,
            &tenant.owner,
            NewGroup {
                name: "empty".to_string(),
                monthly_amount: 10_000,
                duration_months: 3,
                start_date: tenant.root.start_date,
            },
            Utc::now(),
        )
        .await?;
        delete_group(&ctx, &tenant.owner, empty.id).await?;
        assert!(Group::find_by_id(empty.id).one(&ctx.database).await?.is_none());
        Ok(())
    }

    async fn lifecycle_member(
        ctx: &AppContext,
        owner: &Principal,
        group_id: i64,
    ) -> Result<membership::Model> {
        Ok(enroll_member(ctx, owner, group_id, details("Kiran", "9111111111"), Utc::now())
            .await?
            .membership)
    }

    #[tokio::test]
    async fn test_left_flag_round_trip_and_collector_role() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let a = enroll(&ctx, &tenant, "A", "9000000001").await?.membership;

        assert!(mark_member_left(&ctx, &tenant.owner, a.id).await?.has_left);
        assert!(!reinstate_member(&ctx, &tenant.owner, a.id).await?.has_left);

        let not_collector = create_account(&ctx.database, "member-ish", Role::Member).await?;
        assert!(matches!(
            assign_collector(&ctx, &tenant.owner, tenant.root.id, Some(not_collector.account_id))
                .await,
            Err(Error::Validation { .. })
        ));
        let cleared = assign_collector(&ctx, &tenant.owner, tenant.root.id, None).await?;
        assert_eq!(cleared.collector_id, None);
        Ok(())
    }
}
