//! Subscription policy: which plan is in force for a group, how long it has left, and
//! the group and member quotas it grants.
//!
//! Subscriptions hang off root groups only. Sub-groups resolve through their root at
//! lookup time, so there is never a copy to keep in sync.

use crate::{
    core::{
        context::AppContext,
        locks::LockKey,
        principal::{Principal, Role},
        scope::{self, Access},
    },
    entities::{
        Group, GroupSubscription, Membership, SubscriptionPlan, group, group_subscription,
        membership, subscription_plan,
    },
    errors::{Error, ErrorKind, Result},
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};

/// Latest representable subscription end. Activation clamps to it instead of overflowing.
#[must_use]
pub fn max_end_date() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .map_or(DateTime::<Utc>::MAX_UTC, |dt| dt.and_utc())
}

/// Whether the subscription is valid at `now`. An absent or clamped end means unlimited.
#[must_use]
pub fn is_current(subscription: &group_subscription::Model, now: DateTime<Utc>) -> bool {
    subscription.is_active
        && subscription
            .end_date
            .is_none_or(|end| end.year() >= 9999 || now <= end)
}

/// A valid subscription together with the plan that sets its quotas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSubscription {
    pub subscription: group_subscription::Model,
    pub plan: subscription_plan::Model,
}

/// Resolves the subscription in force for `group` through its root. `None` when the root
/// has no subscription or it is not valid at `now`.
pub async fn effective_subscription<C>(
    db: &C,
    group: &group::Model,
    now: DateTime<Utc>,
) -> Result<Option<EffectiveSubscription>>
where
    C: ConnectionTrait,
{
    let Some(subscription) = GroupSubscription::find()
        .filter(group_subscription::Column::GroupId.eq(group.root_id()))
        .one(db)
        .await?
    else {
        return Ok(None);
    };
    if !is_current(&subscription, now) {
        return Ok(None);
    }

    let plan = SubscriptionPlan::find_by_id(subscription.plan_id)
        .one(db)
        .await?;
    Ok(plan.map(|plan| EffectiveSubscription { subscription, plan }))
}

/// Remaining time on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionStatus {
    pub active: bool,
    pub days_left: i64,
    /// Whole hours left within the last partial day
    pub hours_left: i64,
    /// No end date, or one clamped to [`max_end_date`]
    pub unlimited: bool,
}

/// Computes the remaining time. While active, less than an hour left still reports one
/// hour.
#[must_use]
pub fn status(subscription: &group_subscription::Model, now: DateTime<Utc>) -> SubscriptionStatus {
    let inactive = SubscriptionStatus {
        active: false,
        days_left: 0,
        hours_left: 0,
        unlimited: false,
    };
    if !is_current(subscription, now) {
        return inactive;
    }

    match subscription.end_date {
        Some(end) if end.year() < 9999 => {
            let remaining = end - now;
            let days_left = remaining.num_days();
            let mut hours_left = (remaining - Duration::days(days_left)).num_hours();
            if days_left == 0 && hours_left == 0 {
                hours_left = 1;
            }
            SubscriptionStatus {
                active: true,
                days_left,
                hours_left,
                unlimited: false,
            }
        }
        _ => SubscriptionStatus {
            active: true,
            days_left: 0,
            hours_left: 0,
            unlimited: true,
        },
    }
}

/// Short label for the remaining time, as shown on the dashboard.
#[must_use]
pub fn time_left_label(status: &SubscriptionStatus) -> String {
    if !status.active {
        return "0".to_string();
    }
    if status.unlimited {
        return "Unlimited".to_string();
    }
    match (status.days_left, status.hours_left) {
        (1, _) => "1 day".to_string(),
        (days, _) if days > 1 => format!("{days} days"),
        (_, hours) if hours > 1 => format!("Expires in {hours} hours"),
        _ => "Expires in 1 hour".to_string(),
    }
}

/// The owner's root group, if one exists.
pub async fn root_group_of<C>(db: &C, owner_id: i64) -> Result<Option<group::Model>>
where
    C: ConnectionTrait,
{
    Ok(Group::find()
        .filter(group::Column::OwnerId.eq(owner_id))
        .filter(group::Column::ParentId.is_null())
        .order_by_asc(group::Column::Id)
        .one(db)
        .await?)
}

/// Checks that `owner_id` may create one more group.
///
/// An owner without a root group always passes; the first group becomes the root. After
/// that the root needs a valid subscription whose plan allows more groups than the owner
/// already has.
pub async fn check_group_quota<C>(db: &C, owner_id: i64, now: DateTime<Utc>) -> Result<()>
where
    C: ConnectionTrait,
{
    let Some(root) = root_group_of(db, owner_id).await? else {
        return Ok(());
    };
    let effective = effective_subscription(db, &root, now)
        .await?
        .ok_or(Error::NoActiveSubscription)?;

    let owned = Group::find()
        .filter(group::Column::OwnerId.eq(owner_id))
        .count(db)
        .await?;
    tracing::debug!(
        owner_id,
        owned,
        max_groups = effective.plan.max_groups,
        "Evaluated group quota"
    );
    if owned >= u64::try_from(effective.plan.max_groups).unwrap_or(0) {
        return Err(Error::GroupLimitReached {
            max_groups: effective.plan.max_groups,
        });
    }
    Ok(())
}

/// Checks that `group` may take one more member.
pub async fn check_member_quota<C>(db: &C, group: &group::Model, now: DateTime<Utc>) -> Result<()>
where
    C: ConnectionTrait,
{
    let effective = effective_subscription(db, group, now)
        .await?
        .ok_or(Error::NoActiveSubscription)?;

    let enrolled = Membership::find()
        .filter(membership::Column::GroupId.eq(group.id))
        .count(db)
        .await?;
    tracing::debug!(
        group_id = group.id,
        enrolled,
        max_members = effective.plan.max_members,
        "Evaluated member quota"
    );
    if enrolled >= u64::try_from(effective.plan.max_members).unwrap_or(0) {
        return Err(Error::MemberLimitReached {
            max_members: effective.plan.max_members,
        });
    }
    Ok(())
}

/// Turns a quota check into a yes/no answer. Only persistence failures stay errors.
fn passed(check: Result<()>) -> Result<bool> {
    match check {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::Policy => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether `owner_id` may create another group right now.
pub async fn can_create_group<C>(db: &C, owner_id: i64, now: DateTime<Utc>) -> Result<bool>
where
    C: ConnectionTrait,
{
    passed(check_group_quota(db, owner_id, now).await)
}

/// Whether `group` may take another member right now.
pub async fn can_add_member<C>(db: &C, group: &group::Model, now: DateTime<Utc>) -> Result<bool>
where
    C: ConnectionTrait,
{
    passed(check_member_quota(db, group, now).await)
}

/// Attaches an inactive subscription on `plan_id` to a root group. Each root carries at
/// most one subscription; renewals reuse it.
pub async fn attach_subscription(
    ctx: &AppContext,
    principal: &Principal,
    group_id: i64,
    plan_id: i64,
) -> Result<group_subscription::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "attach subscriptions")?;
    let group = scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;
    if !group.is_root() {
        return Err(Error::SubscriptionRequiresRootGroup { group_id });
    }
    let plan = SubscriptionPlan::find_by_id(plan_id)
        .one(&ctx.database)
        .await?
        .ok_or_else(|| Error::not_found("plan", plan_id))?;
    if !plan.is_active {
        return Err(Error::validation("plan_id", "plan is not offered any more"));
    }

    let _guard = ctx.locks.lock(LockKey::Group(group.id)).await;
    let txn = ctx.database.begin().await?;

    let existing = GroupSubscription::find()
        .filter(group_subscription::Column::GroupId.eq(group.id))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(Error::validation(
            "group_id",
            "group already has a subscription",
        ));
    }

    let subscription = group_subscription::ActiveModel {
        group_id: Set(group.id),
        plan_id: Set(plan.id),
        start_date: Set(None),
        end_date: Set(None),
        is_active: Set(false),
        pending_order_id: Set(None),
        pending_plan_id: Set(None),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!(group_id, plan = %plan.name, "Subscription attached");
    Ok(subscription)
}

/// Activates `subscription` on `plan` from `start` inside an open transaction.
///
/// End is `start + plan.duration_days`, clamped to [`max_end_date`]. Any pending gateway
/// order is cleared.
pub async fn activate_in<C>(
    db: &C,
    subscription: group_subscription::Model,
    plan: &subscription_plan::Model,
    start: DateTime<Utc>,
) -> Result<group_subscription::Model>
where
    C: ConnectionTrait,
{
    let max_end = max_end_date();
    let end = start
        .checked_add_signed(Duration::days(i64::from(plan.duration_days)))
        .map_or(max_end, |end| end.min(max_end));

    let mut active: group_subscription::ActiveModel = subscription.into();
    active.plan_id = Set(plan.id);
    active.start_date = Set(Some(start));
    active.end_date = Set(Some(end));
    active.is_active = Set(true);
    active.pending_order_id = Set(None);
    active.pending_plan_id = Set(None);
    Ok(active.update(db).await?)
}

/// Manually activates a subscription on its current plan. Platform admins only.
pub async fn activate_subscription(
    ctx: &AppContext,
    principal: &Principal,
    subscription_id: i64,
    start: DateTime<Utc>,
) -> Result<group_subscription::Model> {
    principal.require(&[Role::Admin], "activate subscriptions")?;
    let group_id = GroupSubscription::find_by_id(subscription_id)
        .one(&ctx.database)
        .await?
        .ok_or_else(|| Error::not_found("subscription", subscription_id))?
        .group_id;

    let _guard = ctx.locks.lock(LockKey::Group(group_id)).await;
    let txn = ctx.database.begin().await?;

    let subscription = GroupSubscription::find_by_id(subscription_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("subscription", subscription_id))?;
    let plan = SubscriptionPlan::find_by_id(subscription.plan_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("plan", subscription.plan_id))?;

    let activated = activate_in(&txn, subscription, &plan, start).await?;
    txn.commit().await?;

    tracing::info!(group_id, plan = %plan.name, end = ?activated.end_date, "Subscription activated");
    Ok(activated)
}

/// The subscription of the root of `group_id`, with its status at `now`.
pub async fn subscription_overview(
    db: &DatabaseConnection,
    principal: &Principal,
    group_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<(group_subscription::Model, SubscriptionStatus)>> {
    let group = scope::group_for(db, principal, group_id, Access::Read).await?;
    let subscription = GroupSubscription::find()
        .filter(group_subscription::Column::GroupId.eq(group.root_id()))
        .one(db)
        .await?;
    Ok(subscription.map(|s| {
        let state = status(&s, now);
        (s, state)
    }))
}

/// Flips every active subscription whose end has passed to inactive. Returns how many
/// were closed.
pub async fn close_expired_subscriptions(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<u64> {
    let result = GroupSubscription::update_many()
        .col_expr(group_subscription::Column::IsActive, Expr::value(false))
        .filter(group_subscription::Column::IsActive.eq(true))
        .filter(group_subscription::Column::EndDate.is_not_null())
        .filter(group_subscription::Column::EndDate.lte(now))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::info!(closed = result.rows_affected, "Closed expired subscriptions");
    }
    Ok(result.rows_affected)
}
