//! Payment ledger.
//!
//! At most one successful payment per membership and calendar month. The check runs in
//! the same transaction as the insert, under the membership's lock, so a concurrent
//! second submission sees the first and fails with [`Error::DuplicatePayment`].
//!
//! Balances and member status are computed on demand from the success payments; nothing
//! here is cached.

use crate::{
    core::{
        context::AppContext,
        locks::LockKey,
        principal::{Principal, Role},
        scope::{self, Access},
    },
    entities::{
        Membership, Payment, group, membership,
        payment::{self, PaymentMethod, PaymentStatus},
    },
    errors::{Error, Result},
};
use chrono::{Datelike, Months, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::fmt;
use uuid::Uuid;

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::validation("month", format!("{year}-{month} is not a month")))?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| Error::validation("month", "month is out of range"))?;
    Ok((first, last))
}

/// Whether a success payment exists for the membership in `group_id` during the given
/// calendar month. `exclude` skips one payment, for the edit path.
pub async fn has_paid_for_month<C>(
    db: &C,
    membership_id: i64,
    group_id: i64,
    year: i32,
    month: u32,
    exclude: Option<i64>,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let (first, last) = month_bounds(year, month)?;
    let mut query = Payment::find()
        .filter(payment::Column::MembershipId.eq(membership_id))
        .filter(payment::Column::GroupId.eq(group_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Success))
        .filter(payment::Column::PaidDate.between(first, last));
    if let Some(id) = exclude {
        query = query.filter(payment::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

/// 12 upper-case hex characters.
pub(crate) fn new_transaction_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_uppercase()
}

/// `INV<yyyymmdd><8 hex>`.
pub(crate) fn new_invoice_number(issued: NaiveDate) -> String {
    format!(
        "INV{}{}",
        issued.format("%Y%m%d"),
        Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    )
}

/// Re-reads a membership inside the caller's transaction; it may have been removed since
/// the scope check.
async fn still_enrolled<C>(db: &C, membership_id: i64) -> Result<membership::Model>
where
    C: ConnectionTrait,
{
    Membership::find_by_id(membership_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("membership", membership_id))
}

/// A member contribution to record.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub membership_id: i64,
    /// Paise
    pub amount: i64,
    pub paid_date: NaiveDate,
    pub method: PaymentMethod,
}

/// Records a successful member payment.
///
/// Fails with [`Error::DuplicatePayment`] when the membership already paid for the month
/// of `paid_date`.
pub async fn record_payment(
    ctx: &AppContext,
    principal: &Principal,
    new: NewPayment,
) -> Result<payment::Model> {
    principal.require(
        &[Role::Admin, Role::GroupAdmin, Role::Collector],
        "record payments",
    )?;
    if new.amount <= 0 {
        return Err(Error::validation("amount", "must be positive"));
    }
    if new.method == PaymentMethod::Gateway {
        return Err(Error::validation(
            "method",
            "gateway payments are recorded by the gateway callback",
        ));
    }
    let (membership, group) =
        scope::membership_for(&ctx.database, principal, new.membership_id, Access::Collect)
            .await?;

    let _guard = ctx.locks.lock(LockKey::Membership(membership.id)).await;
    let txn = ctx.database.begin().await?;
    let membership = still_enrolled(&txn, membership.id).await?;

    let (year, month) = (new.paid_date.year(), new.paid_date.month());
    if has_paid_for_month(&txn, membership.id, group.id, year, month, None).await? {
        return Err(Error::DuplicatePayment {
            membership_id: membership.id,
            year,
            month,
        });
    }

    let now = Utc::now();
    let payment = payment::ActiveModel {
        membership_id: Set(Some(membership.id)),
        group_id: Set(group.id),
        collector_id: Set(Some(principal.account_id)),
        amount: Set(new.amount),
        paid_date: Set(new.paid_date),
        method: Set(new.method),
        status: Set(PaymentStatus::Success),
        subscription_plan_id: Set(None),
        subscription_start: Set(None),
        subscription_end: Set(None),
        transaction_id: Set(new_transaction_id()),
        invoice_number: Set(new_invoice_number(now.date_naive())),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    tracing::info!(
        payment_id = payment.id,
        membership_id = membership.id,
        amount = payment.amount,
        "Payment recorded"
    );
    Ok(payment)
}

/// Fields an edit may change. `None` leaves the field alone.
#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    /// Reassign to another membership of the caller's groups
    pub membership_id: Option<i64>,
    pub amount: Option<i64>,
    pub paid_date: Option<NaiveDate>,
    pub method: Option<PaymentMethod>,
    pub status: Option<PaymentStatus>,
}

/// Edits a member payment, re-checking the monthly rule against the edited target.
pub async fn update_payment(
    ctx: &AppContext,
    principal: &Principal,
    payment_id: i64,
    update: PaymentUpdate,
) -> Result<payment::Model> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "edit payments")?;
    if update.amount.is_some_and(|amount| amount <= 0) {
        return Err(Error::validation("amount", "must be positive"));
    }
    let (existing, _) =
        scope::payment_for(&ctx.database, principal, payment_id, Access::Manage).await?;
    let Some(current_membership) = existing.membership_id else {
        return Err(Error::validation(
            "payment_id",
            "subscription payments cannot be edited",
        ));
    };
    let target_id = update.membership_id.unwrap_or(current_membership);
    let (target, target_group) =
        scope::membership_for(&ctx.database, principal, target_id, Access::Manage).await?;

    let _guard = ctx.locks.lock(LockKey::Membership(target.id)).await;
    let txn = ctx.database.begin().await?;
    let target = still_enrolled(&txn, target.id).await?;

    let existing = Payment::find_by_id(payment_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("payment", payment_id))?;
    let paid_date = update.paid_date.unwrap_or(existing.paid_date);
    let status = update.status.unwrap_or(existing.status);

    if status == PaymentStatus::Success {
        let (year, month) = (paid_date.year(), paid_date.month());
        if has_paid_for_month(&txn, target.id, target_group.id, year, month, Some(payment_id))
            .await?
        {
            return Err(Error::DuplicatePayment {
                membership_id: target.id,
                year,
                month,
            });
        }
    }

    let mut active: payment::ActiveModel = existing.into();
    active.membership_id = Set(Some(target.id));
    active.group_id = Set(target_group.id);
    active.paid_date = Set(paid_date);
    active.status = Set(status);
    if let Some(amount) = update.amount {
        active.amount = Set(amount);
    }
    if let Some(method) = update.method {
        active.method = Set(method);
    }
    active.updated_at = Set(Utc::now());
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(payment_id, membership_id = target.id, "Payment updated");
    Ok(updated)
}

/// Deletes a payment.
pub async fn delete_payment(ctx: &AppContext, principal: &Principal, payment_id: i64) -> Result<()> {
    principal.require(&[Role::Admin, Role::GroupAdmin], "delete payments")?;
    let (payment, group) =
        scope::payment_for(&ctx.database, principal, payment_id, Access::Manage).await?;

    let key = payment
        .membership_id
        .map_or(LockKey::Group(group.id), LockKey::Membership);
    let _guard = ctx.locks.lock(key).await;
    Payment::delete_by_id(payment.id).exec(&ctx.database).await?;

    tracing::info!(payment_id, "Payment deleted");
    Ok(())
}

/// Success payments of a membership, oldest first.
pub async fn success_payments<C>(db: &C, membership_id: i64) -> Result<Vec<payment::Model>>
where
    C: ConnectionTrait,
{
    Ok(Payment::find()
        .filter(payment::Column::MembershipId.eq(membership_id))
        .filter(payment::Column::Status.eq(PaymentStatus::Success))
        .order_by_asc(payment::Column::PaidDate)
        .order_by_asc(payment::Column::Id)
        .all(db)
        .await?)
}

/// Sum of the membership's success payments, in paise.
pub async fn total_paid<C>(db: &C, membership_id: i64) -> Result<i64>
where
    C: ConnectionTrait,
{
    let payments = success_payments(db, membership_id).await?;
    Ok(payments.iter().map(|p| p.amount).sum())
}

/// What is still owed against `expected`; never negative.
#[must_use]
pub fn pending_from(expected: i64, paid: i64) -> i64 {
    expected.saturating_sub(paid).max(0)
}

/// Standing of a membership, evaluated on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Active,
    /// Paid the full group total
    Completed,
    /// Behind the amount due for the months elapsed so far
    Defaulted,
    /// Manually marked as left
    Left,
}

impl MemberStatus {
    /// Whether the membership may be picked as a winner.
    #[must_use]
    pub const fn can_win(self) -> bool {
        matches!(self, Self::Active | Self::Completed)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Defaulted => "defaulted",
            Self::Left => "left",
        };
        f.write_str(label)
    }
}

/// Status from the already-known inputs. The month running on `today` counts as due.
#[must_use]
pub fn evaluate_status(
    has_left: bool,
    total_paid: i64,
    group: &group::Model,
    today: NaiveDate,
) -> MemberStatus {
    if has_left {
        return MemberStatus::Left;
    }
    if total_paid >= group.total_amount {
        return MemberStatus::Completed;
    }
    let due_so_far = group
        .monthly_amount
        .saturating_mul(i64::from(group.current_month(today)));
    if total_paid < due_so_far {
        MemberStatus::Defaulted
    } else {
        MemberStatus::Active
    }
}

/// Current status of `membership` in `group`.
pub async fn member_status<C>(
    db: &C,
    membership: &membership::Model,
    group: &group::Model,
    today: NaiveDate,
) -> Result<MemberStatus>
where
    C: ConnectionTrait,
{
    let paid = total_paid(db, membership.id).await?;
    Ok(evaluate_status(membership.has_left, paid, group, today))
}

/// Money position of one membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberBalance {
    pub membership_id: i64,
    pub token_no: i32,
    /// Group total the member owes over the whole rotation
    pub expected_total: i64,
    pub total_paid: i64,
    pub pending: i64,
    pub months_paid: i32,
    pub next_due_date: Option<NaiveDate>,
    pub status: MemberStatus,
}

/// Balance of a membership the principal can read.
pub async fn member_balance(
    db: &DatabaseConnection,
    principal: &Principal,
    membership_id: i64,
    today: NaiveDate,
) -> Result<MemberBalance> {
    let (membership, group) =
        scope::membership_for(db, principal, membership_id, Access::Read).await?;
    let paid = total_paid(db, membership.id).await?;
    Ok(MemberBalance {
        membership_id: membership.id,
        token_no: membership.token_no,
        expected_total: group.total_amount,
        total_paid: paid,
        pending: pending_from(group.total_amount, paid),
        months_paid: months_paid(&group, paid),
        next_due_date: next_due_date(&group, paid),
        status: evaluate_status(membership.has_left, paid, &group, today),
    })
}

/// Whether a rotation month is covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthState {
    Completed,
    Pending,
}

/// Payment position of one rotation month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthStatus {
    /// 1-based rotation month
    pub month_index: i32,
    /// First calendar day of the month
    pub month_start: NaiveDate,
    pub paid: i64,
    pub due: i64,
    pub state: MonthState,
}

fn month_entry(group: &group::Model, month_index: i32, payments: &[payment::Model]) -> MonthStatus {
    let offset = u32::try_from(month_index - 1).unwrap_or(0);
    let anchor = group.start_date.with_day(1).unwrap_or(group.start_date);
    let month_start = anchor
        .checked_add_months(Months::new(offset))
        .unwrap_or(anchor);
    let paid: i64 = payments
        .iter()
        .filter(|p| group.month_index(p.paid_date) == month_index)
        .map(|p| p.amount)
        .sum();
    let due = pending_from(group.monthly_amount, paid);
    MonthStatus {
        month_index,
        month_start,
        paid,
        due,
        state: if due == 0 {
            MonthState::Completed
        } else {
            MonthState::Pending
        },
    }
}

/// Status of the calendar month `year-month` for a membership; `None` outside the
/// rotation window.
pub async fn month_status<C>(
    db: &C,
    membership: &membership::Model,
    group: &group::Model,
    year: i32,
    month: u32,
) -> Result<Option<MonthStatus>>
where
    C: ConnectionTrait,
{
    let (first, _) = month_bounds(year, month)?;
    let month_index = group.month_index(first);
    if month_index < 1 || month_index > group.duration_months {
        return Ok(None);
    }
    let payments = success_payments(db, membership.id).await?;
    Ok(Some(month_entry(group, month_index, &payments)))
}

/// One entry per rotation month, in order.
pub async fn rotation_statement<C>(
    db: &C,
    membership: &membership::Model,
    group: &group::Model,
) -> Result<Vec<MonthStatus>>
where
    C: ConnectionTrait,
{
    let payments = success_payments(db, membership.id).await?;
    Ok((1..=group.duration_months)
        .map(|index| month_entry(group, index, &payments))
        .collect())
}

/// Whole months covered by `total_paid`, capped at the group duration. Overpaying one
/// month carries into the next.
#[must_use]
pub fn months_paid(group: &group::Model, total_paid: i64) -> i32 {
    if group.monthly_amount <= 0 {
        return 0;
    }
    let months = (total_paid / group.monthly_amount).max(0);
    i32::try_from(months)
        .unwrap_or(i32::MAX)
        .min(group.duration_months)
}

/// Start date plus the months already covered; `None` once everything is paid.
#[must_use]
pub fn next_due_date(group: &group::Model, total_paid: i64) -> Option<NaiveDate> {
    let covered = months_paid(group, total_paid);
    if covered >= group.duration_months {
        return None;
    }
    group
        .start_date
        .checked_add_months(Months::new(u32::try_from(covered).ok()?))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{create_account, day, enroll, owner_with_group, test_context};

    fn cash(membership_id: i64, amount: i64, paid_date: NaiveDate) -> NewPayment {
        NewPayment {
            membership_id,
            amount,
            paid_date,
            method: PaymentMethod::Cash,
        }
    }

    fn group_starting(start: NaiveDate, monthly_amount: i64, duration_months: i32) -> group::Model {
        let now = Utc::now();
        group::Model {
            id: 1,
            name: "g".to_string(),
            code: "CH-ABCDEF".to_string(),
            owner_id: 1,
            parent_id: None,
            monthly_amount,
            duration_months,
            total_amount: monthly_amount * i64::from(duration_months),
            start_date: start,
            is_active: true,
            collector_id: None,
            last_token_no: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_month_bounds() {
        assert_eq!(
            month_bounds(2024, 2).unwrap(),
            (day(2024, 2, 1), day(2024, 2, 29))
        );
        assert_eq!(
            month_bounds(2023, 12).unwrap(),
            (day(2023, 12, 1), day(2023, 12, 31))
        );
        assert!(month_bounds(2024, 13).is_err());
    }

    #[test]
    fn test_pending_is_never_negative() {
        assert_eq!(pending_from(10_000, 2_500), 7_500);
        assert_eq!(pending_from(10_000, 10_000), 0);
        assert_eq!(pending_from(10_000, 15_000), 0);
        assert_eq!(pending_from(0, i64::MAX), 0);
    }

    #[test]
    fn test_months_paid_carries_overpayment() {
        let g = group_starting(day(2024, 1, 15), 1_000, 3);
        assert_eq!(months_paid(&g, 999), 0);
        assert_eq!(months_paid(&g, 2_500), 2);
        assert_eq!(months_paid(&g, 9_000), 3);
        assert_eq!(next_due_date(&g, 2_500), Some(day(2024, 3, 15)));
        assert_eq!(next_due_date(&g, 3_000), None);
    }

    #[test]
    fn test_status_precedence() {
        let g = group_starting(day(2024, 1, 10), 1_000, 3);
        let march = day(2024, 3, 5);

        assert_eq!(evaluate_status(true, 3_000, &g, march), MemberStatus::Left);
        assert_eq!(evaluate_status(false, 3_000, &g, march), MemberStatus::Completed);
        assert_eq!(evaluate_status(false, 2_999, &g, march), MemberStatus::Defaulted);
        assert_eq!(evaluate_status(false, 2_000, &g, day(2024, 2, 20)), MemberStatus::Active);
        // Nothing is due before the start
        assert_eq!(evaluate_status(false, 0, &g, day(2023, 12, 1)), MemberStatus::Active);
        assert_eq!(MemberStatus::Defaulted.to_string(), "defaulted");
        assert!(!MemberStatus::Left.can_win());
    }

    #[test]
    fn test_identifiers_have_expected_shape() {
        let tx = new_transaction_id();
        assert_eq!(tx.len(), 12);
        assert!(tx.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

        let invoice = new_invoice_number(day(2024, 5, 9));
        assert!(invoice.starts_with("INV20240509"));
        assert_eq!(invoice.len(), 19);
    }

    #[tokio::test]
    async fn test_one_success_payment_per_month() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let enrolled = enroll(&ctx, &tenant, "Asha", "9000000001").await?;
        let id = enrolled.membership.id;
        let start = tenant.root.start_date;

        record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)).await?;
        let again = record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)).await;
        assert!(matches!(
            again,
            Err(Error::DuplicatePayment { membership_id, .. }) if membership_id == id
        ));

        let month_later = start.checked_add_months(Months::new(1)).unwrap();
        record_payment(&ctx, &tenant.owner, cash(id, 100_000, month_later)).await?;

        let rows = Payment::find()
            .filter(payment::Column::MembershipId.eq(id))
            .count(&ctx.database)
            .await?;
        assert_eq!(rows, 2);
        assert_eq!(total_paid(&ctx.database, id).await?, 200_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_payments_do_not_block_the_month() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let enrolled = enroll(&ctx, &tenant, "Asha", "9000000001").await?;
        let id = enrolled.membership.id;
        let start = tenant.root.start_date;

        let first = record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)).await?;
        update_payment(
            &ctx,
            &tenant.owner,
            first.id,
            PaymentUpdate {
                status: Some(PaymentStatus::Failed),
                ..Default::default()
            },
        )
        .await?;

        assert!(!has_paid_for_month(&ctx.database, id, tenant.root.id, start.year(), start.month(), None).await?);
        let retry = record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)).await?;

        // Flipping the failed one back would make two successes
        let flip = update_payment(
            &ctx,
            &tenant.owner,
            first.id,
            PaymentUpdate {
                status: Some(PaymentStatus::Success),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(flip, Err(Error::DuplicatePayment { .. })));

        // Editing a payment's own amount does not collide with itself
        let edited = update_payment(
            &ctx,
            &tenant.owner,
            retry.id,
            PaymentUpdate {
                amount: Some(90_000),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(edited.amount, 90_000);
        Ok(())
    }

    #[tokio::test]
    async fn test_reassignment_revalidates_target() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let asha = enroll(&ctx, &tenant, "Asha", "9000000001").await?.membership;
        let bala = enroll(&ctx, &tenant, "Bala", "9000000002").await?.membership;
        let start = tenant.root.start_date;

        let wrong = record_payment(&ctx, &tenant.owner, cash(asha.id, 100_000, start)).await?;
        record_payment(&ctx, &tenant.owner, cash(bala.id, 100_000, start)).await?;

        let moved = update_payment(
            &ctx,
            &tenant.owner,
            wrong.id,
            PaymentUpdate {
                membership_id: Some(bala.id),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(moved, Err(Error::DuplicatePayment { .. })));

        delete_payment(&ctx, &tenant.owner, wrong.id).await?;
        assert_eq!(total_paid(&ctx.database, asha.id).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_submissions() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let id = enroll(&ctx, &tenant, "Asha", "9000000001").await?.membership.id;
        let start = tenant.root.start_date;

        let (a, b) = tokio::join!(
            record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)),
            record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)),
        );
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|r| matches!(r, Err(Error::DuplicatePayment { .. })))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_payment_racing_removal_leaves_no_orphans() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let id = enroll(&ctx, &tenant, "Asha", "9000000001").await?.membership.id;
        let start = tenant.root.start_date;

        let (removed, recorded) = tokio::join!(
            crate::core::lifecycle::remove_member(&ctx, &tenant.owner, id),
            record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)),
        );
        removed?;
        // Either recorded before the removal (and removed with it) or refused as missing
        assert!(matches!(recorded, Ok(_) | Err(Error::NotFound { .. })));
        let remaining = Payment::find()
            .filter(payment::Column::MembershipId.eq(id))
            .count(&ctx.database)
            .await?;
        assert_eq!(remaining, 0);

        let late = record_payment(&ctx, &tenant.owner, cash(id, 100_000, start)).await;
        assert!(matches!(late, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_collectors_record_only_for_assigned_groups() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let id = enroll(&ctx, &tenant, "Asha", "9000000001").await?.membership.id;
        let collector = create_account(&ctx.database, "collector", Role::Collector).await?;
        let start = tenant.root.start_date;

        let refused = record_payment(&ctx, &collector, cash(id, 100_000, start)).await;
        assert!(matches!(refused, Err(Error::NotFound { .. })));

        crate::core::lifecycle::assign_collector(
            &ctx,
            &tenant.owner,
            tenant.root.id,
            Some(collector.account_id),
        )
        .await?;
        let payment = record_payment(&ctx, &collector, cash(id, 100_000, start)).await?;
        assert_eq!(payment.collector_id, Some(collector.account_id));

        assert!(matches!(
            delete_payment(&ctx, &collector, payment.id).await,
            Err(Error::PermissionDenied { .. })
        ));
        assert!(matches!(
            record_payment(&ctx, &tenant.owner, cash(id, 0, start)).await,
            Err(Error::Validation { field: "amount", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_statement_and_balance() -> Result<()> {
        let (ctx, _rx) = test_context().await?;
        let tenant = owner_with_group(&ctx, "owner", 2, 10).await?;
        let enrolled = enroll(&ctx, &tenant, "Asha", "9000000001").await?;
        let membership = enrolled.membership;
        let group = &tenant.root;
        let start = group.start_date;
        let second = start.checked_add_months(Months::new(1)).unwrap();

        record_payment(&ctx, &tenant.owner, cash(membership.id, group.monthly_amount, start))
            .await?;
        record_payment(&ctx, &tenant.owner, cash(membership.id, 40_000, second)).await?;

        let statement = rotation_statement(&ctx.database, &membership, group).await?;
        assert_eq!(statement.len(), 10);
        assert_eq!(statement[0].state, MonthState::Completed);
        assert_eq!(statement[1].paid, 40_000);
        assert_eq!(statement[1].due, group.monthly_amount - 40_000);
        let paid = total_paid(&ctx.database, membership.id).await?;
        assert_eq!(months_paid(group, paid), 1);
        assert_eq!(next_due_date(group, paid), Some(second));
        assert_eq!(next_due_date(group, group.total_amount), None);

        let second_month = month_status(&ctx.database, &membership, group, second.year(), second.month())
            .await?
            .unwrap();
        assert_eq!(second_month.month_index, 2);
        let before = start.checked_sub_months(Months::new(1)).unwrap();
        assert!(
            month_status(&ctx.database, &membership, group, before.year(), before.month())
                .await?
                .is_none()
        );

        let member = Principal::new(enrolled.member.account_id.unwrap(), Role::Member);
        let balance = member_balance(&ctx.database, &member, membership.id, start).await?;
        assert_eq!(balance.total_paid, group.monthly_amount + 40_000);
        assert_eq!(balance.pending, group.total_amount - balance.total_paid);
        assert_eq!(balance.months_paid, 1);
        assert_eq!(balance.status, MemberStatus::Active);
        Ok(())
    }
}
