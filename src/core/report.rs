//! Reporting projections.
//!
//! Read-only summaries over committed payments, groups and subscriptions. Nothing here
//! takes a lock or opens a transaction.

use crate::{
    core::{
        principal::{Principal, Role},
        scope, subscription,
    },
    entities::{
        Account, Group, GroupSubscription, Payment, account,
        payment::{self, PaymentStatus},
    },
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::prelude::*;

/// Inclusive range of payment dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting one that ends before it starts.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if to < from {
            return Err(Error::validation("to", "range ends before it starts"));
        }
        Ok(Self { from, to })
    }
}

/// Platform-wide figures for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSummary {
    /// Number of group admin accounts
    pub group_admins: u64,
    /// Accounts of any role that are blocked
    pub blocked_accounts: u64,
    /// Root groups and sub-groups together
    pub total_groups: u64,
    /// Subscriptions valid right now
    pub active_subscriptions: usize,
    /// Subscriptions that were activated at some point and are no longer valid
    pub expired_subscriptions: usize,
    /// Sum of success payments dated inside the range, in paise
    pub revenue: i64,
}

/// Platform summary. Platform admins only.
pub async fn platform_summary(
    db: &DatabaseConnection,
    principal: &Principal,
    range: DateRange,
    now: DateTime<Utc>,
) -> Result<PlatformSummary> {
    principal.require(&[Role::Admin], "view platform reports")?;

    let group_admins = Account::find()
        .filter(account::Column::Role.eq(Role::GroupAdmin))
        .count(db)
        .await?;
    let blocked_accounts = Account::find()
        .filter(account::Column::IsBlocked.eq(true))
        .count(db)
        .await?;
    let total_groups = Group::find().count(db).await?;

    let subscriptions = GroupSubscription::find().all(db).await?;
    let active_subscriptions = subscriptions
        .iter()
        .filter(|s| subscription::is_current(s, now))
        .count();
    let expired_subscriptions = subscriptions
        .iter()
        .filter(|s| s.start_date.is_some() && !subscription::is_current(s, now))
        .count();

    let revenue = Payment::find()
        .filter(payment::Column::Status.eq(PaymentStatus::Success))
        .filter(payment::Column::PaidDate.between(range.from, range.to))
        .all(db)
        .await?
        .iter()
        .map(|p| p.amount)
        .sum();

    Ok(PlatformSummary {
        group_admins,
        blocked_accounts,
        total_groups,
        active_subscriptions,
        expired_subscriptions,
        revenue,
    })
}

/// Member contributions collected in the principal's visible groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub groups: usize,
    pub payments: usize,
    pub total_collected: i64,
}

/// Sums the success member payments in `range` over every group the principal can see.
pub async fn collection_summary(
    db: &DatabaseConnection,
    principal: &Principal,
    range: DateRange,
) -> Result<CollectionSummary> {
    let groups = scope::visible_groups(db, principal).await?;
    if groups.is_empty() {
        return Ok(CollectionSummary {
            groups: 0,
            payments: 0,
            total_collected: 0,
        });
    }

    let group_ids: Vec<i64> = groups.iter().map(|g| g.id).collect();
    let payments = Payment::find()
        .filter(payment::Column::GroupId.is_in(group_ids))
        .filter(payment::Column::MembershipId.is_not_null())
        .filter(payment::Column::Status.eq(PaymentStatus::Success))
        .filter(payment::Column::PaidDate.between(range.from, range.to))
        .all(db)
        .await?;

    Ok(CollectionSummary {
        groups: groups.len(),
        payments: payments.len(),
        total_collected: payments.iter().map(|p| p.amount).sum(),
    })
}

/// Formats paise as rupees with Indian digit grouping, e.g. `₹1,23,456.78`.
#[must_use]
pub fn format_amount(paise: i64) -> String {
    let sign = if paise < 0 { "-" } else { "" };
    let paise = paise.unsigned_abs();
    let rupees = (paise / 100).to_string();
    let fraction = paise % 100;

    // Last three digits, then groups of two
    let grouped = if rupees.len() <= 3 {
        rupees
    } else {
        let (head, tail) = rupees.split_at(rupees.len() - 3);
        let mut parts: Vec<&str> = Vec::new();
        let mut end = head.len();
        while end > 0 {
            let start = end.saturating_sub(2);
            parts.push(&head[start..end]);
            end = start;
        }
        parts.reverse();
        format!("{},{tail}", parts.join(","))
    };
    format!("{sign}₹{grouped}.{fraction:02}")
}
