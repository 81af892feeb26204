//! Shared test utilities.
//!
//! In-memory databases plus fixtures for the usual cast: a group admin with a subscribed
//! root group, and members enrolled into it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::{
    config::settings::PolicySettings,
    core::{
        accounts,
        context::AppContext,
        lifecycle::{self, Enrollment, MemberDetails, NewGroup},
        notify::{Notification, Outbox},
        principal::{Principal, Role},
        subscription,
    },
    entities::{GroupSubscription, group, group_subscription, subscription_plan},
    errors::Result,
};
use chrono::{Datelike, Months, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, Set, prelude::*};
use tokio::sync::mpsc::UnboundedReceiver;

/// Creates an in-memory `SQLite` database with all tables initialized.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Context over a fresh database with a cheap hash cost. The receiver sees every emitted
/// notification; keep it alive or enrollments report `Dropped`.
pub async fn test_context() -> Result<(AppContext, UnboundedReceiver<Notification>)> {
    let db = setup_test_db().await?;
    let settings = PolicySettings {
        password_hash_cost: 4,
        ..PolicySettings::default()
    };
    let (outbox, receiver) = Outbox::channel();
    Ok((AppContext::new(db, settings, outbox), receiver))
}

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// First day of next month. Groups starting there have nothing due yet.
pub fn next_month_start() -> NaiveDate {
    let today = Utc::now().date_naive();
    today
        .with_day(1)
        .unwrap()
        .checked_add_months(Months::new(1))
        .unwrap()
}

/// Registers an account and returns its principal.
pub async fn create_account(db: &DatabaseConnection, username: &str, role: Role) -> Result<Principal> {
    let account = accounts::register_account(db, username, role).await?;
    Ok(Principal::new(account.id, account.role))
}

/// A 30-day plan priced at ₹499.
pub async fn create_plan(
    db: &DatabaseConnection,
    name: &str,
    max_groups: i32,
    max_members: i32,
) -> Result<subscription_plan::Model> {
    Ok(subscription_plan::ActiveModel {
        name: Set(name.to_string()),
        price: Set(49_900),
        duration_days: Set(30),
        max_members: Set(max_members),
        max_groups: Set(max_groups),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// A group admin with a root group subscribed from now.
pub struct Tenant {
    pub owner: Principal,
    /// ₹1,000 a month for 10 months, starting next month
    pub root: group::Model,
    pub plan: subscription_plan::Model,
}

pub async fn owner_with_group(
    ctx: &AppContext,
    username: &str,
    max_groups: i32,
    max_members: i32,
) -> Result<Tenant> {
    let owner = create_account(&ctx.database, username, Role::GroupAdmin).await?;
    let now = Utc::now();
    let root = lifecycle::create_group(
        ctx,
        &owner,
        NewGroup {
            name: format!("{username} savings"),
            monthly_amount: 100_000,
            duration_months: 10,
            start_date: next_month_start(),
        },
        now,
    )
    .await?;

    let plan = create_plan(
        &ctx.database,
        &format!("{username}-plan"),
        max_groups,
        max_members,
    )
    .await?;
    subscription::attach_subscription(ctx, &owner, root.id, plan.id).await?;
    let attached = GroupSubscription::find()
        .filter(group_subscription::Column::GroupId.eq(root.id))
        .one(&ctx.database)
        .await?
        .expect("subscription was just attached");
    subscription::activate_in(&ctx.database, attached, &plan, now).await?;

    Ok(Tenant { owner, root, plan })
}

pub fn details(name: &str, phone: &str) -> MemberDetails {
    MemberDetails {
        name: name.to_string(),
        phone: phone.to_string(),
        email: None,
        address: None,
    }
}

/// Enrolls a member into the tenant's root group.
pub async fn enroll(ctx: &AppContext, tenant: &Tenant, name: &str, phone: &str) -> Result<Enrollment> {
    lifecycle::enroll_member(ctx, &tenant.owner, tenant.root.id, details(name, phone), Utc::now())
        .await
}
