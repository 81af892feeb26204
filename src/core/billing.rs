//! Gateway-backed subscription renewal.
//!
//! The payment gateway is an outside collaborator behind [`PaymentGateway`]. Renewal is
//! two steps: [`begin_renewal`] asks for an order and parks it on the root group's
//! subscription, then [`confirm_renewal`] acts on the gateway callback. Only a verified
//! callback activates anything.

use crate::{
    config::plans,
    core::{
        context::AppContext,
        ledger::{new_invoice_number, new_transaction_id},
        locks::LockKey,
        notify::{Delivery, Notification},
        principal::{Principal, Role},
        scope::{self, Access},
        subscription,
    },
    entities::{
        Account, Group, GroupSubscription, SubscriptionPlan, group_subscription, payment,
        payment::{PaymentMethod, PaymentStatus},
        subscription_plan,
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{Set, TransactionTrait, prelude::*};

/// Order created by the gateway for a renewal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderHandle {
    pub order_id: String,
    /// Paise
    pub amount: i64,
}

/// What the gateway posts back once the customer has paid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

/// Payment gateway collaborator.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates an order for `amount` paise.
    async fn create_order(&self, amount: i64, receipt: &str) -> Result<OrderHandle>;

    /// Whether the callback really comes from the gateway.
    async fn verify(&self, callback: &GatewayCallback) -> Result<bool>;
}

/// A renewal waiting for payment.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub subscription: group_subscription::Model,
    pub plan: subscription_plan::Model,
    pub order: OrderHandle,
}

/// The plan a renewal is for: the named one, else the configured default, else the
/// cheapest plan on offer.
async fn renewal_plan(ctx: &AppContext, plan_id: Option<i64>) -> Result<subscription_plan::Model> {
    if let Some(plan_id) = plan_id {
        return SubscriptionPlan::find_by_id(plan_id)
            .one(&ctx.database)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| Error::not_found("plan", plan_id));
    }
    if let Some(name) = &ctx.settings.default_plan {
        return plans::find_active_plan(&ctx.database, name)
            .await?
            .ok_or_else(|| Error::not_found("plan", name));
    }
    plans::active_plans(&ctx.database)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::not_found("plan", "any"))
}

/// Starts a renewal of the root subscription of `group_id`. Creates the subscription
/// (inactive) if the root has none. A currently valid subscription stays valid until
/// the renewal is confirmed.
pub async fn begin_renewal<G>(
    ctx: &AppContext,
    principal: &Principal,
    gateway: &G,
    group_id: i64,
    plan_id: Option<i64>,
) -> Result<Renewal>
where
    G: PaymentGateway + ?Sized,
{
    principal.require(&[Role::Admin, Role::GroupAdmin], "renew subscriptions")?;
    let group = scope::group_for(&ctx.database, principal, group_id, Access::Manage).await?;
    let root_id = group.root_id();
    let plan = renewal_plan(ctx, plan_id).await?;

    let order = gateway
        .create_order(plan.price, &format!("group-{root_id}"))
        .await?;

    let _guard = ctx.locks.lock(LockKey::Group(root_id)).await;
    let txn = ctx.database.begin().await?;

    let existing = GroupSubscription::find()
        .filter(group_subscription::Column::GroupId.eq(root_id))
        .one(&txn)
        .await?;
    let subscription = match existing {
        Some(existing) => {
            let mut active: group_subscription::ActiveModel = existing.into();
            active.pending_order_id = Set(Some(order.order_id.clone()));
            active.pending_plan_id = Set(Some(plan.id));
            active.update(&txn).await?
        }
        None => {
            group_subscription::ActiveModel {
                group_id: Set(root_id),
                plan_id: Set(plan.id),
                start_date: Set(None),
                end_date: Set(None),
                is_active: Set(false),
                pending_order_id: Set(Some(order.order_id.clone())),
                pending_plan_id: Set(Some(plan.id)),
                ..Default::default()
            }
            .insert(&txn)
            .await?
        }
    };
    txn.commit().await?;

    tracing::info!(group_id = root_id, order_id = %order.order_id, plan = %plan.name, "Renewal started");
    Ok(Renewal {
        subscription,
        plan,
        order,
    })
}

/// A confirmed renewal.
#[derive(Debug, Clone)]
pub struct RenewalReceipt {
    pub subscription: group_subscription::Model,
    /// Subscription-funding payment appended to the ledger
    pub payment: payment::Model,
    pub delivery: Delivery,
}

/// Handles the gateway callback: verifies it, activates the subscription on the pending
/// plan from `now` and records the funding payment. An order can be confirmed once.
pub async fn confirm_renewal<G>(
    ctx: &AppContext,
    gateway: &G,
    callback: &GatewayCallback,
    now: DateTime<Utc>,
) -> Result<RenewalReceipt>
where
    G: PaymentGateway + ?Sized,
{
    if !gateway.verify(callback).await? {
        tracing::warn!(order_id = %callback.order_id, "Rejected unverified gateway callback");
        return Err(Error::Gateway {
            message: "payment verification failed".to_string(),
        });
    }

    let find_pending = || {
        GroupSubscription::find()
            .filter(group_subscription::Column::PendingOrderId.eq(callback.order_id.as_str()))
    };
    let group_id = find_pending()
        .one(&ctx.database)
        .await?
        .ok_or_else(|| Error::not_found("order", &callback.order_id))?
        .group_id;

    let _guard = ctx.locks.lock(LockKey::Group(group_id)).await;
    let txn = ctx.database.begin().await?;

    let pending = find_pending()
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("order", &callback.order_id))?;
    let plan_id = pending.pending_plan_id.unwrap_or(pending.plan_id);
    let plan = SubscriptionPlan::find_by_id(plan_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("plan", plan_id))?;

    let activated = subscription::activate_in(&txn, pending, &plan, now).await?;

    let payment = payment::ActiveModel {
        membership_id: Set(None),
        group_id: Set(group_id),
        collector_id: Set(None),
        amount: Set(plan.price),
        paid_date: Set(now.date_naive()),
        method: Set(PaymentMethod::Gateway),
        status: Set(PaymentStatus::Success),
        subscription_plan_id: Set(Some(plan.id)),
        subscription_start: Set(activated.start_date.map(|d| d.date_naive())),
        subscription_end: Set(activated.end_date.map(|d| d.date_naive())),
        transaction_id: Set(new_transaction_id()),
        invoice_number: Set(new_invoice_number(now.date_naive())),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let group = Group::find_by_id(group_id)
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("group", group_id))?;
    let owner = Account::find_by_id(group.owner_id).one(&txn).await?;
    txn.commit().await?;

    tracing::info!(
        group_id,
        payment_id = %callback.payment_id,
        plan = %plan.name,
        end = ?activated.end_date,
        "Subscription renewed"
    );

    let delivery = owner.map_or(Delivery::Dropped, |owner| {
        ctx.outbox.emit(Notification::SubscriptionActivated {
            recipient: owner.username,
            group_name: group.name.clone(),
            plan_name: plan.name.clone(),
            end_date: activated.end_date,
        })
    });

    Ok(RenewalReceipt {
        subscription: activated,
        payment,
        delivery,
    })
}
