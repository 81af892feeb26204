//! Seeds the subscription plan catalog from configuration.

use crate::config::settings::PlanConfig;
use crate::entities::{SubscriptionPlan, subscription_plan};
use crate::errors::Result;
use sea_orm::{QueryOrder, Set, prelude::*};

/// Inserts every configured plan whose name is not in the catalog yet.
///
/// Existing plans are left untouched so that price changes made by the platform admin
/// survive restarts. Returns the number of plans inserted.
pub async fn seed_plans(db: &DatabaseConnection, plans: &[PlanConfig]) -> Result<usize> {
    let mut inserted = 0;
    for plan in plans {
        let existing = SubscriptionPlan::find()
            .filter(subscription_plan::Column::Name.eq(plan.name.as_str()))
            .one(db)
            .await?;
        if existing.is_some() {
            continue;
        }

        subscription_plan::ActiveModel {
            name: Set(plan.name.clone()),
            price: Set(plan.price),
            duration_days: Set(plan.duration_days),
            max_members: Set(plan.max_members),
            max_groups: Set(plan.max_groups),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await?;
        inserted += 1;
    }

    if inserted > 0 {
        tracing::info!("Seeded {} subscription plans", inserted);
    }
    Ok(inserted)
}

/// Looks up an active plan by name.
pub async fn find_active_plan<C>(db: &C, name: &str) -> Result<Option<subscription_plan::Model>>
where
    C: ConnectionTrait,
{
    SubscriptionPlan::find()
        .filter(subscription_plan::Column::Name.eq(name))
        .filter(subscription_plan::Column::IsActive.eq(true))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All active plans, cheapest first.
pub async fn active_plans(db: &DatabaseConnection) -> Result<Vec<subscription_plan::Model>> {
    SubscriptionPlan::find()
        .filter(subscription_plan::Column::IsActive.eq(true))
        .order_by_asc(subscription_plan::Column::Price)
        .all(db)
        .await
        .map_err(Into::into)
}
