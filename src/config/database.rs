//! Database configuration module.
//!
//! Handles the `SQLite` connection and table creation using `SeaORM`. Tables are generated
//! from the entity definitions with `Schema::create_table_from_entity`, so the schema
//! always matches the Rust structs. The composite unique indexes that back the rotation
//! invariants are created here as well.

use crate::entities::{
    Account, Auction, Group, GroupSubscription, Member, Membership, Payment, SubscriptionPlan,
    auction, membership,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/chitti.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable, falling back to
/// `configured` and then to a local `SQLite` file.
#[must_use]
pub fn get_database_url(configured: Option<&str>) -> String {
    std::env::var("DATABASE_URL")
        .ok()
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    Database::connect(database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

/// Creates all tables and the composite unique indexes. Safe to call on every start.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    create_table(db, Account).await?;
    create_table(db, SubscriptionPlan).await?;
    create_table(db, Group).await?;
    create_table(db, GroupSubscription).await?;
    create_table(db, Member).await?;
    create_table(db, Membership).await?;
    create_table(db, Payment).await?;
    create_table(db, Auction).await?;

    let builder = db.get_database_backend();

    // One auction per month number, one holder per token
    let auction_month = Index::create()
        .name("idx_auctions_group_month_no")
        .table(Auction)
        .col(auction::Column::GroupId)
        .col(auction::Column::MonthNo)
        .unique()
        .if_not_exists()
        .to_owned();
    let membership_token = Index::create()
        .name("idx_memberships_group_token_no")
        .table(Membership)
        .col(membership::Column::GroupId)
        .col(membership::Column::TokenNo)
        .unique()
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&auction_month)).await?;
    db.execute(builder.build(&membership_token)).await?;

    Ok(())
}
