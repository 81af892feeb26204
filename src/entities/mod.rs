//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod account;
pub mod auction;
pub mod group;
pub mod group_subscription;
pub mod member;
pub mod membership;
pub mod payment;
pub mod subscription_plan;

// Re-export specific types to avoid conflicts
pub use account::{Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use auction::{Column as AuctionColumn, Entity as Auction, Model as AuctionModel};
pub use group::{Column as GroupColumn, Entity as Group, Model as GroupModel};
pub use group_subscription::{
    Column as GroupSubscriptionColumn, Entity as GroupSubscription,
    Model as GroupSubscriptionModel,
};
pub use member::{Column as MemberColumn, Entity as Member, Model as MemberModel};
pub use membership::{Column as MembershipColumn, Entity as Membership, Model as MembershipModel};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel};
pub use subscription_plan::{
    Column as SubscriptionPlanColumn, Entity as SubscriptionPlan, Model as SubscriptionPlanModel,
};
