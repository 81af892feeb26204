//! Error types shared by every layer of the crate.
//!
//! Domain rejections (validation, quota, conflict, ownership) are ordinary variants that a
//! boundary translates into a structured rejection through [`Error::kind`] and
//! [`Error::reason_code`]. Only [`Error::Database`] is fatal to a request.

use chrono::NaiveDate;
use sea_orm::DbErr;
use thiserror::Error;

/// Every failure the engine can report.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, reported with the offending field
    #[error("Invalid value for `{field}`: {message}")]
    Validation {
        /// Name of the rejected input field
        field: &'static str,
        /// Human-readable reason
        message: String,
    },

    /// The root group has no subscription that is valid right now
    #[error("No active subscription for this group")]
    NoActiveSubscription,

    /// The owner already has as many groups as the plan allows
    #[error("Group limit reached: plan allows {max_groups} groups")]
    GroupLimitReached {
        /// Plan ceiling
        max_groups: i32,
    },

    /// The group already has as many members as the plan allows
    #[error("Member limit reached: plan allows {max_members} members")]
    MemberLimitReached {
        /// Plan ceiling
        max_members: i32,
    },

    #[error("Membership {membership_id} already paid for {year}-{month:02}")]
    DuplicatePayment {
        /// Membership that already paid
        membership_id: i64,
        /// Calendar year of the payment
        year: i32,
        /// Calendar month of the payment
        month: u32,
    },

    #[error("An auction already exists for {year}-{month:02}")]
    DuplicateMonthAuction {
        /// Calendar year of the auction date
        year: i32,
        /// Calendar month of the auction date
        month: u32,
    },

    #[error("Auction limit reached: group runs for {duration_months} months")]
    AuctionLimitReached {
        /// Group duration, which bounds the auction count
        duration_months: i32,
    },

    #[error("Auction date {date} is outside the group window {start} .. {end}")]
    AuctionDateOutOfRange {
        /// Requested auction date
        date: NaiveDate,
        /// First day of the group window
        start: NaiveDate,
        /// First day after the group window
        end: NaiveDate,
    },

    #[error("Auction {auction_id} is already closed")]
    AuctionAlreadyClosed {
        /// Auction that already has a winner
        auction_id: i64,
    },

    #[error("Membership {membership_id} does not belong to group {group_id}")]
    WrongGroup {
        /// Offending membership
        membership_id: i64,
        /// Group of the auction
        group_id: i64,
    },

    #[error("Membership {membership_id} is {status} and cannot win")]
    IneligibleMember {
        /// Offending membership
        membership_id: i64,
        /// Current evaluated status
        status: String,
    },

    #[error("No eligible members left for auction {auction_id}")]
    NoEligibleMembers {
        /// Auction being spun
        auction_id: i64,
    },

    /// Record is missing or belongs to another tenant; both look the same to the caller
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Requested identifier
        id: String,
    },

    /// The principal's role may not perform this action at all
    #[error("Permission denied: {action}")]
    PermissionDenied {
        /// Action that was attempted
        action: &'static str,
    },

    #[error("Account {account_id} is blocked")]
    AccountBlocked {
        /// Blocked account
        account_id: i64,
    },

    #[error("Subscriptions can only be attached to a root group (group {group_id} has a parent)")]
    SubscriptionRequiresRootGroup {
        /// Sub-group that was targeted
        group_id: i64,
    },

    #[error("Group {group_id} has payment history and cannot be deleted")]
    GroupHasPaymentHistory {
        /// Group that still has payments
        group_id: i64,
    },

    /// Payment gateway unreachable or returned an unusable answer
    #[error("Payment gateway error: {message}")]
    Gateway {
        /// Gateway-provided detail
        message: String,
    },

    /// Notification transport failed; never used to roll back a committed change
    #[error("Notification error: {message}")]
    Notification {
        /// Transport-provided detail
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong while loading configuration
        message: String,
    },

    #[error("Credential error: {0}")]
    Credential(#[from] bcrypt::BcryptError),

    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// Coarse classification used at the boundary to pick a rejection shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, nothing was changed
    Validation,
    /// Quota or subscription policy refused the request
    Policy,
    /// Request conflicts with existing state; retrying the same input will fail again
    Conflict,
    /// Missing record or record owned by someone else
    NotFound,
    /// A collaborator (gateway, notification transport) failed
    External,
    /// Persistence or configuration failure
    Internal,
}

impl Error {
    /// Shorthand for a validation error on `field`.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Shorthand for a not-found error.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Classifies the error into the rejection taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NoActiveSubscription
            | Self::GroupLimitReached { .. }
            | Self::MemberLimitReached { .. }
            | Self::PermissionDenied { .. }
            | Self::AccountBlocked { .. }
            | Self::IneligibleMember { .. }
            | Self::SubscriptionRequiresRootGroup { .. } => ErrorKind::Policy,
            Self::DuplicatePayment { .. }
            | Self::DuplicateMonthAuction { .. }
            | Self::AuctionLimitReached { .. }
            | Self::AuctionDateOutOfRange { .. }
            | Self::AuctionAlreadyClosed { .. }
            | Self::WrongGroup { .. }
            | Self::NoEligibleMembers { .. }
            | Self::GroupHasPaymentHistory { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Gateway { .. } | Self::Notification { .. } => ErrorKind::External,
            Self::Config { .. } | Self::Credential(_) | Self::Database(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for the rejection.
    #[must_use]
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NoActiveSubscription => "no_active_subscription",
            Self::GroupLimitReached { .. } => "group_limit_reached",
            Self::MemberLimitReached { .. } => "member_limit_reached",
            Self::DuplicatePayment { .. } => "duplicate_month_payment",
            Self::DuplicateMonthAuction { .. } => "duplicate_month_auction",
            Self::AuctionLimitReached { .. } => "auction_limit_reached",
            Self::AuctionDateOutOfRange { .. } => "auction_date_out_of_range",
            Self::AuctionAlreadyClosed { .. } => "auction_already_closed",
            Self::WrongGroup { .. } => "wrong_group",
            Self::IneligibleMember { .. } => "ineligible_member",
            Self::NoEligibleMembers { .. } => "no_eligible_members",
            Self::NotFound { .. } => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::AccountBlocked { .. } => "account_blocked",
            Self::SubscriptionRequiresRootGroup { .. } => "subscription_requires_root_group",
            Self::GroupHasPaymentHistory { .. } => "group_has_payment_history",
            Self::Gateway { .. } => "gateway_failure",
            Self::Notification { .. } => "notification_failure",
            Self::Config { .. } | Self::Credential(_) | Self::Database(_) => "internal",
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
