//! Accounts - registration, principal resolution, and the platform admin's block switch.

use crate::{
    core::principal::{Principal, Role},
    entities::{Account, account},
    errors::{Error, Result},
};
use sea_orm::{Set, prelude::*};

/// Registers a new account. Usernames are trimmed and must be unique.
pub async fn register_account<C>(db: &C, username: &str, role: Role) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    register_account_with_hash(db, username, role, None).await
}

pub(crate) async fn register_account_with_hash<C>(
    db: &C,
    username: &str,
    role: Role,
    password_hash: Option<String>,
) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let username = username.trim();
    if username.is_empty() {
        return Err(Error::validation("username", "cannot be empty"));
    }

    let taken = Account::find()
        .filter(account::Column::Username.eq(username))
        .one(db)
        .await?
        .is_some();
    if taken {
        return Err(Error::validation(
            "username",
            format!("`{username}` is already registered"),
        ));
    }

    let model = account::ActiveModel {
        username: Set(username.to_string()),
        role: Set(role),
        is_blocked: Set(false),
        password_hash: Set(password_hash),
        created_at: Set(chrono::Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(account_id = model.id, role = ?role, "Account registered");
    Ok(model)
}

/// Resolves the principal for `account_id`. Blocked accounts are refused here, once,
/// so that no core operation has to re-check.
pub async fn resolve_principal(db: &DatabaseConnection, account_id: i64) -> Result<Principal> {
    let account = Account::find_by_id(account_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("account", account_id))?;

    if account.is_blocked {
        return Err(Error::AccountBlocked { account_id });
    }
    Ok(Principal::new(account.id, account.role))
}

async fn set_blocked(
    db: &DatabaseConnection,
    principal: &Principal,
    account_id: i64,
    blocked: bool,
) -> Result<account::Model> {
    principal.require(&[Role::Admin], "block accounts")?;

    let account = Account::find_by_id(account_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("account", account_id))?;
    if account.role == Role::Admin {
        return Err(Error::PermissionDenied {
            action: "block platform admins",
        });
    }

    let mut active: account::ActiveModel = account.into();
    active.is_blocked = Set(blocked);
    let updated = active.update(db).await?;
    tracing::info!(account_id, blocked, "Account block flag changed");
    Ok(updated)
}

/// Blocks an account. Platform admins only; other admins cannot be blocked.
pub async fn block_account(
    db: &DatabaseConnection,
    principal: &Principal,
    account_id: i64,
) -> Result<account::Model> {
    set_blocked(db, principal, account_id, true).await
}

/// Lifts a block set by [`block_account`].
pub async fn unblock_account(
    db: &DatabaseConnection,
    principal: &Principal,
    account_id: i64,
) -> Result<account::Model> {
    set_blocked(db, principal, account_id, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_blanks() -> Result<()> {
        let db = setup_test_db().await?;

        let owner = register_account(&db, "  owner1 ", Role::GroupAdmin).await?;
        assert_eq!(owner.username, "owner1");
        assert!(!owner.is_blocked);

        let dup = register_account(&db, "owner1", Role::Collector).await;
        assert!(matches!(
            dup,
            Err(Error::Validation {
                field: "username",
                ..
            })
        ));

        let blank = register_account(&db, "   ", Role::Member).await;
        assert!(matches!(blank, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_blocked_accounts_cannot_resolve() -> Result<()> {
        let db = setup_test_db().await?;
        let admin = register_account(&db, "root", Role::Admin).await?;
        let owner = register_account(&db, "owner", Role::GroupAdmin).await?;
        let admin = resolve_principal(&db, admin.id).await?;

        let principal = resolve_principal(&db, owner.id).await?;
        assert_eq!(principal.role, Role::GroupAdmin);

        block_account(&db, &admin, owner.id).await?;
        assert!(matches!(
            resolve_principal(&db, owner.id).await,
            Err(Error::AccountBlocked { .. })
        ));

        unblock_account(&db, &admin, owner.id).await?;
        assert!(resolve_principal(&db, owner.id).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_only_admins_block_and_admins_are_not_blockable() -> Result<()> {
        let db = setup_test_db().await?;
        let admin = register_account(&db, "root", Role::Admin).await?;
        let owner = register_account(&db, "owner", Role::GroupAdmin).await?;
        let admin_principal = Principal::new(admin.id, Role::Admin);
        let owner_principal = Principal::new(owner.id, Role::GroupAdmin);

        assert!(matches!(
            block_account(&db, &owner_principal, admin.id).await,
            Err(Error::PermissionDenied { .. })
        ));
        assert!(matches!(
            block_account(&db, &admin_principal, admin.id).await,
            Err(Error::PermissionDenied { .. })
        ));
        assert!(matches!(
            resolve_principal(&db, 999).await,
            Err(Error::NotFound { .. })
        ));
        Ok(())
    }
}
