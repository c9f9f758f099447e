/// First-admin bootstrap
///
/// Runs once at startup. If the store holds no admin, one is created from the
/// configured credentials; otherwise the configuration is ignored. Safe to run
/// from several instances at once: the store decides which insert wins.
use crate::config::BootstrapSettings;
use crate::db::CredentialStore;
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, Role};
use crate::security::password::hash_password_blocking;
use crate::validators;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// An admin already existed; nothing was written
    AlreadyInitialized,
    /// The configured admin account was created
    Created,
}

pub async fn ensure_admin(
    store: &dyn CredentialStore,
    settings: &BootstrapSettings,
) -> Result<BootstrapOutcome> {
    if store.count_users_with_role(Role::Admin).await? > 0 {
        info!("Admin account present, skipping bootstrap");
        return Ok(BootstrapOutcome::AlreadyInitialized);
    }

    let (Some(email), Some(password)) = (&settings.admin_email, &settings.admin_password) else {
        return Err(IdentityError::Config(
            "ADMIN_EMAIL and ADMIN_PASSWORD must be set when no admin account exists".to_string(),
        ));
    };
    validators::check_new_credentials(email, password)
        .map_err(|e| IdentityError::Config(format!("Bootstrap admin rejected: {}", e)))?;

    let password_hash = hash_password_blocking(password.clone()).await?;
    let created = match store
        .create_admin_if_absent(NewUser {
            email: email.clone(),
            password_hash,
            role: Role::Admin,
        })
        .await
    {
        Ok(created) => created,
        Err(IdentityError::UserAlreadyExists) => {
            return Err(IdentityError::Config(format!(
                "ADMIN_EMAIL {} already belongs to a non-admin account",
                email
            )));
        }
        Err(err) => return Err(err),
    };

    if created {
        info!(user = %email, "Bootstrap admin account created");
        Ok(BootstrapOutcome::Created)
    } else {
        info!("Admin account created concurrently, skipping bootstrap");
        Ok(BootstrapOutcome::AlreadyInitialized)
    }
}
