use tracing::{info, warn};

use crate::auth::{
    dto::SignupRequest,
    password::hash_password,
    repo::UserStore,
    repo_types::{CreateUserError, IdentityField, NewUser, User},
    validation::{validate_signup, FieldError, FieldErrors},
};
use crate::error::AppError;

/// Validate a signup, hash the password, and persist the user.
pub async fn register_user(store: &dyn UserStore, req: &SignupRequest) -> Result<User, AppError> {
    let signup = validate_signup(req).map_err(|errors| {
        warn!(fields = ?errors.fields().collect::<Vec<_>>(), "signup validation failed");
        AppError::Validation(errors)
    })?;

    // Report taken fields up front; the store's constraints still guard races.
    let mut taken = FieldErrors::default();
    if store.find_by_username(&signup.username).await?.is_some() {
        taken.add("username", FieldError::Duplicate(IdentityField::Username));
    }
    if store.find_by_email_ci(&signup.email).await?.is_some() {
        taken.add("email", FieldError::Duplicate(IdentityField::Email));
    }
    if !taken.is_empty() {
        warn!(fields = ?taken.fields().collect::<Vec<_>>(), "signup identity already registered");
        return Err(AppError::DuplicateIdentity(taken));
    }

    let password_hash = hash_password(&signup.password)?;
    let user = store
        .create(NewUser {
            username: signup.username,
            email: signup.email,
            password_hash,
            phone: signup.phone,
            full_name: signup.full_name,
        })
        .await
        .map_err(|e| match e {
            CreateUserError::Duplicate(field) => {
                warn!(field = field.as_str(), "signup lost a uniqueness race");
                AppError::DuplicateIdentity(FieldErrors::single(
                    field.as_str(),
                    FieldError::Duplicate(field),
                ))
            }
            CreateUserError::Other(e) => AppError::Internal(e),
        })?;

    info!(user_id = %user.id, "user registered");
    Ok(user)
}
