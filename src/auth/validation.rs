use std::collections::BTreeMap;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::auth::dto::SignupRequest;
use crate::auth::repo_types::IdentityField;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const USERNAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;
pub const FULL_NAME_MAX_LEN: usize = 255;
/// Leading `+` plus 20 characters.
pub const PHONE_MAX_LEN: usize = 21;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9 -]{8,20}$").unwrap();
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Optional leading `+`, then 8 to 20 digits, spaces or hyphens.
pub(crate) fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

/// Trim and lowercase the domain part. The local part keeps its case.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// Form used for lookups at login time.
pub fn normalize_login_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    Required,
    PasswordTooShort,
    InvalidEmailFormat,
    InvalidPhoneFormat,
    InvalidUsername,
    TooLong { max: usize },
    Duplicate(IdentityField),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Required => f.write_str("This field is required."),
            FieldError::PasswordTooShort => write!(
                f,
                "Ensure this field has at least {PASSWORD_MIN_LEN} characters."
            ),
            FieldError::InvalidEmailFormat => f.write_str("Enter a valid email address."),
            FieldError::InvalidPhoneFormat => f.write_str(
                "Enter a valid phone number: optional leading '+', then 8-20 digits, spaces or hyphens.",
            ),
            FieldError::InvalidUsername => f.write_str(
                "Enter a valid username. It may contain only letters, numbers, and @/./+/-/_ characters.",
            ),
            FieldError::TooLong { max } => {
                write!(f, "Ensure this field has no more than {max} characters.")
            }
            FieldError::Duplicate(field) => {
                write!(f, "A user with that {} already exists.", field.as_str())
            }
        }
    }
}

impl Serialize for FieldError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Per-field validation failures, serialized as `{field: [message, ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<FieldError>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, err: FieldError) {
        self.0.entry(field).or_default().push(err);
    }

    pub fn single(field: &'static str, err: FieldError) -> Self {
        let mut errors = Self::default();
        errors.add(field, err);
        errors
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }
}

/// A signup that passed every field rule. The password is still plaintext.
#[derive(Debug, Clone)]
pub struct ValidSignup {
    pub username: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub full_name: String,
}

fn required<'a>(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<&'a str>,
) -> Option<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.add(field, FieldError::Required);
            None
        }
    }
}

/// Check every field and collect all failures.
pub fn validate_signup(req: &SignupRequest) -> Result<ValidSignup, FieldErrors> {
    let mut errors = FieldErrors::default();

    let email = required(&mut errors, "email", req.email.as_deref()).map(normalize_email);
    if let Some(email) = &email {
        if email.chars().count() > EMAIL_MAX_LEN {
            errors.add("email", FieldError::TooLong { max: EMAIL_MAX_LEN });
        } else if !is_valid_email(email) {
            errors.add("email", FieldError::InvalidEmailFormat);
        }
    }

    let password = required(&mut errors, "password", req.password.as_deref());
    if let Some(password) = password {
        if password.chars().count() < PASSWORD_MIN_LEN {
            errors.add("password", FieldError::PasswordTooShort);
        }
    }

    let phone = req.phone.as_deref().map(str::trim).unwrap_or_default();
    if !phone.is_empty() && (phone.chars().count() > PHONE_MAX_LEN || !is_valid_phone(phone)) {
        errors.add("phone", FieldError::InvalidPhoneFormat);
    }

    let full_name = required(&mut errors, "full_name", req.full_name.as_deref()).map(str::trim);
    if let Some(name) = full_name {
        if name.chars().count() > FULL_NAME_MAX_LEN {
            errors.add("full_name", FieldError::TooLong { max: FULL_NAME_MAX_LEN });
        }
    }

    // A blank username falls back to the email address, which must then fit the
    // username column too.
    let username = match req.username.as_deref().map(str::trim) {
        Some(u) if !u.is_empty() => {
            if u.chars().count() > USERNAME_MAX_LEN {
                errors.add("username", FieldError::TooLong { max: USERNAME_MAX_LEN });
            } else if !is_valid_username(u) {
                errors.add("username", FieldError::InvalidUsername);
            }
            Some(u.to_string())
        }
        _ => {
            if let Some(email) = email.as_deref() {
                if email.chars().count() > USERNAME_MAX_LEN {
                    errors.add("username", FieldError::TooLong { max: USERNAME_MAX_LEN });
                }
            }
            email.clone()
        }
    };

    match (errors.is_empty(), username, email, password, full_name) {
        (true, Some(username), Some(email), Some(password), Some(full_name)) => Ok(ValidSignup {
            username,
            email,
            password: password.to_string(),
            phone: phone.to_string(),
            full_name: full_name.to_string(),
        }),
        _ => Err(errors),
    }
}
