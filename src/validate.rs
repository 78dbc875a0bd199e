//! Field-level validation for credential forms. Every check is pure and
//! synchronous; a form-level pass runs each relevant check independently and
//! assembles a fresh [`FieldErrors`] map per submission attempt. The session
//! manager never validates; callers are trusted to run these first.

use regex::Regex;
use std::collections::BTreeMap;

/// Shape check only; deliverability is the authority's problem.
const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

const PASSWORD_MIN_LEN: usize = 8;
const NAME_MIN_LEN: usize = 2;

/// A single field-level validation defect, with a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Defect {
    #[error("this field is required")]
    Required,
    #[error("enter a valid email address")]
    InvalidFormat,
    #[error("must be at least {0} characters")]
    TooShort(usize),
    #[error("must contain at least one uppercase letter")]
    MissingUppercase,
    #[error("must contain at least one lowercase letter")]
    MissingLowercase,
    #[error("must contain at least one number")]
    MissingDigit,
    #[error("passwords do not match")]
    Mismatch,
}

/// The form fields a defect can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Field {
    Name,
    Email,
    Password,
    Confirmation,
}

/// Per-submission map from field to defect. An absent entry means the field
/// is valid. Each submission attempt builds a new map from scratch; maps are
/// never merged with a previous attempt.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<Field, Defect>);

impl FieldErrors {
    /// True when every checked field came back valid.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<Defect> {
        self.0.get(&field).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, Defect)> + '_ {
        self.0.iter().map(|(field, defect)| (*field, *defect))
    }

    fn record(&mut self, field: Field, check: Result<(), Defect>) {
        if let Err(defect) = check {
            self.0.insert(field, defect);
        }
    }
}

/// Basic email format check.
///
/// # Errors
/// `Required` when empty, `InvalidFormat` when the value does not look like
/// `local@domain.tld`.
pub fn validate_email(value: &str) -> Result<(), Defect> {
    if value.is_empty() {
        return Err(Defect::Required);
    }
    let matched = Regex::new(EMAIL_PATTERN).is_ok_and(|regex| regex.is_match(value));
    if matched {
        Ok(())
    } else {
        Err(Defect::InvalidFormat)
    }
}

/// Password policy check. Composition rules are evaluated in a fixed order
/// (uppercase, lowercase, digit) and only the first violation is reported, so
/// callers see at most one password defect per attempt.
///
/// # Errors
/// `Required`, `TooShort`, or the first missing character class.
pub fn validate_password(value: &str) -> Result<(), Defect> {
    if value.is_empty() {
        return Err(Defect::Required);
    }
    if value.chars().count() < PASSWORD_MIN_LEN {
        return Err(Defect::TooShort(PASSWORD_MIN_LEN));
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Defect::MissingUppercase);
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(Defect::MissingLowercase);
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        return Err(Defect::MissingDigit);
    }
    Ok(())
}

/// # Errors
/// `Required` when empty, `TooShort` below two characters.
pub fn validate_name(value: &str) -> Result<(), Defect> {
    if value.is_empty() {
        return Err(Defect::Required);
    }
    if value.chars().count() < NAME_MIN_LEN {
        return Err(Defect::TooShort(NAME_MIN_LEN));
    }
    Ok(())
}

/// # Errors
/// `Required` when the confirmation is empty, `Mismatch` when it differs
/// from the password.
pub fn validate_confirmation(password: &str, confirmation: &str) -> Result<(), Defect> {
    if confirmation.is_empty() {
        return Err(Defect::Required);
    }
    if confirmation != password {
        return Err(Defect::Mismatch);
    }
    Ok(())
}

/// Field map for the login form.
#[must_use]
pub fn validate_login(email: &str, password: &str) -> FieldErrors {
    let mut errors = FieldErrors::default();
    errors.record(Field::Email, validate_email(email));
    errors.record(Field::Password, validate_password(password));
    errors
}

/// Field map for the registration form.
#[must_use]
pub fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
    confirmation: &str,
) -> FieldErrors {
    let mut errors = FieldErrors::default();
    errors.record(Field::Name, validate_name(name));
    errors.record(Field::Email, validate_email(email));
    errors.record(Field::Password, validate_password(password));
    errors.record(
        Field::Confirmation,
        validate_confirmation(password, confirmation),
    );
    errors
}

/// Field map for the forgot-password form.
#[must_use]
pub fn validate_reset_request(email: &str) -> FieldErrors {
    let mut errors = FieldErrors::default();
    errors.record(Field::Email, validate_email(email));
    errors
}

/// Field map for the reset-password form. The reset token itself is a
/// precondition checked by the session manager, not a form field.
#[must_use]
pub fn validate_reset(password: &str, confirmation: &str) -> FieldErrors {
    let mut errors = FieldErrors::default();
    errors.record(Field::Password, validate_password(password));
    errors.record(
        Field::Confirmation,
        validate_confirmation(password, confirmation),
    );
    errors
}
