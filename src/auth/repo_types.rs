use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::errors::StoreError;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,                      // unique user ID, assigned by the store
    pub email: String,                 // user email, unique
    #[serde(skip_serializing)]
    pub hashed_password: String,       // Argon2 PHC string, not exposed in JSON
    pub session_id: Option<String>,    // present iff a session is active
    pub reset_token: Option<String>,   // present iff a password reset is pending
    pub created_at: OffsetDateTime,    // creation timestamp
}

/// Columns of the `users` table that filters and updates may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Id,
    Email,
    HashedPassword,
    SessionId,
    ResetToken,
}

impl UserField {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "email" => Some(Self::Email),
            "hashed_password" => Some(Self::HashedPassword),
            "session_id" => Some(Self::SessionId),
            "reset_token" => Some(Self::ResetToken),
            _ => None,
        }
    }

    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Email => "email",
            Self::HashedPassword => "hashed_password",
            Self::SessionId => "session_id",
            Self::ResetToken => "reset_token",
        }
    }

    /// Whether `update_user` may write this column.
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::HashedPassword | Self::SessionId | Self::ResetToken)
    }
}

/// A value bound into a filter clause or an update assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Uuid(Uuid),
    Text(String),
    Null,
}

/// Equality clauses for a user lookup, validated against the table schema
/// before any query runs.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    clauses: Vec<(UserField, FieldValue)>,
}

impl UserFilter {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            clauses: vec![(UserField::Id, FieldValue::Uuid(id))],
        }
    }

    pub fn by_email(email: &str) -> Self {
        Self {
            clauses: vec![(UserField::Email, FieldValue::Text(email.to_string()))],
        }
    }

    pub fn by_session_id(session_id: &str) -> Self {
        Self {
            clauses: vec![(UserField::SessionId, FieldValue::Text(session_id.to_string()))],
        }
    }

    pub fn by_reset_token(token: &str) -> Self {
        Self {
            clauses: vec![(UserField::ResetToken, FieldValue::Text(token.to_string()))],
        }
    }

    /// Build a filter from dynamic `(name, value)` pairs. Unknown names fail
    /// fast with `InvalidFilter`; `id` values must parse as UUIDs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut clauses = Vec::new();
        for (name, value) in pairs {
            let field = UserField::parse(name)
                .ok_or_else(|| StoreError::InvalidFilter(name.to_string()))?;
            let value = match field {
                UserField::Id => Uuid::parse_str(value)
                    .map(FieldValue::Uuid)
                    .map_err(|_| StoreError::InvalidFilter(name.to_string()))?,
                _ => FieldValue::Text(value.to_string()),
            };
            clauses.push((field, value));
        }
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[(UserField, FieldValue)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// A change-set for `update_user`, restricted to the mutable columns. Every
/// name is validated before anything is staged, so a bad pair poisons the
/// whole set and nothing reaches the store.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    changes: Vec<(UserField, FieldValue)>,
}

impl UserUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hashed_password(mut self, hash: &str) -> Self {
        self.changes
            .push((UserField::HashedPassword, FieldValue::Text(hash.to_string())));
        self
    }

    pub fn session_id(mut self, session_id: Option<&str>) -> Self {
        let value = match session_id {
            Some(v) => FieldValue::Text(v.to_string()),
            None => FieldValue::Null,
        };
        self.changes.push((UserField::SessionId, value));
        self
    }

    pub fn reset_token(mut self, token: Option<&str>) -> Self {
        let value = match token {
            Some(v) => FieldValue::Text(v.to_string()),
            None => FieldValue::Null,
        };
        self.changes.push((UserField::ResetToken, value));
        self
    }

    /// Stage one assignment, rejecting immutable columns.
    pub fn set(&mut self, field: UserField, value: FieldValue) -> Result<(), StoreError> {
        if !field.is_mutable() {
            return Err(StoreError::InvalidField(field.column().to_string()));
        }
        self.changes.push((field, value));
        Ok(())
    }

    /// Build a change-set from dynamic `(name, value)` pairs; a `None` value
    /// clears the column.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut update = Self::new();
        for (name, value) in pairs {
            let field = UserField::parse(name)
                .ok_or_else(|| StoreError::InvalidField(name.to_string()))?;
            let value = match value {
                Some(v) => FieldValue::Text(v.to_string()),
                None => FieldValue::Null,
            };
            update.set(field, value)?;
        }
        Ok(update)
    }

    pub fn changes(&self) -> &[(UserField, FieldValue)] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
