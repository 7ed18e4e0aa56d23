use std::sync::Mutex;

use axum::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::errors::StoreError;
use crate::auth::repo_types::{FieldValue, User, UserField, UserFilter, UserUpdate};

/// Persistence seam for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user. Constraint violations (duplicate email) abort the
    /// statement whole; no partial row survives.
    async fn add_user(&self, email: &str, hashed_password: &str) -> Result<User, StoreError>;

    /// First record matching every clause of `filter`, `NotFound` otherwise.
    /// Row order among multiple matches is unspecified.
    async fn find_user_by(&self, filter: &UserFilter) -> Result<User, StoreError>;

    /// Apply all staged changes to one row in a single statement.
    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id, email, hashed_password, session_id, reset_token, created_at";

/// Postgres-backed store. The pool is built by the caller and handed in
/// whole; the store never opens connections on its own.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn add_user(&self, email: &str, hashed_password: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, hashed_password)
            VALUES ($1, $2)
            RETURNING id, email, hashed_password, session_id, reset_token, created_at
            "#,
        )
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by(&self, filter: &UserFilter) -> Result<User, StoreError> {
        if filter.is_empty() {
            // An unconstrained filter would match the whole table.
            return Err(StoreError::InvalidFilter("empty filter".into()));
        }
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users"));
        let mut sep = " WHERE ";
        for (field, value) in filter.clauses() {
            query.push(sep);
            sep = " AND ";
            query.push(field.column());
            match value {
                FieldValue::Null => {
                    query.push(" IS NULL");
                }
                FieldValue::Uuid(id) => {
                    query.push(" = ");
                    query.push_bind(*id);
                }
                FieldValue::Text(text) => {
                    query.push(" = ");
                    query.push_bind(text.clone());
                }
            }
        }
        query.push(" LIMIT 1");

        let user = query
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await?;
        user.ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Err(StoreError::InvalidField("empty update".into()));
        }
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut first = true;
        for (field, value) in update.changes() {
            if !first {
                query.push(", ");
            }
            first = false;
            query.push(field.column());
            query.push(" = ");
            match value {
                FieldValue::Null => {
                    query.push("NULL");
                }
                FieldValue::Uuid(v) => {
                    query.push_bind(*v);
                }
                FieldValue::Text(text) => {
                    query.push_bind(text.clone());
                }
            }
        }
        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// In-process store with the same contract as `PgUserStore` (unique email,
/// schema-checked filters and updates). Backs `AppState::fake()` and the
/// unit tests.
#[derive(Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn clause_matches(user: &User, field: UserField, value: &FieldValue) -> bool {
    match (field, value) {
        (UserField::Id, FieldValue::Uuid(id)) => user.id == *id,
        (UserField::Email, FieldValue::Text(v)) => user.email == *v,
        (UserField::HashedPassword, FieldValue::Text(v)) => user.hashed_password == *v,
        (UserField::SessionId, FieldValue::Text(v)) => user.session_id.as_deref() == Some(v.as_str()),
        (UserField::SessionId, FieldValue::Null) => user.session_id.is_none(),
        (UserField::ResetToken, FieldValue::Text(v)) => user.reset_token.as_deref() == Some(v.as_str()),
        (UserField::ResetToken, FieldValue::Null) => user.reset_token.is_none(),
        _ => false,
    }
}

fn apply_change(user: &mut User, field: UserField, value: &FieldValue) -> Result<(), StoreError> {
    match (field, value) {
        (UserField::HashedPassword, FieldValue::Text(v)) => user.hashed_password = v.clone(),
        // Mirrors the NOT NULL constraint on the real column.
        (UserField::HashedPassword, _) => {
            return Err(StoreError::Failure("hashed_password must not be null".into()))
        }
        (UserField::SessionId, FieldValue::Text(v)) => user.session_id = Some(v.clone()),
        (UserField::SessionId, FieldValue::Null) => user.session_id = None,
        (UserField::ResetToken, FieldValue::Text(v)) => user.reset_token = Some(v.clone()),
        (UserField::ResetToken, FieldValue::Null) => user.reset_token = None,
        _ => return Err(StoreError::InvalidField(field.column().to_string())),
    }
    Ok(())
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn add_user(&self, email: &str, hashed_password: &str) -> Result<User, StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Failure("user table lock poisoned".into()))?;
        if rows.iter().any(|u| u.email == email) {
            return Err(StoreError::Failure(format!("duplicate email: {email}")));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            session_id: None,
            reset_token: None,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(user.clone());
        Ok(user)
    }

    async fn find_user_by(&self, filter: &UserFilter) -> Result<User, StoreError> {
        if filter.is_empty() {
            return Err(StoreError::InvalidFilter("empty filter".into()));
        }
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Failure("user table lock poisoned".into()))?;
        rows.iter()
            .find(|user| {
                filter
                    .clauses()
                    .iter()
                    .all(|(field, value)| clause_matches(user, *field, value))
            })
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<(), StoreError> {
        if update.is_empty() {
            return Err(StoreError::InvalidField("empty update".into()));
        }
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Failure("user table lock poisoned".into()))?;
        let user = rows
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(StoreError::NotFound)?;

        // Stage on a scratch copy so a rejected change leaves the row intact.
        let mut staged = user.clone();
        for (field, value) in update.changes() {
            apply_change(&mut staged, *field, value)?;
        }
        *user = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_find_by_email() {
        let store = MemoryUserStore::new();
        let user = store.add_user("a@x.com", "hash-a").await.expect("insert");
        let found = store
            .find_user_by(&UserFilter::by_email("a@x.com"))
            .await
            .expect("lookup");
        assert_eq!(found.id, user.id);
        assert_eq!(found.hashed_password, "hash-a");
        assert!(found.session_id.is_none());
        assert!(found.reset_token.is_none());
    }

    #[tokio::test]
    async fn duplicate_email_fails_and_keeps_one_row() {
        let store = MemoryUserStore::new();
        store.add_user("a@x.com", "hash-a").await.expect("insert");
        let err = store.add_user("a@x.com", "hash-b").await.unwrap_err();
        assert!(matches!(err, StoreError::Failure(_)));

        let found = store
            .find_user_by(&UserFilter::by_email("a@x.com"))
            .await
            .expect("lookup");
        assert_eq!(found.hashed_password, "hash-a");
    }

    #[tokio::test]
    async fn find_misses_with_not_found() {
        let store = MemoryUserStore::new();
        let err = store
            .find_user_by(&UserFilter::by_email("ghost@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn empty_filter_is_rejected_before_querying() {
        let store = MemoryUserStore::new();
        store.add_user("a@x.com", "hash-a").await.expect("insert");
        let err = store.find_user_by(&UserFilter::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn find_by_multiple_clauses() {
        let store = MemoryUserStore::new();
        let user = store.add_user("a@x.com", "hash-a").await.expect("insert");
        store
            .update_user(user.id, &UserUpdate::new().session_id(Some("sess-1")))
            .await
            .expect("update");

        let filter = UserFilter::from_pairs([("email", "a@x.com"), ("session_id", "sess-1")])
            .expect("valid filter");
        let found = store.find_user_by(&filter).await.expect("lookup");
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn update_persists_all_supplied_fields() {
        let store = MemoryUserStore::new();
        let user = store.add_user("a@x.com", "hash-a").await.expect("insert");
        store
            .update_user(
                user.id,
                &UserUpdate::new().hashed_password("hash-b").reset_token(None),
            )
            .await
            .expect("update");

        let found = store
            .find_user_by(&UserFilter::by_id(user.id))
            .await
            .expect("lookup");
        assert_eq!(found.hashed_password, "hash-b");
        assert!(found.reset_token.is_none());
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let store = MemoryUserStore::new();
        let err = store
            .update_user(Uuid::new_v4(), &UserUpdate::new().session_id(None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn unknown_update_field_fails_and_leaves_row_unchanged() {
        let store = MemoryUserStore::new();
        let user = store.add_user("a@x.com", "hash-a").await.expect("insert");

        let err = UserUpdate::from_pairs([("no_such_field", Some("x"))]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidField(_)));

        // A change-set that fails validation mid-apply must not leak partials.
        let mut update = UserUpdate::new().session_id(Some("sess-1"));
        update
            .set(UserField::HashedPassword, FieldValue::Null)
            .expect("mutable column stages fine");
        let err = store.update_user(user.id, &update).await.unwrap_err();
        assert!(matches!(err, StoreError::Failure(_)));

        let found = store
            .find_user_by(&UserFilter::by_id(user.id))
            .await
            .expect("lookup");
        assert!(found.session_id.is_none());
        assert_eq!(found.hashed_password, "hash-a");
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let store = MemoryUserStore::new();
        let user = store.add_user("a@x.com", "hash-a").await.expect("insert");
        let err = store
            .update_user(user.id, &UserUpdate::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidField(_)));
    }
}
