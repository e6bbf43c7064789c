//! Handle account persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    Binary, NewProfile, NewUser, OrganizerProfile, ParticipantProfile, Role, User,
};
use crate::error::{Result, ServerError};

/// Port for account persistence operations.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert account, role and profile at once. Returns the new ID.
    async fn create(&self, user: &NewUser) -> Result<i64>;

    /// Find an account by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Find an account by ID.
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Every account, newest first.
    async fn list(&self) -> Result<Vec<User>>;

    /// Add a role to an existing account. No-op when already held.
    async fn add_role(&self, user_id: i64, role: Role) -> Result<()>;

    async fn participant_profile(
        &self,
        user_id: i64,
    ) -> Result<Option<ParticipantProfile>>;

    async fn organizer_profile(
        &self,
        user_id: i64,
    ) -> Result<Option<OrganizerProfile>>;

    async fn organizer_avatar(&self, user_id: i64) -> Result<Option<Binary>>;

    /// Returns `false` when the user has no organizer profile.
    async fn set_organizer_avatar(
        &self,
        user_id: i64,
        avatar: &Binary,
    ) -> Result<bool>;
}

#[derive(sqlx::FromRow)]
struct UserRecord {
    id: i64,
    email: String,
    password_hash: String,
    is_blocked: bool,
    created_at: DateTime<Utc>,
    roles: Vec<String>,
}

impl TryFrom<UserRecord> for User {
    type Error = ServerError;

    fn try_from(record: UserRecord) -> Result<Self> {
        let mut roles = record
            .roles
            .into_iter()
            .map(Role::try_from)
            .collect::<Result<Vec<_>>>()?;
        roles.sort();

        Ok(User {
            id: record.id,
            email: record.email,
            password_hash: record.password_hash,
            is_blocked: record.is_blocked,
            roles,
            created_at: record.created_at,
        })
    }
}

const SELECT_USER: &str = r#"
    SELECT
        u.id, u.email, u.password_hash, u.is_blocked, u.created_at,
        COALESCE(array_agg(r.role) FILTER (WHERE r.role IS NOT NULL), '{}') AS roles
    FROM users u
    LEFT JOIN user_roles r ON r.user_id = u.id
"#;

/// PostgreSQL account repository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new [`PgUserRepository`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_where(&self, clause: &str, bind: Bind<'_>) -> Result<Option<User>> {
        let query = format!("{SELECT_USER} WHERE {clause} GROUP BY u.id");
        let query = sqlx::query_as::<_, UserRecord>(&query);
        let query = match bind {
            Bind::Id(id) => query.bind(id),
            Bind::Email(email) => query.bind(email),
        };

        query
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

enum Bind<'a> {
    Id(i64),
    Email(&'a str),
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: &NewUser) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO users (email, password_hash) VALUES ($1, $2) RETURNING id"#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match ServerError::from(err) {
            ServerError::Conflict(_) => {
                ServerError::Conflict("email is already registered".into())
            },
            err => err,
        })?;

        sqlx::query(r#"INSERT INTO user_roles (user_id, role) VALUES ($1, $2)"#)
            .bind(id)
            .bind(user.profile.role().as_str())
            .execute(&mut *tx)
            .await?;

        match &user.profile {
            NewProfile::Organizer { name } => {
                sqlx::query(
                    r#"INSERT INTO organizer_profiles (user_id, name) VALUES ($1, $2)"#,
                )
                .bind(id)
                .bind(name)
                .execute(&mut *tx)
                .await?;
            },
            NewProfile::Participant {
                first_name,
                last_name,
            } => {
                sqlx::query(
                    r#"INSERT INTO participant_profiles (user_id, first_name, last_name, email)
                        VALUES ($1, $2, $3, $4)"#,
                )
                .bind(id)
                .bind(first_name)
                .bind(last_name)
                .bind(&user.email)
                .execute(&mut *tx)
                .await?;
            },
        }

        tx.commit().await?;

        Ok(id)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.find_where("u.email = $1", Bind::Email(email)).await
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        self.find_where("u.id = $1", Bind::Id(id)).await
    }

    async fn list(&self) -> Result<Vec<User>> {
        let query = format!("{SELECT_USER} GROUP BY u.id ORDER BY u.created_at DESC, u.id DESC");

        sqlx::query_as::<_, UserRecord>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn add_role(&self, user_id: i64, role: Role) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING"#,
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn participant_profile(
        &self,
        user_id: i64,
    ) -> Result<Option<ParticipantProfile>> {
        Ok(sqlx::query_as::<_, ParticipantProfile>(
            r#"SELECT user_id, first_name, last_name, middle_name, email, phone
                FROM participant_profiles WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn organizer_profile(
        &self,
        user_id: i64,
    ) -> Result<Option<OrganizerProfile>> {
        Ok(sqlx::query_as::<_, OrganizerProfile>(
            r#"SELECT user_id AS id, name, description, avatar_content IS NOT NULL AS has_avatar
                FROM organizer_profiles WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn organizer_avatar(&self, user_id: i64) -> Result<Option<Binary>> {
        let row: Option<(Option<Vec<u8>>, Option<String>)> = sqlx::query_as(
            r#"SELECT avatar_content, avatar_content_type FROM organizer_profiles WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((Some(content), content_type)) => Some(Binary {
                content,
                content_type: content_type
                    .unwrap_or_else(|| "application/octet-stream".into()),
            }),
            _ => None,
        })
    }

    async fn set_organizer_avatar(
        &self,
        user_id: i64,
        avatar: &Binary,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"UPDATE organizer_profiles SET avatar_content = $2, avatar_content_type = $3
                WHERE user_id = $1"#,
        )
        .bind(user_id)
        .bind(&avatar.content)
        .bind(&avatar.content_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use super::*;

    fn participant(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: "$argon2id$fake".into(),
            profile: NewProfile::Participant {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
            },
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_create_and_find(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        let id = repo.create(&participant("ada@example.com")).await.unwrap();

        let user = repo.find_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.roles, vec![Role::Participant]);

        let profile = repo.participant_profile(id).await.unwrap().unwrap();
        assert_eq!(profile.email, "ada@example.com");

        repo.add_role(id, Role::Admin).await.unwrap();
        repo.add_role(id, Role::Admin).await.unwrap();
        let user = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::Participant, Role::Admin]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_duplicate_email_conflicts(pool: PgPool) {
        let repo = PgUserRepository::new(pool);
        repo.create(&participant("ada@example.com")).await.unwrap();

        assert!(matches!(
            repo.create(&participant("ada@example.com")).await,
            Err(ServerError::Conflict(_))
        ));
    }
}
