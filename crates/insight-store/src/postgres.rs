//! PostgreSQL storage implementation.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use insight_core::{
    DailyStatistics, Post, PostId, PostUpsert, PostUuid, ProfileUpdate, StatisticsWrite,
    TokenUpdate, UpsertOutcome, User, UserId, VelogUuid,
};

use crate::error::{Result, StoreError};
use crate::Store;

const USER_COLUMNS: &str =
    "id, velog_uuid, access_token, refresh_token, group_id, email, username, thumbnail, is_active";

const POST_COLUMNS: &str = "id, post_uuid, user_id, title, slug, released_at, is_active";

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    fn user_from_row(row: &PgRow) -> Result<User> {
        Ok(User {
            id: UserId(row.try_get("id")?),
            velog_uuid: VelogUuid::from_uuid(row.try_get("velog_uuid")?),
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            group_id: row.try_get("group_id")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            thumbnail: row.try_get("thumbnail")?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn post_from_row(row: &PgRow) -> Result<Post> {
        Ok(Post {
            id: PostId(row.try_get("id")?),
            post_uuid: PostUuid::from_uuid(row.try_get("post_uuid")?),
            user_id: UserId(row.try_get("user_id")?),
            title: row.try_get("title")?,
            slug: row.try_get("slug")?,
            released_at: row.try_get::<Option<DateTime<Utc>>, _>("released_at")?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn count_to_db(value: u64) -> Result<i64> {
        i64::try_from(value).map_err(|_| StoreError::InvalidValue(format!("count {value}")))
    }

    fn count_from_db(value: i64) -> Result<u64> {
        u64::try_from(value).map_err(|_| StoreError::InvalidValue(format!("count {value}")))
    }

    fn uuids(post_uuids: &[PostUuid]) -> Vec<Uuid> {
        post_uuids.iter().map(|id| *id.as_uuid()).collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn users_in_group_range(&self, groups: RangeInclusive<i32>) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE group_id BETWEEN $1 AND $2 ORDER BY id"
        ))
        .bind(*groups.start())
        .bind(*groups.end())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::user_from_row).collect()
    }

    async fn users_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"))
            .bind(raw)
            .fetch_all(&self.pool)
            .await?;

        let mut by_id = rows
            .iter()
            .map(|row| Self::user_from_row(row).map(|user| (user.id, user)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn users_above_average_post_count(&self) -> Result<Vec<UserId>> {
        let rows = sqlx::query(
            r"
            WITH counts AS (
                SELECT u.id, COUNT(p.id) AS post_count
                FROM users u
                LEFT JOIN posts p ON p.user_id = u.id
                GROUP BY u.id
            )
            SELECT id FROM counts
            WHERE post_count > (SELECT AVG(post_count) FROM counts)
            ORDER BY id DESC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<UserId> { Ok(UserId(row.try_get("id")?)) })
            .collect()
    }

    async fn update_user_tokens(&self, user_id: UserId, update: &TokenUpdate) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET access_token = COALESCE($2, access_token),
                refresh_token = COALESCE($3, refresh_token),
                updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(user_id.get())
        .bind(update.access_token.as_deref())
        .bind(update.refresh_token.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_user_profile(&self, user_id: UserId, update: &ProfileUpdate) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE users
            SET email = COALESCE($2, email),
                username = COALESCE($3, username),
                thumbnail = COALESCE($4, thumbnail),
                updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(user_id.get())
        .bind(update.email.as_deref())
        .bind(update.username.as_deref())
        .bind(update.thumbnail.as_deref())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            });
        }
        Ok(())
    }

    async fn upsert_posts(&self, user_id: UserId, posts: &[PostUpsert]) -> Result<UpsertOutcome> {
        let mut outcome = UpsertOutcome::default();
        if posts.is_empty() {
            return Ok(outcome);
        }

        let mut tx = self.pool.begin().await?;

        let keys: Vec<Uuid> = posts.iter().map(|p| *p.post_uuid.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE post_uuid = ANY($1) FOR UPDATE"
        ))
        .bind(keys)
        .fetch_all(&mut *tx)
        .await?;
        let existing = rows
            .iter()
            .map(|row| Self::post_from_row(row).map(|post| (post.post_uuid, post)))
            .collect::<Result<HashMap<_, _>>>()?;

        let mut fresh = Vec::new();
        for upsert in posts {
            match existing.get(&upsert.post_uuid) {
                Some(post) if post.differs_from(upsert) => {
                    sqlx::query(
                        r"
                        UPDATE posts
                        SET title = $2, slug = $3, released_at = $4, updated_at = now()
                        WHERE id = $1
                        ",
                    )
                    .bind(post.id.get())
                    .bind(upsert.title.as_str())
                    .bind(upsert.slug.as_str())
                    .bind(upsert.released_at)
                    .execute(&mut *tx)
                    .await?;
                    outcome.updated += 1;
                }
                Some(_) => outcome.unchanged += 1,
                None => fresh.push(upsert),
            }
        }

        if !fresh.is_empty() {
            let mut insert: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO posts (post_uuid, user_id, title, slug, released_at, is_active) ",
            );
            insert.push_values(fresh, |mut row, post| {
                row.push_bind(*post.post_uuid.as_uuid())
                    .push_bind(user_id.get())
                    .push_bind(post.title.clone())
                    .push_bind(post.slug.clone())
                    .push_bind(post.released_at)
                    .push_bind(true);
            });
            insert.push(" ON CONFLICT (post_uuid) DO NOTHING");

            let result = insert.build().execute(&mut *tx).await?;
            outcome.created = usize::try_from(result.rows_affected()).unwrap_or(usize::MAX);
        }

        tx.commit().await?;
        Ok(outcome)
    }

    async fn posts_for_user(&self, user_id: UserId) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::post_from_row).collect()
    }

    async fn set_posts_active(
        &self,
        user_id: UserId,
        post_uuids: &[PostUuid],
        active: bool,
    ) -> Result<u64> {
        if post_uuids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r"
            UPDATE posts
            SET is_active = $3, updated_at = now()
            WHERE user_id = $1 AND post_uuid = ANY($2) AND is_active <> $3
            ",
        )
        .bind(user_id.get())
        .bind(Self::uuids(post_uuids))
        .bind(active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn upsert_daily_statistics(
        &self,
        post_uuid: PostUuid,
        date: NaiveDate,
        view_count: u64,
        like_count: u64,
    ) -> Result<Option<StatisticsWrite>> {
        let views = Self::count_to_db(view_count)?;
        let likes = Self::count_to_db(like_count)?;

        let mut tx = self.pool.begin().await?;

        let post_id: Option<i64> = sqlx::query_scalar("SELECT id FROM posts WHERE post_uuid = $1")
            .bind(*post_uuid.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(post_id) = post_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        // xmax is zero only for a freshly inserted tuple.
        let inserted: bool = sqlx::query_scalar(
            r"
            INSERT INTO post_daily_statistics (post_id, date, daily_view_count, daily_like_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (post_id, date) DO UPDATE
              SET daily_view_count = EXCLUDED.daily_view_count,
                  daily_like_count = EXCLUDED.daily_like_count,
                  updated_at = now()
            RETURNING (xmax = 0)
            ",
        )
        .bind(post_id)
        .bind(date)
        .bind(views)
        .bind(likes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(if inserted {
            StatisticsWrite::Created
        } else {
            StatisticsWrite::Updated
        }))
    }

    async fn daily_statistics(
        &self,
        post_id: PostId,
        date: NaiveDate,
    ) -> Result<Option<DailyStatistics>> {
        let row = sqlx::query(
            r"
            SELECT post_id, date, daily_view_count, daily_like_count
            FROM post_daily_statistics
            WHERE post_id = $1 AND date = $2
            ",
        )
        .bind(post_id.get())
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<DailyStatistics> {
            Ok(DailyStatistics {
                post_id: PostId(row.try_get("post_id")?),
                date: row.try_get("date")?,
                daily_view_count: Self::count_from_db(row.try_get("daily_view_count")?)?,
                daily_like_count: Self::count_from_db(row.try_get("daily_like_count")?)?,
            })
        })
        .transpose()
    }
}
