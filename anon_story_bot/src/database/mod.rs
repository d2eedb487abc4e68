use std::str::FromStr;

use chrono::Utc;
pub use sqlx::Error;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Row, Sqlite,
};
use teloxide::types::{MessageId, UserId};

use crate::types::{AdviceId, PendingAdvice, PendingStory, PublishedStory, StoryId};


type Pool = sqlx::Pool<Sqlite>;

pub struct Database {
    pool: Pool,
}

fn pending_story_from_row(row: SqliteRow) -> Result<PendingStory, Error> {
    Ok(PendingStory {
        id: StoryId(row.try_get("id")?),
        text: row.try_get("text")?,
        author: UserId(row.try_get::<i64, _>("user_id")? as u64),
        submitted_at: row.try_get("submitted_at")?,
    })
}

fn published_story_from_row(row: SqliteRow) -> Result<PublishedStory, Error> {
    Ok(PublishedStory {
        id: StoryId(row.try_get("id")?),
        text: row.try_get("text")?,
        channel_message_id: MessageId(row.try_get("channel_msg_id")?),
    })
}

fn pending_advice_from_row(row: SqliteRow) -> Result<PendingAdvice, Error> {
    Ok(PendingAdvice {
        id: AdviceId(row.try_get("id")?),
        story_id: StoryId(row.try_get("story_id")?),
        text: row.try_get("text")?,
        author: UserId(row.try_get::<i64, _>("user_id")? as u64),
        submitted_at: row.try_get("submitted_at")?,
    })
}

impl Database {
    /// Open the SQLite database at this path, creating it and the tables
    /// if they don't exist yet.
    pub async fn new(path: &str) -> Result<Database, Error> {
        let url = format!("sqlite:{path}");

        if !Sqlite::database_exists(&url).await.unwrap_or(false) {
            Sqlite::create_database(&url).await?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(32)
            .connect_with(
                SqliteConnectOptions::from_str(&url)?
                    .pragma("cache_size", "-32768")
                    .busy_timeout(std::time::Duration::from_secs(600)),
            )
            .await?;

        // Do some init. Create the tables...

        // STORIES (published ones):
        // id (key, i64; same as the ID it had while pending)
        // text (string)
        // channel_msg_id (i32 (because telegram bot api is just like that))
        pool.execute(sqlx::query(
            "
                CREATE TABLE IF NOT EXISTS stories (
                    id INTEGER PRIMARY KEY NOT NULL,
                    text TEXT NOT NULL,
                    channel_msg_id INTEGER NOT NULL
                ) STRICT;",
        ))
        .await?;

        // PENDING_STORIES:
        // id (key, i64; AUTOINCREMENT so IDs of decided stories are never reused)
        // text (string)
        // user_id (i64 because sqlite doesn't support u64)
        // submitted_at (date+time in UTC)
        pool.execute(sqlx::query(
            "
                CREATE TABLE IF NOT EXISTS pending_stories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                    text TEXT NOT NULL,
                    user_id INTEGER NOT NULL,
                    submitted_at TEXT NOT NULL
                ) STRICT;",
        ))
        .await?;

        // PENDING_ADVICE:
        // id (key, i64, AUTOINCREMENT)
        // story_id (i64, ID of a published story)
        // text (string)
        // user_id (i64)
        // submitted_at (date+time in UTC)
        pool.execute(sqlx::query(
            "
                CREATE TABLE IF NOT EXISTS pending_advice (
                    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                    story_id INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    user_id INTEGER NOT NULL,
                    submitted_at TEXT NOT NULL
                ) STRICT;",
        ))
        .await?;

        Ok(Database { pool })
    }

    /// Put a new story into the review queue. Returns its freshly assigned ID.
    pub async fn insert_pending_story(&self, text: &str, author: UserId) -> Result<StoryId, Error> {
        let result = sqlx::query(
            "INSERT INTO pending_stories(text, user_id, submitted_at)
            VALUES (?, ?, ?);",
        )
        .bind(text)
        .bind(author.0 as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(StoryId(result.last_insert_rowid()))
    }

    /// Get a story from the review queue. Returns [`None`] if it's not there.
    pub async fn get_pending_story(&self, id: StoryId) -> Result<Option<PendingStory>, Error> {
        sqlx::query("SELECT id, text, user_id, submitted_at FROM pending_stories WHERE id=?;")
            .bind(id.0)
            .try_map(pending_story_from_row)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a story that was posted to the channel. Returns [`None`] if there's
    /// no published story with this ID.
    pub async fn get_published_story(&self, id: StoryId) -> Result<Option<PublishedStory>, Error> {
        sqlx::query("SELECT id, text, channel_msg_id FROM stories WHERE id=?;")
            .bind(id.0)
            .try_map(published_story_from_row)
            .fetch_optional(&self.pool)
            .await
    }

    /// Check if a story with this ID was posted to the channel.
    pub async fn is_story_published(&self, id: StoryId) -> Result<bool, Error> {
        sqlx::query("SELECT 1 FROM stories WHERE id=?;")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map(|x| x.is_some())
    }

    /// Move a story out of the review queue and into published stories, under
    /// the same ID, remembering the channel post it became.
    ///
    /// Both happen in one transaction. Returns [`None`] and changes nothing if
    /// the story wasn't pending.
    pub async fn publish_pending_story(
        &self,
        id: StoryId,
        channel_message_id: MessageId,
    ) -> Result<Option<PublishedStory>, Error> {
        let mut tx = self.pool.begin().await?;

        // Delete first: that grabs the write lock right away, so concurrent
        // publishers wait on the busy timeout instead of failing.
        let Some(text) = sqlx::query("DELETE FROM pending_stories WHERE id=? RETURNING text;")
            .bind(id.0)
            .try_map(|row: SqliteRow| row.try_get::<String, _>("text"))
            .fetch_optional(&mut *tx)
            .await?
        else {
            // Dropping the transaction rolls it back.
            return Ok(None);
        };

        sqlx::query("INSERT INTO stories(id, text, channel_msg_id) VALUES (?, ?, ?);")
            .bind(id.0)
            .bind(&text)
            .bind(channel_message_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(PublishedStory {
            id,
            text,
            channel_message_id,
        }))
    }

    /// Remove a story from the review queue. Returns `true` if it was there.
    pub async fn delete_pending_story(&self, id: StoryId) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM pending_stories WHERE id=?;")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Put new advice for a story into the review queue. Returns its freshly assigned ID.
    ///
    /// Does not check whether the story is published, that's up to the caller.
    pub async fn insert_pending_advice(
        &self,
        story_id: StoryId,
        text: &str,
        author: UserId,
    ) -> Result<AdviceId, Error> {
        let result = sqlx::query(
            "INSERT INTO pending_advice(story_id, text, user_id, submitted_at)
            VALUES (?, ?, ?, ?);",
        )
        .bind(story_id.0)
        .bind(text)
        .bind(author.0 as i64)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(AdviceId(result.last_insert_rowid()))
    }

    /// Get advice from the review queue. Returns [`None`] if it's not there.
    pub async fn get_pending_advice(&self, id: AdviceId) -> Result<Option<PendingAdvice>, Error> {
        sqlx::query(
            "SELECT id, story_id, text, user_id, submitted_at FROM pending_advice WHERE id=?;",
        )
        .bind(id.0)
        .try_map(pending_advice_from_row)
        .fetch_optional(&self.pool)
        .await
    }

    /// Remove advice from the review queue and return what it was, all in one
    /// statement. Returns [`None`] if it wasn't there.
    pub async fn take_pending_advice(&self, id: AdviceId) -> Result<Option<PendingAdvice>, Error> {
        sqlx::query(
            "DELETE FROM pending_advice WHERE id=?
            RETURNING id, story_id, text, user_id, submitted_at;",
        )
        .bind(id.0)
        .try_map(pending_advice_from_row)
        .fetch_optional(&self.pool)
        .await
    }

    /// All stories in the review queue, oldest first.
    pub async fn list_pending_stories(&self) -> Result<Vec<PendingStory>, Error> {
        sqlx::query("SELECT id, text, user_id, submitted_at FROM pending_stories ORDER BY id;")
            .try_map(pending_story_from_row)
            .fetch_all(&self.pool)
            .await
    }

    /// All advice in the review queue, oldest first.
    pub async fn list_pending_advice(&self) -> Result<Vec<PendingAdvice>, Error> {
        sqlx::query(
            "SELECT id, story_id, text, user_id, submitted_at FROM pending_advice ORDER BY id;",
        )
        .try_map(pending_advice_from_row)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
impl Database {
    /// A fresh database in a temporary directory. Keep the directory
    /// around for as long as the database is used.
    pub(crate) async fn temporary() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().expect("Failed to make a temporary directory!");
        let path = dir.path().join("test.sqlite");
        let database = Database::new(path.to_str().expect("Temporary path is not UTF-8!"))
            .await
            .expect("Failed to create database!");
        (dir, database)
    }

    /// Close the pool, so that every query from now on fails.
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }
}
