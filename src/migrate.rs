use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create topics table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            topic_type TEXT NOT NULL,
            status TEXT NOT NULL,
            label TEXT,
            assigned_to TEXT,
            creation_author TEXT NOT NULL,
            creation_date INTEGER NOT NULL,
            due_date INTEGER,
            current_viewpoint TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create viewpoints table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS viewpoints (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            vp_x REAL NOT NULL,
            vp_y REAL NOT NULL,
            vp_z REAL NOT NULL,
            dir_x REAL NOT NULL,
            dir_y REAL NOT NULL,
            dir_z REAL NOT NULL,
            up_x REAL NOT NULL,
            up_y REAL NOT NULL,
            up_z REAL NOT NULL,
            aspect_ratio REAL NOT NULL,
            field_of_view REAL,
            snapshot_ref TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Topic -> viewpoint ownership, by reference
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topic_viewpoints (
            topic_guid TEXT NOT NULL,
            viewpoint_guid TEXT NOT NULL,
            position INTEGER NOT NULL,
            PRIMARY KEY (topic_guid, viewpoint_guid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create comments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS comments (
            guid TEXT PRIMARY KEY,
            topic_guid TEXT NOT NULL,
            author TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            body TEXT NOT NULL,
            FOREIGN KEY (topic_guid) REFERENCES topics(guid)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Snapshot binary store
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            reference TEXT PRIMARY KEY,
            data BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_topic_viewpoints_topic ON topic_viewpoints(topic_guid)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_topic ON comments(topic_guid)")
        .execute(pool)
        .await?;

    Ok(())
}
