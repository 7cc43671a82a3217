use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, Row, SqliteConnection, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;

use crate::tags::TrackTags;

/// The catalog is the single source of truth for what the scanner has
/// found. Reads go through a pooled, concurrent `SqlitePool`; writes are
/// serialized through one dedicated connection behind an async mutex, since
/// SQLite allows only one writer at a time and the scheduler may run
/// several scan workers concurrently.
pub struct Store {
    read_pool: SqlitePool,
    write_conn: Arc<AsyncMutex<SqliteConnection>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artist {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: i64,
    pub artist_id: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongSummary {
    pub id: i64,
    pub album_id: i64,
    pub title: String,
    pub track_no: Option<u32>,
    pub duration_secs: Option<u32>,
    pub hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("path {0:?} contains non-UTF8 characters")]
    InvalidPathEncoding(PathBuf),

    #[error("no song found with hash {0}")]
    UnknownSong(String),
}

impl Store {
    /// Opens (creating if absent) the catalog database at `path` and
    /// ensures the schema exists.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let read_pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(connect_options.clone())
            .await?;

        let mut write_conn = SqliteConnection::connect_with(&connect_options).await?;
        create_schema(&mut write_conn).await?;

        Ok(Self {
            read_pool,
            write_conn: Arc::new(AsyncMutex::new(write_conn)),
        })
    }

    /// Releases the store's pooled connections. Callers must ensure no scan
    /// is in flight first (the scanner checks its own cancel flag, not this
    /// store) — closing out from under a running write is the caller's bug
    /// to avoid, not one this method guards against.
    pub async fn close(&self) {
        self.read_pool.close().await;
    }

    /// Derives the song's stable public identifier from its absolute path.
    /// Two files that are byte-identical but at different paths get
    /// different hashes; the same path always yields the same hash, which
    /// is what lets rescans recognize a file they've already cataloged.
    pub fn hash_path(path: &Path) -> String {
        format!("{:x}", md5::compute(path.as_os_str().as_encoded_bytes()))
    }

    /// Inserts or updates the catalog row for a single file. Keyed on the
    /// absolute path: rescanning a file whose tags changed updates the
    /// existing rows in place rather than creating duplicates. Artist and
    /// album rows are upserted by name/title ahead of the song row so a
    /// shared artist or album accumulates its songs rather than being
    /// recreated per file.
    pub async fn add_file(&self, path: &Path, tags: &TrackTags) -> Result<(), StoreError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| StoreError::InvalidPathEncoding(path.to_path_buf()))?;
        let hash = Self::hash_path(path);

        let mut conn = self.write_conn.lock().await;
        let mut tx = conn.begin().await?;

        let artist_id: i64 = sqlx::query_scalar(
            "INSERT INTO artists(name) VALUES (?)
             ON CONFLICT(name) DO UPDATE SET name = excluded.name
             RETURNING id",
        )
        .bind(&tags.artist)
        .fetch_one(&mut *tx)
        .await?;

        let album_id: i64 = sqlx::query_scalar(
            "INSERT INTO albums(artist_id, title) VALUES (?, ?)
             ON CONFLICT(artist_id, title) DO UPDATE SET title = excluded.title
             RETURNING id",
        )
        .bind(artist_id)
        .bind(&tags.album)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO songs(album_id, title, track_no, duration_secs, path, hash)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(path) DO UPDATE SET
                album_id = excluded.album_id,
                title = excluded.title,
                track_no = excluded.track_no,
                duration_secs = excluded.duration_secs,
                hash = excluded.hash",
        )
        .bind(album_id)
        .bind(&tags.title)
        .bind(tags.track_no.map(|n| n as i64))
        .bind(tags.duration_secs.map(|d| d as i64))
        .bind(path_str)
        .bind(&hash)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_artists(&self) -> Result<Vec<Artist>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM artists ORDER BY id")
            .fetch_all(&self.read_pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Artist {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }

    pub async fn list_albums(&self, artist_id: Option<i64>) -> Result<Vec<Album>, StoreError> {
        let rows = match artist_id {
            Some(artist_id) => {
                sqlx::query("SELECT id, artist_id, title FROM albums WHERE artist_id = ? ORDER BY id")
                    .bind(artist_id)
                    .fetch_all(&self.read_pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT id, artist_id, title FROM albums ORDER BY id")
                    .fetch_all(&self.read_pool)
                    .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| Album {
                id: row.get("id"),
                artist_id: row.get("artist_id"),
                title: row.get("title"),
            })
            .collect())
    }

    pub async fn list_songs(&self, album_id: Option<i64>) -> Result<Vec<SongSummary>, StoreError> {
        let rows = match album_id {
            Some(album_id) => {
                sqlx::query(
                    "SELECT id, album_id, title, track_no, duration_secs, hash
                     FROM songs WHERE album_id = ? ORDER BY track_no, id",
                )
                .bind(album_id)
                .fetch_all(&self.read_pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, album_id, title, track_no, duration_secs, hash
                     FROM songs ORDER BY album_id, track_no, id",
                )
                .fetch_all(&self.read_pool)
                .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| SongSummary {
                id: row.get("id"),
                album_id: row.get("album_id"),
                title: row.get("title"),
                track_no: row.get::<Option<i64>, _>("track_no").map(|n| n as u32),
                duration_secs: row
                    .get::<Option<i64>, _>("duration_secs")
                    .map(|d| d as u32),
                hash: row.get("hash"),
            })
            .collect())
    }

    /// Resolves a song's public hash to its on-disk path, for streaming.
    pub async fn resolve_song_path(&self, hash: &str) -> Result<PathBuf, StoreError> {
        let row = sqlx::query("SELECT path FROM songs WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.read_pool)
            .await?
            .ok_or_else(|| StoreError::UnknownSong(hash.to_string()))?;

        Ok(PathBuf::from(row.get::<String, _>("path")))
    }

    /// All artist names, insertion order (lowest id first).
    pub async fn list_artist_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list_artists()
            .await?
            .into_iter()
            .map(|a| a.name)
            .collect())
    }

    async fn find_artist_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT id FROM artists WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.read_pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    async fn find_album_id(&self, artist_id: i64, title: &str) -> Result<Option<i64>, StoreError> {
        let row = sqlx::query("SELECT id FROM albums WHERE artist_id = ? AND title = ?")
            .bind(artist_id)
            .bind(title)
            .fetch_optional(&self.read_pool)
            .await?;
        Ok(row.map(|r| r.get("id")))
    }

    /// Album titles for `artist`, insertion order. Empty if the artist is
    /// unknown, per the HTTP layer's "unknown artist/album -> []" contract.
    pub async fn list_album_names(&self, artist: &str) -> Result<Vec<String>, StoreError> {
        match self.find_artist_id(artist).await? {
            Some(artist_id) => Ok(self
                .list_albums(Some(artist_id))
                .await?
                .into_iter()
                .map(|a| a.title)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Songs for `(artist, album)`, ordered by track. Empty if either is
    /// unknown rather than an error — an unrecognized name is not a failure.
    pub async fn list_songs_for(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Vec<SongSummary>, StoreError> {
        let Some(artist_id) = self.find_artist_id(artist).await? else {
            return Ok(Vec::new());
        };
        let Some(album_id) = self.find_album_id(artist_id, album).await? else {
            return Ok(Vec::new());
        };
        self.list_songs(Some(album_id)).await
    }
}

async fn create_schema(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS artists (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )",
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS albums (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_id INTEGER NOT NULL REFERENCES artists(id),
            title     TEXT NOT NULL,
            UNIQUE(artist_id, title)
        )",
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS songs (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id       INTEGER NOT NULL REFERENCES albums(id),
            title          TEXT NOT NULL,
            track_no       INTEGER,
            duration_secs  INTEGER,
            path           TEXT NOT NULL UNIQUE,
            hash           TEXT NOT NULL UNIQUE
        )",
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_albums_artist_id ON albums(artist_id)")
        .execute(&mut *conn)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_album_id ON songs(album_id)")
        .execute(&mut *conn)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_hash ON songs(hash)")
        .execute(&mut *conn)
        .await?;

    Ok(())
}
