//! # ew-db-sqlite
//!
//! This module implements the data mapping between the SQLite relational
//! model and the `ew-core` domain models: the comment table, the one-row
//! configuration blob, and the per-url hit counters.
//!
//! One `SqliteStore` wraps the process-wide pool and a statement cache for
//! the dynamically shaped queries (variable-width membership lists,
//! variable update-field sets).

pub mod statements;

use async_trait::async_trait;
use ew_core::models::{Comment, ConfigMap, SpamFilter, Viewer};
use ew_core::traits::{CommentRepo, ConfigRepo, CounterRepo};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

use statements::{Membership, StatementCache};

/// Pinned comments are unbounded by the page size but never unbounded in
/// absolute terms.
pub const PINNED_CEILING: i64 = 50;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS comments (
        id         TEXT PRIMARY KEY,
        uid        TEXT NOT NULL DEFAULT '',
        nick       TEXT NOT NULL DEFAULT '',
        mail       TEXT NOT NULL DEFAULT '',
        mail_hash  TEXT NOT NULL DEFAULT '',
        link       TEXT NOT NULL DEFAULT '',
        ip         TEXT NOT NULL DEFAULT '',
        user_agent TEXT NOT NULL DEFAULT '',
        is_owner   INTEGER NOT NULL DEFAULT 0,
        url        TEXT NOT NULL,
        href       TEXT NOT NULL DEFAULT '',
        pid        TEXT NOT NULL DEFAULT '',
        rid        TEXT NOT NULL DEFAULT '',
        body       TEXT NOT NULL,
        is_spam    INTEGER NOT NULL DEFAULT 0,
        likes      TEXT NOT NULL DEFAULT '[]',
        top        INTEGER NOT NULL DEFAULT 0,
        created    INTEGER NOT NULL,
        updated    INTEGER NOT NULL,
        avatar     TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_comments_url_created ON comments (url, created DESC)",
    "CREATE INDEX IF NOT EXISTS idx_comments_rid ON comments (rid)",
    "CREATE TABLE IF NOT EXISTS config (
        id   INTEGER PRIMARY KEY CHECK (id = 1),
        data TEXT NOT NULL DEFAULT '{}'
    )",
    "CREATE TABLE IF NOT EXISTS counters (
        url     TEXT PRIMARY KEY,
        hits    INTEGER NOT NULL DEFAULT 0,
        title   TEXT NOT NULL DEFAULT '',
        updated INTEGER NOT NULL
    )",
];

pub struct SqliteStore {
    pool: SqlitePool,
    statements: StatementCache,
}

impl SqliteStore {
    /// Open (or create) the database behind `url` and apply the schema.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // An in-memory database exists per connection; a wider pool would
        // hand each request a different empty database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&pool).await?;
        }

        Ok(Self {
            pool,
            statements: StatementCache::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_comment(row: &SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        uid: row.get("uid"),
        nick: row.get("nick"),
        mail: row.get("mail"),
        mail_hash: row.get("mail_hash"),
        link: row.get("link"),
        ip: row.get("ip"),
        user_agent: row.get("user_agent"),
        is_owner: row.get("is_owner"),
        url: row.get("url"),
        href: row.get("href"),
        pid: row.get("pid"),
        rid: row.get("rid"),
        body: row.get("body"),
        is_spam: row.get("is_spam"),
        likes: serde_json::from_str(&row.get::<String, _>("likes")).unwrap_or_default(),
        top: row.get("top"),
        created: row.get("created"),
        updated: row.get("updated"),
        avatar: row.get("avatar"),
    }
}

/// Bind a JSON value from an admin update payload to its SQLite affinity.
fn bind_json<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &'q serde_json::Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        serde_json::Value::Null => query.bind(None::<String>),
        serde_json::Value::Bool(b) => query.bind(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Escape LIKE metacharacters and wrap the keyword for substring matching.
fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped.to_lowercase())
}

const KEYWORD_CLAUSE: &str = "(LOWER(nick) LIKE ? ESCAPE '\\' \
     OR LOWER(mail) LIKE ? ESCAPE '\\' \
     OR LOWER(link) LIKE ? ESCAPE '\\' \
     OR LOWER(ip) LIKE ? ESCAPE '\\' \
     OR LOWER(body) LIKE ? ESCAPE '\\' \
     OR LOWER(url) LIKE ? ESCAPE '\\' \
     OR LOWER(href) LIKE ? ESCAPE '\\')";
const KEYWORD_BINDS: usize = 7;

#[async_trait]
impl CommentRepo for SqliteStore {
    async fn page_top_level(
        &self,
        url: &str,
        before: i64,
        fetch: i64,
        viewer: &Viewer,
    ) -> anyhow::Result<Vec<Comment>> {
        let rows = match viewer {
            Viewer::Public { uid } => {
                sqlx::query(
                    "SELECT * FROM comments WHERE url = ? AND rid = '' AND top = 0 \
                     AND created < ? AND (is_spam = 0 OR uid = ?) \
                     ORDER BY created DESC LIMIT ?",
                )
                .bind(url)
                .bind(before)
                .bind(uid)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
            Viewer::Admin => {
                sqlx::query(
                    "SELECT * FROM comments WHERE url = ? AND rid = '' AND top = 0 \
                     AND created < ? ORDER BY created DESC LIMIT ?",
                )
                .bind(url)
                .bind(before)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn pinned(
        &self,
        url: &str,
        viewer: &Viewer,
        ceiling: i64,
    ) -> anyhow::Result<Vec<Comment>> {
        let rows = match viewer {
            Viewer::Public { uid } => {
                sqlx::query(
                    "SELECT * FROM comments WHERE url = ? AND rid = '' AND top = 1 \
                     AND (is_spam = 0 OR uid = ?) ORDER BY created DESC LIMIT ?",
                )
                .bind(url)
                .bind(uid)
                .bind(ceiling)
                .fetch_all(&self.pool)
                .await?
            }
            Viewer::Admin => {
                sqlx::query(
                    "SELECT * FROM comments WHERE url = ? AND rid = '' AND top = 1 \
                     ORDER BY created DESC LIMIT ?",
                )
                .bind(url)
                .bind(ceiling)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn replies_for(
        &self,
        roots: &[String],
        viewer: &Viewer,
    ) -> anyhow::Result<Vec<Comment>> {
        if roots.is_empty() {
            // Zero ids must short-circuit, never reach the cache.
            return Ok(Vec::new());
        }
        let family = match viewer {
            Viewer::Public { .. } => Membership::RepliesPublic,
            Viewer::Admin => Membership::RepliesAdmin,
        };
        let sql = self.statements.membership(family, roots.len());
        let mut query = sqlx::query(&sql);
        for root in roots {
            query = query.bind(root);
        }
        if let Some(uid) = viewer.uid() {
            query = query.bind(uid);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn count_top_level(&self, url: &str, viewer: &Viewer) -> anyhow::Result<i64> {
        let row = match viewer {
            Viewer::Public { uid } => {
                sqlx::query(
                    "SELECT COUNT(*) AS n FROM comments WHERE url = ? AND rid = '' \
                     AND (is_spam = 0 OR uid = ?)",
                )
                .bind(url)
                .bind(uid)
                .fetch_one(&self.pool)
                .await?
            }
            Viewer::Admin => {
                sqlx::query("SELECT COUNT(*) AS n FROM comments WHERE url = ? AND rid = ''")
                    .bind(url)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(row.get("n"))
    }

    async fn find(&self, id: &str) -> anyhow::Result<Option<Comment>> {
        let row = sqlx::query("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_comment))
    }

    async fn insert(&self, comment: &Comment) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO comments (id, uid, nick, mail, mail_hash, link, ip, user_agent, \
             is_owner, url, href, pid, rid, body, is_spam, likes, top, created, updated, avatar) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&comment.id)
        .bind(&comment.uid)
        .bind(&comment.nick)
        .bind(&comment.mail)
        .bind(&comment.mail_hash)
        .bind(&comment.link)
        .bind(&comment.ip)
        .bind(&comment.user_agent)
        .bind(comment.is_owner)
        .bind(&comment.url)
        .bind(&comment.href)
        .bind(&comment.pid)
        .bind(&comment.rid)
        .bind(&comment.body)
        .bind(comment.is_spam)
        .bind(serde_json::to_string(&comment.likes)?)
        .bind(comment.top)
        .bind(comment.created)
        .bind(comment.updated)
        .bind(&comment.avatar)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_fields(
        &self,
        id: &str,
        fields: &[(String, serde_json::Value)],
        updated: i64,
    ) -> anyhow::Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        // Sort by column so an equal field set always maps to one cached
        // statement, with values bound in the same order the text names them.
        let mut sorted: Vec<&(String, serde_json::Value)> = fields.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let names: Vec<String> = sorted.iter().map(|(name, _)| name.clone()).collect();

        let sql = self.statements.update(&names);
        let mut query = sqlx::query(&sql);
        for (_, value) in &sorted {
            query = bind_json(query, value);
        }
        query.bind(updated).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn admin_page(
        &self,
        filter: SpamFilter,
        keyword: &str,
        per: i64,
        page: i64,
    ) -> anyhow::Result<(i64, Vec<Comment>)> {
        let mut clauses: Vec<&str> = Vec::new();
        match filter {
            SpamFilter::Visible => clauses.push("is_spam = 0"),
            SpamFilter::Hidden => clauses.push("is_spam = 1"),
            SpamFilter::All => {}
        }
        let keyword = keyword.trim();
        if !keyword.is_empty() {
            clauses.push(KEYWORD_CLAUSE);
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let pattern = like_pattern(keyword);

        let count_sql = format!("SELECT COUNT(*) AS n FROM comments{where_sql}");
        let mut count_query = sqlx::query(&count_sql);
        if !keyword.is_empty() {
            for _ in 0..KEYWORD_BINDS {
                count_query = count_query.bind(&pattern);
            }
        }
        let total: i64 = count_query.fetch_one(&self.pool).await?.get("n");

        let offset = (page.max(1) - 1) * per;
        let page_sql = format!(
            "SELECT * FROM comments{where_sql} ORDER BY created DESC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query(&page_sql);
        if !keyword.is_empty() {
            for _ in 0..KEYWORD_BINDS {
                page_query = page_query.bind(&pattern);
            }
        }
        let rows = page_query
            .bind(per)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((total, rows.iter().map(row_to_comment).collect()))
    }

    async fn export_all(&self) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query("SELECT * FROM comments ORDER BY created ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn counts_by_url(
        &self,
        urls: &[String],
        include_reply: bool,
    ) -> anyhow::Result<Vec<(String, i64)>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        let family = if include_reply {
            Membership::CountByUrl
        } else {
            Membership::CountByUrlTopLevel
        };
        let sql = self.statements.membership(family, urls.len());
        let mut query = sqlx::query(&sql);
        for url in urls {
            query = query.bind(url);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let found: Vec<(String, i64)> = rows
            .iter()
            .map(|row| (row.get("url"), row.get("n")))
            .collect();
        // Urls with no comments keep their slot with a zero count.
        Ok(urls
            .iter()
            .map(|url| {
                let n = found
                    .iter()
                    .find(|(u, _)| u == url)
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                (url.clone(), n)
            })
            .collect())
    }

    async fn recent(
        &self,
        urls: &[String],
        include_reply: bool,
        limit: i64,
    ) -> anyhow::Result<Vec<Comment>> {
        let rows = if urls.is_empty() {
            let sql = if include_reply {
                "SELECT * FROM comments WHERE is_spam = 0 ORDER BY created DESC LIMIT ?"
            } else {
                "SELECT * FROM comments WHERE is_spam = 0 AND rid = '' \
                 ORDER BY created DESC LIMIT ?"
            };
            sqlx::query(sql).bind(limit).fetch_all(&self.pool).await?
        } else {
            let family = if include_reply {
                Membership::RecentByUrl
            } else {
                Membership::RecentByUrlTopLevel
            };
            let sql = self.statements.membership(family, urls.len());
            let mut query = sqlx::query(&sql);
            for url in urls {
                query = query.bind(url);
            }
            query.bind(limit).fetch_all(&self.pool).await?
        };
        Ok(rows.iter().map(row_to_comment).collect())
    }

    async fn set_likes(&self, id: &str, likes: &[String], updated: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE comments SET likes = ?, updated = ? WHERE id = ?")
            .bind(serde_json::to_string(likes)?)
            .bind(updated)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_spam(&self, id: &str, is_spam: bool, updated: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE comments SET is_spam = ?, updated = ? WHERE id = ?")
            .bind(is_spam)
            .bind(updated)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_submissions_since(&self, ip: Option<&str>, since: i64) -> anyhow::Result<i64> {
        let row = match ip {
            Some(ip) => {
                sqlx::query("SELECT COUNT(*) AS n FROM comments WHERE created >= ? AND ip = ?")
                    .bind(since)
                    .bind(ip)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM comments WHERE created >= ?")
                    .bind(since)
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(row.get("n"))
    }
}

#[async_trait]
impl ConfigRepo for SqliteStore {
    async fn load(&self) -> anyhow::Result<ConfigMap> {
        let row = sqlx::query("SELECT data FROM config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => serde_json::from_str(&row.get::<String, _>("data")).unwrap_or_default(),
            None => ConfigMap::new(),
        })
    }

    async fn merge(&self, patch: &ConfigMap) -> anyhow::Result<ConfigMap> {
        let mut current = self.load().await?;
        if patch.is_empty() {
            return Ok(current);
        }
        for (key, value) in patch {
            current.insert(key.clone(), value.clone());
        }
        sqlx::query(
            "INSERT INTO config (id, data) VALUES (1, ?) \
             ON CONFLICT (id) DO UPDATE SET data = excluded.data",
        )
        .bind(serde_json::to_string(&current)?)
        .execute(&self.pool)
        .await?;
        Ok(current)
    }
}

#[async_trait]
impl CounterRepo for SqliteStore {
    async fn increment(&self, url: &str, title: &str, now: i64) -> anyhow::Result<i64> {
        let row = sqlx::query(
            "INSERT INTO counters (url, hits, title, updated) VALUES (?, 1, ?, ?) \
             ON CONFLICT (url) DO UPDATE SET hits = counters.hits + 1, \
             title = excluded.title, updated = excluded.updated \
             RETURNING hits",
        )
        .bind(url)
        .bind(title)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("hits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.expect("open in-memory store")
    }

    fn comment(id: &str, url: &str, created: i64) -> Comment {
        Comment {
            id: id.to_string(),
            uid: "uid-a".to_string(),
            nick: "tester".to_string(),
            mail: String::new(),
            mail_hash: String::new(),
            link: String::new(),
            ip: "1.2.3.4".to_string(),
            user_agent: "ua".to_string(),
            is_owner: false,
            url: url.to_string(),
            href: String::new(),
            pid: String::new(),
            rid: String::new(),
            body: format!("body of {id}"),
            is_spam: false,
            likes: Vec::new(),
            top: false,
            created,
            updated: created,
            avatar: None,
        }
    }

    fn reply(id: &str, url: &str, root: &str, created: i64) -> Comment {
        Comment {
            pid: root.to_string(),
            rid: root.to_string(),
            ..comment(id, url, created)
        }
    }

    #[tokio::test]
    async fn cursor_pagination_has_no_overlap_or_gap() {
        let store = store().await;
        for i in 0..5 {
            store.insert(&comment(&format!("c{i}"), "/p", 1000 + i)).await.unwrap();
        }
        let viewer = Viewer::public("someone-else");

        let first = store.page_top_level("/p", i64::MAX, 3, &viewer).await.unwrap();
        assert_eq!(first.len(), 3); // fetch = page size 2 + 1
        let more = first.len() > 2;
        assert!(more);
        let page: Vec<_> = first.into_iter().take(2).collect();
        assert_eq!(page[0].id, "c4");
        assert_eq!(page[1].id, "c3");

        let cursor = page.last().unwrap().created;
        let second = store.page_top_level("/p", cursor, 3, &viewer).await.unwrap();
        let ids: Vec<_> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1", "c0"]);
    }

    #[tokio::test]
    async fn cursor_is_stable_under_concurrent_inserts() {
        let store = store().await;
        for i in 0..4 {
            store.insert(&comment(&format!("c{i}"), "/p", 1000 + i)).await.unwrap();
        }
        let viewer = Viewer::public("x");
        let first = store.page_top_level("/p", i64::MAX, 3, &viewer).await.unwrap();
        let cursor = first[1].created; // oldest seen after a 2-item page

        // A newer comment lands between the two fetches.
        store.insert(&comment("burst", "/p", 2000)).await.unwrap();

        let second = store.page_top_level("/p", cursor, 3, &viewer).await.unwrap();
        let ids: Vec<_> = second.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c0"], "no duplicates, no gaps");
    }

    #[tokio::test]
    async fn hidden_comments_visible_only_to_author_and_admin() {
        let store = store().await;
        let mut hidden = comment("h1", "/p", 1000);
        hidden.is_spam = true;
        hidden.uid = "author".to_string();
        store.insert(&hidden).await.unwrap();

        let stranger = store
            .page_top_level("/p", i64::MAX, 10, &Viewer::public("stranger"))
            .await
            .unwrap();
        assert!(stranger.is_empty());

        let author = store
            .page_top_level("/p", i64::MAX, 10, &Viewer::public("author"))
            .await
            .unwrap();
        assert_eq!(author.len(), 1);

        let admin = store
            .page_top_level("/p", i64::MAX, 10, &Viewer::Admin)
            .await
            .unwrap();
        assert_eq!(admin.len(), 1);
    }

    #[tokio::test]
    async fn pinned_excluded_from_top_level_page() {
        let store = store().await;
        let mut pinned = comment("pin", "/p", 1000);
        pinned.top = true;
        store.insert(&pinned).await.unwrap();
        store.insert(&comment("plain", "/p", 1001)).await.unwrap();

        let viewer = Viewer::public("x");
        let page = store.page_top_level("/p", i64::MAX, 10, &viewer).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, "plain");

        let pins = store.pinned("/p", &viewer, PINNED_CEILING).await.unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].id, "pin");
    }

    #[tokio::test]
    async fn replies_batch_by_roots() {
        let store = store().await;
        store.insert(&comment("r1", "/p", 1000)).await.unwrap();
        store.insert(&comment("r2", "/p", 1001)).await.unwrap();
        store.insert(&reply("a", "/p", "r1", 1002)).await.unwrap();
        store.insert(&reply("b", "/p", "r2", 1003)).await.unwrap();
        store.insert(&reply("c", "/p", "r1", 1004)).await.unwrap();

        let viewer = Viewer::public("x");
        let replies = store
            .replies_for(&["r1".to_string()], &viewer)
            .await
            .unwrap();
        let ids: Vec<_> = replies.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"], "ascending by created, r2 subtree excluded");

        let none = store.replies_for(&[], &viewer).await.unwrap();
        assert!(none.is_empty(), "zero roots short-circuit");
    }

    #[tokio::test]
    async fn count_top_level_applies_visibility_and_skips_replies() {
        let store = store().await;
        store.insert(&comment("c1", "/p", 1000)).await.unwrap();
        store.insert(&reply("a", "/p", "c1", 1001)).await.unwrap();
        let mut hidden = comment("c2", "/p", 1002);
        hidden.is_spam = true;
        hidden.uid = "author".to_string();
        store.insert(&hidden).await.unwrap();

        assert_eq!(store.count_top_level("/p", &Viewer::public("x")).await.unwrap(), 1);
        assert_eq!(store.count_top_level("/p", &Viewer::public("author")).await.unwrap(), 2);
        assert_eq!(store.count_top_level("/p", &Viewer::Admin).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn update_fields_is_order_insensitive() {
        let store = store().await;
        store.insert(&comment("c1", "/p", 1000)).await.unwrap();

        store
            .update_fields(
                "c1",
                &[
                    ("top".to_string(), serde_json::Value::Bool(true)),
                    ("nick".to_string(), serde_json::json!("renamed")),
                ],
                2000,
            )
            .await
            .unwrap();

        let updated = store.find("c1").await.unwrap().expect("present");
        assert!(updated.top);
        assert_eq!(updated.nick, "renamed");
        assert_eq!(updated.updated, 2000);
        assert_eq!(updated.created, 1000, "created never mutates");
    }

    #[tokio::test]
    async fn admin_page_filters_and_searches() {
        let store = store().await;
        let mut spam = comment("s1", "/spam-page", 1000);
        spam.is_spam = true;
        spam.nick = "Spammy McSpam".to_string();
        store.insert(&spam).await.unwrap();
        let mut ham = comment("h1", "/clean", 1001);
        ham.nick = "Regular".to_string();
        store.insert(&ham).await.unwrap();

        let (total, rows) = store.admin_page(SpamFilter::Hidden, "", 10, 1).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, "s1");

        let (total, rows) = store.admin_page(SpamFilter::All, "mcspam", 10, 1).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, "s1");

        let (total, _) = store.admin_page(SpamFilter::All, "%", 10, 1).await.unwrap();
        assert_eq!(total, 0, "LIKE metacharacters are literal");
    }

    #[tokio::test]
    async fn counts_by_url_reports_zero_for_unknown() {
        let store = store().await;
        store.insert(&comment("c1", "/a", 1000)).await.unwrap();
        store.insert(&reply("r", "/a", "c1", 1001)).await.unwrap();

        let counts = store
            .counts_by_url(&["/a".to_string(), "/missing".to_string()], true)
            .await
            .unwrap();
        assert_eq!(counts, vec![("/a".to_string(), 2), ("/missing".to_string(), 0)]);

        let top_only = store.counts_by_url(&["/a".to_string()], false).await.unwrap();
        assert_eq!(top_only[0].1, 1);
    }

    #[tokio::test]
    async fn counter_upsert_sums_without_lost_updates() {
        let store = std::sync::Arc::new(store().await);
        let mut tasks = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.increment("/page", &format!("title-{i}"), 1000 + i).await
            }));
        }
        let mut seen = Vec::new();
        for task in tasks {
            seen.push(task.await.unwrap().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=10).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn config_merge_overlays_and_empty_is_noop() {
        let store = store().await;
        let mut first = ConfigMap::new();
        first.insert("a".to_string(), serde_json::json!(1));
        store.merge(&first).await.unwrap();

        let mut second = ConfigMap::new();
        second.insert("b".to_string(), serde_json::json!(2));
        let merged = store.merge(&second).await.unwrap();
        assert_eq!(merged.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(merged.get("b"), Some(&serde_json::json!(2)));

        let unchanged = store.merge(&ConfigMap::new()).await.unwrap();
        assert_eq!(unchanged.len(), 2);

        let reloaded = ConfigRepo::load(&store).await.unwrap();
        assert_eq!(reloaded.len(), 2);
    }

    #[tokio::test]
    async fn submission_window_counts_per_ip_and_global() {
        let store = store().await;
        let mut a = comment("a", "/p", 1000);
        a.ip = "1.1.1.1".to_string();
        store.insert(&a).await.unwrap();
        let mut b = comment("b", "/p", 1500);
        b.ip = "2.2.2.2".to_string();
        store.insert(&b).await.unwrap();

        assert_eq!(store.count_submissions_since(Some("1.1.1.1"), 900).await.unwrap(), 1);
        assert_eq!(store.count_submissions_since(None, 900).await.unwrap(), 2);
        assert_eq!(store.count_submissions_since(None, 1200).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn likes_round_trip_through_serialized_set() {
        let store = store().await;
        store.insert(&comment("c1", "/p", 1000)).await.unwrap();
        store
            .set_likes("c1", &["u1".to_string(), "u2".to_string()], 1100)
            .await
            .unwrap();
        let found = store.find("c1").await.unwrap().expect("present");
        assert_eq!(found.likes, vec!["u1", "u2"]);
    }
}
