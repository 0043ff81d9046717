//! # Comment Operations
//!
//! The threaded read path (stream pagination with pinned merge), the
//! submission pipeline, the like toggle, and the admin read/mutate/import/
//! export operations.

use std::sync::Arc;
use std::time::Duration;

use ew_core::error::{AppError, Result};
use ew_core::models::{Comment, CommentSeed, ConfigMap, SpamFilter, Viewer};
use ew_core::now_ms;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::handlers::RequestContext;
use crate::rate_limit;
use crate::state::{cfg_str, cfg_u64, mutable_column, require_admin, AppState};

const DEFAULT_PAGE_SIZE: i64 = 8;
const MAX_PAGE_SIZE: i64 = 100;
/// Pinned comments ignore the page size but never this ceiling.
const PINNED_CEILING: i64 = 50;
const RECENT_DEFAULT: i64 = 10;
const RECENT_MAX: i64 = 100;
/// How long a submission waits for its background work before responding
/// anyway. The work itself is never cancelled.
const POST_SUBMIT_WAIT: Duration = Duration::from_secs(5);

fn new_comment_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn sanitize_body(raw: &str) -> String {
    html_escape::encode_safe(raw.trim()).to_string()
}

/// Mail, ip and user agent stay server-side on non-admin reads.
fn strip_private(mut comment: Comment, admin: bool) -> Comment {
    if !admin {
        comment.mail = String::new();
        comment.ip = String::new();
        comment.user_agent = String::new();
    }
    comment
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInput {
    pub url: String,
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

/// Paginated visible comments for one page, pinned merged ahead on the
/// first (uncursored) fetch, replies batched per returned root set.
pub async fn page(state: &Arc<AppState>, ctx: &RequestContext, input: PageInput) -> Result<Value> {
    if input.url.trim().is_empty() {
        return Err(AppError::Validation("url is required".to_string()));
    }
    let config = state.config().await?;
    let viewer = Viewer::public(ctx.token.clone());
    let limit = input
        .limit
        .or_else(|| cfg_u64(&config, "COMMENT_PAGE_SIZE").map(|v| v as i64))
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    // Fetch one extra row instead of issuing a count query; the cursor is
    // a monotonic boundary so this stays correct under concurrent inserts.
    let before = input.before.unwrap_or(i64::MAX);
    let mut top = state
        .comments
        .page_top_level(&input.url, before, limit + 1, &viewer)
        .await?;
    let more = top.len() as i64 > limit;
    if more {
        top.truncate(limit as usize);
    }

    let mut roots = if input.before.is_none() {
        state.comments.pinned(&input.url, &viewer, PINNED_CEILING).await?
    } else {
        Vec::new()
    };
    roots.extend(top);

    let ids: Vec<String> = roots.iter().map(|c| c.id.clone()).collect();
    let replies = if ids.is_empty() {
        Vec::new()
    } else {
        state.comments.replies_for(&ids, &viewer).await?
    };
    let count = state.comments.count_top_level(&input.url, &viewer).await?;

    let comments: Vec<Comment> = roots
        .into_iter()
        .chain(replies)
        .map(|c| strip_private(c, ctx.admin))
        .collect();
    Ok(json!({ "data": comments, "more": more, "count": count }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitInput {
    pub url: String,
    pub comment: String,
    pub nick: String,
    pub mail: String,
    pub link: String,
    pub href: String,
    pub pid: String,
    pub rid: String,
    pub ua: String,
    pub challenge_response: String,
}

/// The submission pipeline: validate, rate-limit, bot challenge, build,
/// persist, respond, then background classification and notification with
/// a bounded wait.
pub async fn submit(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: SubmitInput,
) -> Result<Value> {
    if input.url.trim().is_empty() {
        return Err(AppError::Validation("url is required".to_string()));
    }
    if input.comment.trim().is_empty() {
        return Err(AppError::Validation("comment is required".to_string()));
    }
    let config = state.config().await?;

    rate_limit::check_submission(state.comments.as_ref(), &config, &ctx.ip, now_ms()).await?;

    let passed = state
        .challenge
        .verify(&input.challenge_response, &ctx.ip, &config)
        .await?;
    if !passed {
        return Err(AppError::Forbidden("bot challenge verification failed".to_string()));
    }

    // Resolve the parent and the thread root. A reply to a reply hangs off
    // the same root as its parent.
    let parent = match input.pid.trim() {
        "" => None,
        pid => Some(
            state
                .comments
                .find(pid)
                .await?
                .ok_or_else(|| AppError::NotFound("parent comment".to_string()))?,
        ),
    };
    let rid = parent
        .as_ref()
        .map(|p| if p.is_top_level() { p.id.clone() } else { p.rid.clone() })
        .unwrap_or_default();

    let now = now_ms();
    let nick = match input.nick.trim() {
        "" => "Anonymous".to_string(),
        nick => nick.to_string(),
    };
    let mail = input.mail.trim().to_string();
    let owner_mail = cfg_str(&config, "OWNER_EMAIL");
    let mut comment = Comment {
        id: new_comment_id(),
        uid: ctx.token.clone(),
        nick,
        mail_hash: state.identity.mail_hash(&mail),
        mail,
        link: input.link.trim().to_string(),
        ip: ctx.ip.clone(),
        user_agent: input.ua,
        is_owner: ctx.admin && (owner_mail.is_empty() || input.mail.trim().eq_ignore_ascii_case(owner_mail)),
        url: input.url,
        href: input.href,
        pid: parent.as_ref().map(|p| p.id.clone()).unwrap_or_default(),
        rid,
        body: sanitize_body(&input.comment),
        is_spam: false,
        likes: Vec::new(),
        top: false,
        created: now,
        updated: now,
        avatar: None,
    };
    comment.is_spam = state.spam.precheck(&comment, &config);

    state.comments.insert(&comment).await?;

    // Full classification and notification run detached; the response
    // waits for them only up to the bound.
    let worker = tokio::spawn(post_submit(
        state.clone(),
        comment.clone(),
        parent,
        config,
    ));
    match tokio::time::timeout(POST_SUBMIT_WAIT, worker).await {
        Ok(Ok(())) => {}
        Ok(Err(join_err)) => log::error!("post-submit task for {} panicked: {join_err}", comment.id),
        Err(_) => log::warn!(
            "post-submit work for {} still running, responding early",
            comment.id
        ),
    }

    Ok(json!({ "code": 0, "id": comment.id }))
}

/// Runs after the submission is already committed: outcomes are logged,
/// never returned to the submitter.
async fn post_submit(
    state: Arc<AppState>,
    comment: Comment,
    parent: Option<Comment>,
    config: ConfigMap,
) {
    match state.spam.classify(&comment, &config).await {
        Ok(flag) if flag != comment.is_spam => {
            if let Err(err) = state.comments.set_spam(&comment.id, flag, now_ms()).await {
                log::error!("storing reclassification of {} failed: {err:#}", comment.id);
            }
        }
        Ok(_) => {}
        Err(err) => log::warn!("spam classification of {} failed: {err:#}", comment.id),
    }
    if let Err(err) = state
        .notifier
        .comment_posted(&comment, parent.as_ref(), &config)
        .await
    {
        log::warn!("notification for {} failed: {err:#}", comment.id);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdInput {
    pub id: String,
}

/// Toggle the caller's membership in the like set. Read-modify-write; two
/// concurrent toggles from one identity may interleave (see design notes).
pub async fn like(state: &Arc<AppState>, ctx: &RequestContext, input: IdInput) -> Result<Value> {
    if input.id.is_empty() {
        return Err(AppError::Validation("id is required".to_string()));
    }
    let comment = state
        .comments
        .find(&input.id)
        .await?
        .ok_or_else(|| AppError::NotFound("comment".to_string()))?;

    let mut likes = comment.likes;
    let liked = match likes.iter().position(|uid| uid == &ctx.token) {
        Some(index) => {
            likes.remove(index);
            false
        }
        None => {
            likes.push(ctx.token.clone());
            true
        }
    };
    state.comments.set_likes(&input.id, &likes, now_ms()).await?;
    Ok(json!({ "code": 0, "liked": liked }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminPageInput {
    pub per: Option<i64>,
    pub page: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub keyword: Option<String>,
}

pub async fn admin_page(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: AdminPageInput,
) -> Result<Value> {
    require_admin(ctx.admin)?;
    let per = input.per.unwrap_or(10).clamp(1, MAX_PAGE_SIZE);
    let page = input.page.unwrap_or(1).max(1);
    let filter = SpamFilter::from_request(input.kind.as_deref());
    let keyword = input.keyword.unwrap_or_default();
    let (total, rows) = state.comments.admin_page(filter, &keyword, per, page).await?;
    Ok(json!({ "code": 0, "count": total, "data": rows }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminSetInput {
    pub id: String,
    pub set: ConfigMap,
}

pub async fn admin_set(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: AdminSetInput,
) -> Result<Value> {
    require_admin(ctx.admin)?;
    if input.id.is_empty() {
        return Err(AppError::Validation("id is required".to_string()));
    }
    if input.set.is_empty() {
        return Err(AppError::Validation("set is empty".to_string()));
    }
    let mut fields = Vec::with_capacity(input.set.len());
    for (key, value) in input.set {
        let column = mutable_column(&key)
            .ok_or_else(|| AppError::Validation(format!("field {key} cannot be modified")))?;
        fields.push((column.to_string(), value));
    }
    state.comments.update_fields(&input.id, &fields, now_ms()).await?;
    Ok(json!({ "code": 0 }))
}

pub async fn admin_delete(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: IdInput,
) -> Result<Value> {
    require_admin(ctx.admin)?;
    if input.id.is_empty() {
        return Err(AppError::Validation("id is required".to_string()));
    }
    state.comments.delete(&input.id).await?;
    Ok(json!({ "code": 0 }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportInput {
    pub source: String,
    pub file: String,
}

/// Import a legacy export. Parsing is delegated to the adapter registered
/// for `source`; each record then goes through the same record-building
/// and insert path as a live submission. Per-record failures accumulate
/// into the returned log instead of aborting the batch.
pub async fn admin_import(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: ImportInput,
) -> Result<Value> {
    require_admin(ctx.admin)?;
    let adapter = state
        .imports
        .iter()
        .find(|a| a.name() == input.source)
        .ok_or_else(|| AppError::Validation(format!("unknown import source {}", input.source)))?;
    let seeds = adapter
        .parse(&input.file)
        .map_err(|err| AppError::Validation(format!("cannot parse import file: {err}")))?;

    let mut lines = Vec::new();
    let mut imported = 0usize;
    for (index, seed) in seeds.into_iter().enumerate() {
        match import_one(state, seed).await {
            Ok(id) => {
                imported += 1;
                lines.push(format!("record {index}: imported as {id}"));
            }
            Err(err) => lines.push(format!("record {index}: failed: {err}")),
        }
    }
    Ok(json!({ "code": 0, "count": imported, "log": lines.join("\n") }))
}

async fn import_one(state: &Arc<AppState>, seed: CommentSeed) -> Result<String> {
    if seed.url.trim().is_empty() {
        return Err(AppError::Validation("url is required".to_string()));
    }
    if seed.body.trim().is_empty() {
        return Err(AppError::Validation("body is required".to_string()));
    }
    let now = now_ms();
    let created = seed.created.unwrap_or(now);
    let nick = match seed.nick.trim() {
        "" => "Anonymous".to_string(),
        nick => nick.to_string(),
    };
    let mail = seed.mail.trim().to_string();
    let comment = Comment {
        id: new_comment_id(),
        uid: String::new(),
        nick,
        mail_hash: state.identity.mail_hash(&mail),
        mail,
        link: seed.link.trim().to_string(),
        ip: String::new(),
        user_agent: String::new(),
        is_owner: false,
        url: seed.url,
        href: seed.href,
        pid: String::new(),
        rid: String::new(),
        body: sanitize_body(&seed.body),
        is_spam: false,
        likes: Vec::new(),
        top: false,
        created,
        updated: now,
        avatar: None,
    };
    state.comments.insert(&comment).await?;
    Ok(comment.id)
}

pub async fn admin_export(state: &Arc<AppState>, ctx: &RequestContext) -> Result<Value> {
    require_admin(ctx.admin)?;
    let comments = state.comments.export_all().await?;
    Ok(json!({ "code": 0, "data": comments }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CountsInput {
    pub urls: Vec<String>,
    pub include_reply: bool,
}

pub async fn counts(state: &Arc<AppState>, input: CountsInput) -> Result<Value> {
    let counts = state
        .comments
        .counts_by_url(&input.urls, input.include_reply)
        .await?;
    let data: Vec<Value> = counts
        .into_iter()
        .map(|(url, count)| json!({ "url": url, "count": count }))
        .collect();
    Ok(json!({ "data": data }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecentInput {
    pub urls: Vec<String>,
    pub include_reply: bool,
    pub page_size: Option<i64>,
}

pub async fn recent(
    state: &Arc<AppState>,
    ctx: &RequestContext,
    input: RecentInput,
) -> Result<Value> {
    let limit = input.page_size.unwrap_or(RECENT_DEFAULT).clamp(1, RECENT_MAX);
    let rows = state
        .comments
        .recent(&input.urls, input.include_reply, limit)
        .await?;
    let comments: Vec<Comment> = rows
        .into_iter()
        .map(|c| strip_private(c, ctx.admin))
        .collect();
    Ok(json!({ "data": comments }))
}
