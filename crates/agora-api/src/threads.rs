use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use agora_db::models::ThreadFilter;
use agora_types::api::{CreateThreadRequest, Data, ThreadListQuery};
use agora_types::models::{Category, Thread, ThreadDetails, ThreadSummary, User};
use agora_types::{AgoraError, AgoraResult, UserId};

use crate::error::ApiResult;
use crate::state::AppState;

const TITLE_LEN: (usize, usize) = (5, 200);
const BODY_LEN: (usize, usize) = (10, 2000);
const MAX_PAGE_SIZE: u32 = 50;

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<Data<Vec<Category>>>> {
    let categories = state.db.call(|db| db.list_categories()).await?;
    Ok(Json(Data::new(categories)))
}

pub async fn list_threads(
    State(state): State<AppState>,
    Query(query): Query<ThreadListQuery>,
) -> ApiResult<Json<Data<Vec<ThreadSummary>>>> {
    let filter = thread_filter(query)?;
    let threads = state.db.call(move |db| db.list_threads(&filter)).await?;
    Ok(Json(Data::new(threads)))
}

pub async fn create_thread(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<Data<ThreadDetails>>)> {
    let title = bounded(&req.title, "title", TITLE_LEN)?;
    let body = bounded(&req.body, "body", BODY_LEN)?;
    let slug = req.category_slug.trim().to_string();
    let author = user.id;

    let details = state
        .db
        .call(move |db| {
            let category_id = db
                .get_category_id_by_slug(&slug)?
                .ok_or_else(|| AgoraError::validation(format!("unknown category '{}'", slug)))?;
            let id = db.create_thread(category_id, author, &title, &body)?;
            load_details(db, id, Some(author))
        })
        .await?;

    Ok((StatusCode::CREATED, Json(Data::new(details))))
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<i64>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<Data<ThreadDetails>>> {
    let thread_id = positive_id(thread_id, "thread id")?;
    let viewer = user.id;
    let details = state.db.call(move |db| load_details(db, thread_id, Some(viewer))).await?;
    Ok(Json(Data::new(details)))
}

fn load_details(db: &agora_db::Database, id: i64, viewer: Option<UserId>) -> anyhow::Result<ThreadDetails> {
    let thread: Thread = db
        .get_thread(id)?
        .ok_or_else(|| AgoraError::not_found("thread"))?
        .into();
    let counts = db.thread_counts(id, viewer)?;
    Ok(ThreadDetails { thread, counts })
}

pub(crate) fn positive_id(id: i64, what: &str) -> AgoraResult<i64> {
    if id <= 0 {
        return Err(AgoraError::validation(format!("{} must be positive", what)));
    }
    Ok(id)
}

/// Trimmed text whose character count falls within `(min, max)`.
pub(crate) fn bounded(value: &str, name: &str, (min, max): (usize, usize)) -> AgoraResult<String> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AgoraError::validation(format!(
            "{} must be between {} and {} characters",
            name, min, max
        )));
    }
    Ok(value.to_string())
}

fn thread_filter(query: ThreadListQuery) -> AgoraResult<ThreadFilter> {
    let defaults = ThreadFilter::default();

    let page = query.page.unwrap_or(defaults.page);
    if page < 1 {
        return Err(AgoraError::validation("page must be at least 1"));
    }
    let page_size = query.page_size.unwrap_or(defaults.page_size);
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(AgoraError::validation(format!("pageSize must be between 1 and {}", MAX_PAGE_SIZE)));
    }
    let newest_first = match query.sort.as_deref() {
        None | Some("new") => true,
        Some("old") => false,
        Some(other) => return Err(AgoraError::validation(format!("unknown sort '{}'", other))),
    };

    Ok(ThreadFilter {
        page,
        page_size,
        category_slug: query.category.filter(|c| !c.trim().is_empty()),
        search: query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
        newest_first,
    })
}
