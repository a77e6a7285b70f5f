//! Comment status aggregation.
//!
//! The content source filters comments by one status at a time, so the
//! "all" view is assembled from four fetches. Status tokens are translated
//! with [`CommentStatus`] on the way out and on the way back.

use std::future::Future;

use ibulore_core::{CommentId, CommentStatus, Pagination, clamp_per_page, paginate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::services::customers::SortOrder;
use crate::upstream::content::Comment;
use crate::upstream::{ContentClient, MAX_PER_PAGE, Page, Params, UpstreamError};

const DEFAULT_PER_PAGE: u32 = 20;
const DEFAULT_AUTHOR_NAME: &str = "Administrador";
const DEFAULT_AUTHOR_EMAIL: &str = "admin@ibulore.com";

/// Where the aggregator reads and writes comments.
pub trait CommentSource: Send + Sync {
    fn list_comments(
        &self,
        params: &Params,
    ) -> impl Future<Output = Result<Page<Comment>, UpstreamError>> + Send;

    fn get_comment(
        &self,
        id: CommentId,
        embed: bool,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send;

    fn set_comment_status(
        &self,
        id: CommentId,
        status: CommentStatus,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send;

    fn update_comment(
        &self,
        id: CommentId,
        fields: &Map<String, Value>,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send;

    fn delete_comment(
        &self,
        id: CommentId,
        force: bool,
    ) -> impl Future<Output = Result<Value, UpstreamError>> + Send;

    fn create_comment(
        &self,
        body: &Value,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send;
}

impl CommentSource for ContentClient {
    fn list_comments(
        &self,
        params: &Params,
    ) -> impl Future<Output = Result<Page<Comment>, UpstreamError>> + Send {
        Self::list_comments(self, params)
    }

    fn get_comment(
        &self,
        id: CommentId,
        embed: bool,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send {
        Self::get_comment(self, id, embed)
    }

    fn set_comment_status(
        &self,
        id: CommentId,
        status: CommentStatus,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send {
        Self::set_comment_status(self, id, status)
    }

    fn update_comment(
        &self,
        id: CommentId,
        fields: &Map<String, Value>,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send {
        Self::update_comment(self, id, fields)
    }

    fn delete_comment(
        &self,
        id: CommentId,
        force: bool,
    ) -> impl Future<Output = Result<Value, UpstreamError>> + Send {
        Self::delete_comment(self, id, force)
    }

    fn create_comment(
        &self,
        body: &Value,
    ) -> impl Future<Output = Result<Comment, UpstreamError>> + Send {
        Self::create_comment(self, body)
    }
}

/// Local sort key for the merged "all" view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommentOrderBy {
    #[default]
    Date,
    Id,
}

/// Query parameters of `GET /blog/comments`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub post: Option<u64>,
    pub orderby: Option<String>,
    pub order: Option<String>,
    #[serde(rename = "_embed")]
    pub embed: Option<String>,
}

impl CommentListQuery {
    fn order_by(&self) -> CommentOrderBy {
        match self.orderby.as_deref().map(str::trim) {
            Some(by) if by.eq_ignore_ascii_case("id") => CommentOrderBy::Id,
            _ => CommentOrderBy::Date,
        }
    }

    fn sort_order(&self) -> SortOrder {
        SortOrder::parse(self.order.as_deref())
    }

    /// Parameters shared by every upstream fetch of this listing.
    fn base_params(&self) -> Params {
        Params::new()
            .with_opt("search", self.search.as_deref().filter(|s| !s.is_empty()))
            .with_opt("post", self.post)
            .with_opt("orderby", self.orderby.as_deref())
            .with("order", self.sort_order().as_str())
            .with_opt("_embed", self.embed.as_ref().map(|_| "true"))
    }
}

/// Response of `GET /blog/comments`.
#[derive(Debug, Clone, Serialize)]
pub struct CommentList {
    pub comments: Vec<Comment>,
    pub pagination: Pagination,
}

/// Per-status comment counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommentStatusCounts {
    pub approved: u64,
    pub hold: u64,
    pub spam: u64,
    pub trash: u64,
    pub total: u64,
    /// Some bucket holds more rows than its fetch returned: the reported
    /// total exceeds the rows, or a headerless fetch filled its window.
    pub truncated: bool,
}

impl CommentStatusCounts {
    fn set(&mut self, status: CommentStatus, count: u64) {
        match status {
            CommentStatus::Approved => self.approved = count,
            CommentStatus::Hold => self.hold = count,
            CommentStatus::Spam => self.spam = count,
            CommentStatus::Trash => self.trash = count,
        }
        self.total = self.approved + self.hold + self.spam + self.trash;
    }
}

/// Body of `PUT /blog/comments/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentUpdate {
    pub status: Option<String>,
    pub content: Option<String>,
}

/// Body of `POST /blog/comments/bulk`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub comment_ids: Option<Vec<CommentId>>,
    #[serde(default)]
    pub action: Option<String>,
}

/// Outcome for one id of a bulk request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkItem {
    pub comment_id: CommentId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `POST /blog/comments/bulk`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkOutcome {
    pub success: bool,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<BulkItem>,
    pub errors: Vec<String>,
}

/// Body of `POST /blog/comments/{id}/reply`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyRequest {
    pub content: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_url: Option<String>,
}

enum BulkAction {
    SetStatus(CommentStatus),
    Delete,
}

impl BulkAction {
    fn parse(action: &str) -> Option<Self> {
        match action {
            "delete" => Some(Self::Delete),
            "approve" => Some(Self::SetStatus(CommentStatus::Approved)),
            "hold" => Some(Self::SetStatus(CommentStatus::Hold)),
            "spam" => Some(Self::SetStatus(CommentStatus::Spam)),
            "trash" => Some(Self::SetStatus(CommentStatus::Trash)),
            _ => None,
        }
    }
}

/// Comment operations over a [`CommentSource`].
#[derive(Debug)]
pub struct CommentService<'a, S> {
    source: &'a S,
}

impl<'a, S: CommentSource> CommentService<'a, S> {
    #[must_use]
    pub const fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// List comments, merging all four buckets when no single status is
    /// requested.
    ///
    /// # Errors
    ///
    /// Only a single-status listing propagates upstream failures; the merged
    /// view skips failed buckets.
    pub async fn list(&self, query: &CommentListQuery) -> Result<CommentList, AppError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = clamp_per_page(query.per_page.unwrap_or(DEFAULT_PER_PAGE), MAX_PER_PAGE);

        match query.status.as_deref().map(str::trim) {
            None | Some("" | "all") => Ok(self.list_all(query, page, per_page).await),
            Some(status) => {
                let params = query
                    .base_params()
                    .with("status", CommentStatus::outbound_token(status))
                    .with("page", page)
                    .with("per_page", per_page);
                let result = self.source.list_comments(&params).await?;
                Ok(CommentList {
                    pagination: Pagination::from_upstream(
                        page,
                        per_page,
                        result.total,
                        result.total_pages,
                    ),
                    comments: result.items,
                })
            }
        }
    }

    async fn list_all(&self, query: &CommentListQuery, page: u32, per_page: u32) -> CommentList {
        let mut comments = Vec::new();
        for status in CommentStatus::ALL {
            let params = query
                .base_params()
                .with("status", status.to_source_token())
                .with("per_page", MAX_PER_PAGE);
            match self.source.list_comments(&params).await {
                Ok(result) => comments.extend(result.items),
                Err(e) => {
                    tracing::warn!(status = %status, error = %e, "Failed to fetch comments for status");
                }
            }
        }

        let order = query.sort_order();
        match query.order_by() {
            CommentOrderBy::Date => comments.sort_by(|a, b| order.apply(a.date.cmp(&b.date))),
            CommentOrderBy::Id => comments.sort_by(|a, b| order.apply(a.id.cmp(&b.id))),
        }

        let total = comments.len() as u64;
        CommentList {
            comments: paginate(&comments, page, per_page).to_vec(),
            pagination: Pagination::new(page, per_page, total),
        }
    }

    /// Count comments per status. Failed buckets count zero.
    pub async fn counts(&self) -> CommentStatusCounts {
        let mut counts = CommentStatusCounts::default();
        for status in CommentStatus::ALL {
            let params = Params::new()
                .with("status", status.to_source_token())
                .with("per_page", MAX_PER_PAGE);
            match self.source.list_comments(&params).await {
                Ok(result) => {
                    counts.truncated |= result.is_truncated();
                    counts.set(status, result.total.max(result.items.len() as u64));
                }
                Err(e) => {
                    tracing::warn!(status = %status, error = %e, "Failed to count comments");
                }
            }
        }
        counts
    }

    /// Fetch one comment with embedded resources.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn get(&self, id: CommentId) -> Result<Comment, AppError> {
        Ok(self.source.get_comment(id, true).await?)
    }

    /// Move a comment into a bucket.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn transition(
        &self,
        id: CommentId,
        status: CommentStatus,
    ) -> Result<Comment, AppError> {
        let comment = self.source.set_comment_status(id, status).await?;
        tracing::info!(comment_id = %id, status = %status, "Comment status changed");
        Ok(comment)
    }

    /// Partially update status and/or content.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if neither field is set.
    pub async fn update(&self, id: CommentId, update: CommentUpdate) -> Result<Comment, AppError> {
        let mut fields = Map::new();
        if let Some(status) = update.status.as_deref().filter(|s| !s.trim().is_empty()) {
            fields.insert(
                "status".to_string(),
                Value::String(CommentStatus::outbound_token(status.trim())),
            );
        }
        if let Some(content) = update.content {
            fields.insert("content".to_string(), Value::String(content));
        }
        if fields.is_empty() {
            return Err(AppError::BadRequest(
                "No valid fields to update".to_string(),
            ));
        }
        Ok(self.source.update_comment(id, &fields).await?)
    }

    /// Delete a comment, permanently when `force` is set.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream call fails.
    pub async fn delete(&self, id: CommentId, force: bool) -> Result<Value, AppError> {
        let deleted = self.source.delete_comment(id, force).await?;
        tracing::info!(comment_id = %id, force, "Comment deleted");
        Ok(deleted)
    }

    /// Apply one action to many comments, each independently.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the id list is missing or empty or the
    /// action is missing. Per-id failures never fail the request.
    pub async fn bulk(&self, request: BulkRequest) -> Result<BulkOutcome, AppError> {
        let ids = request
            .comment_ids
            .filter(|ids| !ids.is_empty())
            .ok_or_else(|| AppError::BadRequest("comment_ids is required".to_string()))?;
        let action_name = request
            .action
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("action is required".to_string()))?;
        let action = BulkAction::parse(action_name.trim());

        let mut results = Vec::with_capacity(ids.len());
        let mut errors = Vec::new();
        for id in ids {
            let outcome = match &action {
                None => Err(format!("Unknown action: {action_name}")),
                Some(BulkAction::Delete) => self
                    .source
                    .delete_comment(id, true)
                    .await
                    .map_err(|e| e.to_string()),
                Some(BulkAction::SetStatus(status)) => self
                    .source
                    .set_comment_status(id, *status)
                    .await
                    .map(|c| json!(c))
                    .map_err(|e| e.to_string()),
            };
            match outcome {
                Ok(data) => results.push(BulkItem {
                    comment_id: id,
                    success: true,
                    data: Some(data),
                    error: None,
                }),
                Err(error) => {
                    tracing::warn!(comment_id = %id, action = %action_name, error = %error, "Bulk comment action failed");
                    errors.push(format!("Comment {id}: {error}"));
                    results.push(BulkItem {
                        comment_id: id,
                        success: false,
                        data: None,
                        error: Some(error),
                    });
                }
            }
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        tracing::info!(action = %action_name, processed = results.len(), successful, failed, "Bulk comment action");
        Ok(BulkOutcome {
            success: true,
            processed: results.len(),
            successful,
            failed,
            results,
            errors,
        })
    }

    /// Reply to a comment as the store, approved immediately.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` without content and `NotFound` if the parent
    /// does not exist.
    pub async fn reply(&self, parent_id: CommentId, request: ReplyRequest) -> Result<Comment, AppError> {
        let content = request
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("content is required".to_string()))?;

        let parent = match self.source.get_comment(parent_id, false).await {
            Ok(parent) => parent,
            Err(UpstreamError::NotFound(_)) => {
                return Err(AppError::NotFound(format!("Comment {parent_id} not found")));
            }
            Err(e) => return Err(e.into()),
        };

        let mut body = json!({
            "post": parent.post,
            "parent": parent_id,
            "content": content,
            "status": CommentStatus::Approved.to_source_token(),
            "author_name": request.author_name.filter(|s| !s.is_empty()).unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
            "author_email": request.author_email.filter(|s| !s.is_empty()).unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
        });
        if let (Some(url), Some(map)) = (request.author_url, body.as_object_mut()) {
            map.insert("author_url".to_string(), Value::String(url));
        }

        let reply = self.source.create_comment(&body).await?;
        tracing::info!(comment_id = %reply.id, parent_id = %parent_id, "Replied to comment");
        Ok(reply)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ibulore_core::PostId;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory content source that stores comments with source tokens.
    #[derive(Default)]
    struct FakeSource {
        comments: Mutex<Vec<(u64, u64, String, String)>>,
        failing_statuses: HashSet<&'static str>,
        failing_ids: HashSet<u64>,
        reported_totals: Vec<(&'static str, u64)>,
        omit_totals: bool,
        requests: Mutex<Vec<Params>>,
        created: Mutex<Vec<Value>>,
    }

    impl FakeSource {
        fn with(comments: &[(u64, &str, &str)]) -> Self {
            Self {
                comments: Mutex::new(
                    comments
                        .iter()
                        .map(|(id, status, date)| (*id, 9, (*status).to_string(), (*date).to_string()))
                        .collect(),
                ),
                ..Self::default()
            }
        }

        fn comment(id: u64, post: u64, status: &str, date: &str) -> Comment {
            serde_json::from_value::<Comment>(json!({
                "id": id,
                "post": post,
                "status": status,
                "date": date,
                "content": {"rendered": format!("comment {id}")}
            }))
            .unwrap()
            .normalized()
        }

        fn status_of(&self, id: u64) -> Option<String> {
            self.comments
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.0 == id)
                .map(|c| c.2.clone())
        }
    }

    impl CommentSource for FakeSource {
        async fn list_comments(&self, params: &Params) -> Result<Page<Comment>, UpstreamError> {
            self.requests.lock().unwrap().push(params.clone());
            let status = params.get("status").unwrap_or("approve").to_string();
            if self.failing_statuses.contains(status.as_str()) {
                return Err(UpstreamError::RateLimited(5));
            }
            let items: Vec<Comment> = self
                .comments
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.2 == status)
                .map(|c| Self::comment(c.0, c.1, &c.2, &c.3))
                .collect();
            let total = self
                .reported_totals
                .iter()
                .find(|(s, _)| *s == status)
                .map_or(items.len() as u64, |(_, t)| *t);
            Ok(Page {
                items,
                total,
                total_pages: 1,
                total_reported: !self.omit_totals,
            })
        }

        async fn get_comment(&self, id: CommentId, _embed: bool) -> Result<Comment, UpstreamError> {
            self.comments
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.0 == id.as_u64())
                .map(|c| Self::comment(c.0, c.1, &c.2, &c.3))
                .ok_or_else(|| UpstreamError::NotFound(format!("comment {id}")))
        }

        async fn set_comment_status(
            &self,
            id: CommentId,
            status: CommentStatus,
        ) -> Result<Comment, UpstreamError> {
            if self.failing_ids.contains(&id.as_u64()) {
                return Err(UpstreamError::Api {
                    status: 500,
                    code: None,
                    message: "boom".to_string(),
                    body: Value::Null,
                });
            }
            let mut comments = self.comments.lock().unwrap();
            let entry = comments
                .iter_mut()
                .find(|c| c.0 == id.as_u64())
                .ok_or_else(|| UpstreamError::NotFound(format!("comment {id}")))?;
            entry.2 = status.to_source_token().to_string();
            Ok(Self::comment(entry.0, entry.1, &entry.2, &entry.3))
        }

        async fn update_comment(
            &self,
            id: CommentId,
            fields: &Map<String, Value>,
        ) -> Result<Comment, UpstreamError> {
            let mut comments = self.comments.lock().unwrap();
            let entry = comments
                .iter_mut()
                .find(|c| c.0 == id.as_u64())
                .ok_or_else(|| UpstreamError::NotFound(format!("comment {id}")))?;
            if let Some(status) = fields.get("status").and_then(Value::as_str) {
                entry.2 = status.to_string();
            }
            Ok(Self::comment(entry.0, entry.1, &entry.2, &entry.3))
        }

        async fn delete_comment(&self, id: CommentId, _force: bool) -> Result<Value, UpstreamError> {
            if self.failing_ids.contains(&id.as_u64()) {
                return Err(UpstreamError::NotFound(format!("comment {id}")));
            }
            let mut comments = self.comments.lock().unwrap();
            comments.retain(|c| c.0 != id.as_u64());
            Ok(json!({"deleted": true, "previous": {"id": id}}))
        }

        async fn create_comment(&self, body: &Value) -> Result<Comment, UpstreamError> {
            self.created.lock().unwrap().push(body.clone());
            Ok(Self::comment(500, body["post"].as_u64().unwrap_or(0), "approve", "2024-06-01"))
        }
    }

    fn counts_fixture() -> FakeSource {
        FakeSource::with(&[
            (1, "approve", "2024-01-01"),
            (2, "approve", "2024-01-05"),
            (3, "hold", "2024-01-02"),
            (4, "hold", "2024-01-03"),
            (5, "hold", "2024-01-07"),
            (6, "trash", "2024-01-04"),
        ])
    }

    #[tokio::test]
    async fn test_counts_scenario() {
        let source = counts_fixture();
        let counts = CommentService::new(&source).counts().await;
        assert_eq!(
            counts,
            CommentStatusCounts {
                approved: 2,
                hold: 3,
                spam: 0,
                trash: 1,
                total: 6,
                truncated: false,
            }
        );
    }

    #[tokio::test]
    async fn test_counts_failed_bucket_is_zero() {
        let mut source = counts_fixture();
        source.failing_statuses.insert("hold");
        let counts = CommentService::new(&source).counts().await;
        assert_eq!(counts.hold, 0);
        assert_eq!(counts.total, 3);
    }

    #[tokio::test]
    async fn test_counts_use_reported_totals() {
        let mut source = counts_fixture();
        source.reported_totals.push(("approve", 250));
        let counts = CommentService::new(&source).counts().await;
        assert_eq!(counts.approved, 250);
        assert_eq!(counts.total, 254);
        assert!(counts.truncated);
    }

    #[tokio::test]
    async fn test_counts_flag_full_window_without_header() {
        let rows: Vec<(u64, &str, &str)> = (1..=100).map(|i| (i, "spam", "2024-01-01")).collect();
        let mut source = FakeSource::with(&rows);
        source.omit_totals = true;
        let counts = CommentService::new(&source).counts().await;
        assert_eq!(counts.spam, 100);
        assert!(counts.truncated);
    }

    #[tokio::test]
    async fn test_counts_exact_full_window_is_complete() {
        let rows: Vec<(u64, &str, &str)> = (1..=100).map(|i| (i, "spam", "2024-01-01")).collect();
        let source = FakeSource::with(&rows);
        let counts = CommentService::new(&source).counts().await;
        assert_eq!(counts.spam, 100);
        assert!(!counts.truncated);
    }

    #[tokio::test]
    async fn test_list_all_merges_sorts_and_paginates() {
        let source = counts_fixture();
        let service = CommentService::new(&source);
        let list = service
            .list(&CommentListQuery {
                per_page: Some(4),
                ..CommentListQuery::default()
            })
            .await
            .unwrap();

        assert_eq!(list.pagination.total, 6);
        assert_eq!(list.pagination.total_pages, 2);
        let ids: Vec<u64> = list.comments.iter().map(|c| c.id.as_u64()).collect();
        assert_eq!(ids, vec![5, 2, 6, 4]);
        assert!(list.comments.iter().all(|c| c.status != "approve"));

        let second = service
            .list(&CommentListQuery {
                page: Some(2),
                per_page: Some(4),
                status: Some("all".to_string()),
                orderby: Some("id".to_string()),
                order: Some("ASC".to_string()),
                ..CommentListQuery::default()
            })
            .await
            .unwrap();
        let ids: Vec<u64> = second.comments.iter().map(|c| c.id.as_u64()).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[tokio::test]
    async fn test_list_all_skips_failed_status() {
        let mut source = counts_fixture();
        source.failing_statuses.insert("trash");
        let list = CommentService::new(&source)
            .list(&CommentListQuery::default())
            .await
            .unwrap();
        assert_eq!(list.pagination.total, 5);
    }

    #[tokio::test]
    async fn test_single_status_translates_token() {
        let source = counts_fixture();
        let list = CommentService::new(&source)
            .list(&CommentListQuery {
                status: Some("approved".to_string()),
                embed: Some(String::new()),
                ..CommentListQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(list.comments.len(), 2);
        assert!(list.comments.iter().all(|c| c.status == "approved"));

        let requests = source.requests.lock().unwrap();
        let last = requests.last().unwrap();
        assert_eq!(last.get("status"), Some("approve"));
        assert_eq!(last.get("_embed"), Some("true"));
        assert_eq!(last.get("per_page"), Some("20"));
    }

    #[tokio::test]
    async fn test_unknown_status_forwarded_verbatim() {
        let source = counts_fixture();
        let list = CommentService::new(&source)
            .list(&CommentListQuery {
                status: Some("unapproved".to_string()),
                ..CommentListQuery::default()
            })
            .await
            .unwrap();
        assert!(list.comments.is_empty());
        let requests = source.requests.lock().unwrap();
        assert_eq!(requests.last().unwrap().get("status"), Some("unapproved"));
    }

    #[tokio::test]
    async fn test_status_round_trip_through_transitions() {
        let source = counts_fixture();
        let service = CommentService::new(&source);
        for status in CommentStatus::ALL {
            let comment = service.transition(CommentId::new(3), status).await.unwrap();
            assert_eq!(comment.status, status.as_str());
            assert_eq!(source.status_of(3).as_deref(), Some(status.to_source_token()));

            let fetched = service.get(CommentId::new(3)).await.unwrap();
            assert_eq!(fetched.status, status.as_str());
        }
    }

    #[tokio::test]
    async fn test_approve_reject_spam_lands_in_one_bucket() {
        let source = counts_fixture();
        let service = CommentService::new(&source);
        let id = CommentId::new(3);
        for status in [CommentStatus::Approved, CommentStatus::Hold, CommentStatus::Spam] {
            service.transition(id, status).await.unwrap();
        }

        for status in CommentStatus::ALL {
            let list = service
                .list(&CommentListQuery {
                    status: Some(status.as_str().to_string()),
                    ..CommentListQuery::default()
                })
                .await
                .unwrap();
            let listed = list.comments.iter().any(|c| c.id == id);
            assert_eq!(listed, status == CommentStatus::Spam, "bucket {status}");
            assert!(list.comments.iter().all(|c| c.status == status.as_str()));
        }
        assert_eq!(service.counts().await.spam, 1);
    }

    #[tokio::test]
    async fn test_update_requires_a_field() {
        let source = counts_fixture();
        let service = CommentService::new(&source);
        assert!(matches!(
            service.update(CommentId::new(1), CommentUpdate::default()).await,
            Err(AppError::BadRequest(_))
        ));

        let updated = service
            .update(
                CommentId::new(3),
                CommentUpdate {
                    status: Some("approved".to_string()),
                    content: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, "approved");
        assert_eq!(source.status_of(3).as_deref(), Some("approve"));
    }

    #[tokio::test]
    async fn test_bulk_isolation() {
        let mut source = counts_fixture();
        source.failing_ids.insert(2);
        let outcome = CommentService::new(&source)
            .bulk(BulkRequest {
                comment_ids: Some(vec![CommentId::new(1), CommentId::new(2), CommentId::new(3)]),
                action: Some("spam".to_string()),
            })
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.successful, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.successful + outcome.failed, outcome.processed);
        assert!(!outcome.results[1].success);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(source.status_of(1).as_deref(), Some("spam"));
        assert_eq!(source.status_of(3).as_deref(), Some("spam"));
    }

    #[tokio::test]
    async fn test_bulk_delete_and_unknown_action() {
        let source = counts_fixture();
        let service = CommentService::new(&source);

        let outcome = service
            .bulk(BulkRequest {
                comment_ids: Some(vec![CommentId::new(6)]),
                action: Some("delete".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(outcome.successful, 1);
        assert_eq!(source.status_of(6), None);

        let outcome = service
            .bulk(BulkRequest {
                comment_ids: Some(vec![CommentId::new(1), CommentId::new(2)]),
                action: Some("archive".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.failed, 2);
        assert!(outcome.results.iter().all(|r| r.error.as_deref() == Some("Unknown action: archive")));
    }

    #[tokio::test]
    async fn test_bulk_rejects_malformed_requests() {
        let source = counts_fixture();
        let service = CommentService::new(&source);
        for request in [
            BulkRequest::default(),
            BulkRequest {
                comment_ids: Some(Vec::new()),
                action: Some("spam".to_string()),
            },
            BulkRequest {
                comment_ids: Some(vec![CommentId::new(1)]),
                action: None,
            },
        ] {
            assert!(matches!(service.bulk(request).await, Err(AppError::BadRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_reply_uses_parent_post_and_defaults() {
        let source = counts_fixture();
        let service = CommentService::new(&source);
        let reply = service
            .reply(
                CommentId::new(4),
                ReplyRequest {
                    content: Some("Gracias".to_string()),
                    ..ReplyRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reply.post, PostId::new(9));
        assert_eq!(reply.status, "approved");

        let created = source.created.lock().unwrap();
        assert_eq!(created[0]["parent"], 4);
        assert_eq!(created[0]["status"], "approve");
        assert_eq!(created[0]["author_name"], DEFAULT_AUTHOR_NAME);
        assert_eq!(created[0]["author_email"], DEFAULT_AUTHOR_EMAIL);
        assert!(created[0].get("author_url").is_none());
    }

    #[tokio::test]
    async fn test_reply_errors() {
        let source = counts_fixture();
        let service = CommentService::new(&source);
        assert!(matches!(
            service.reply(CommentId::new(4), ReplyRequest::default()).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            service
                .reply(
                    CommentId::new(404),
                    ReplyRequest {
                        content: Some("Hola".to_string()),
                        ..ReplyRequest::default()
                    }
                )
                .await,
            Err(AppError::NotFound(_))
        ));
    }
}
