use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::store::{PageRequest, SortField};
use crate::AppState;

pub mod dns_requests;
pub mod handlers;
pub mod zones;

/// Prefix every control-plane route is mounted under.
pub const API_ROOT: &str = "/api/v1";

/// Build the control-plane API router.
/// All routes are relative; the caller mounts this under [`API_ROOT`].
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/api-token/sync", post(handlers::sync_api_token))
        .route(
            "/api-token",
            get(handlers::list_api_tokens).post(handlers::create_api_token),
        )
        .route(
            "/api-token/:id",
            get(handlers::show_api_token).delete(handlers::destroy_api_token),
        )
        .route(
            "/api-token/:id/sensitive",
            get(handlers::show_sensitive_api_token),
        )
        .route(
            "/dns-request",
            get(dns_requests::list_dns_requests).post(dns_requests::create_dns_request),
        )
        .route("/dns-server/:name/zone", get(zones::list_server_zones))
        .fallback(fallback_404)
}

/// Full application with request tracing, without the outer middleware
/// stack (CORS, request ids).
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest(API_ROOT, api_router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

// ── Shared list parameters ───────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub sort_by: Option<String>,
    /// "asc" (default) or "desc".
    pub sort_dir: Option<String>,
    /// Comma-separated relation names to embed.
    pub includes: Option<String>,
}

impl ListParams {
    pub fn page_request(&self, sortable: &[SortField]) -> Result<PageRequest, AppError> {
        let defaults = PageRequest::default();
        let page = self.page.unwrap_or(defaults.page);
        if page < 1 {
            return Err(AppError::BadRequest("page must be >= 1".into()));
        }
        if page > PageRequest::MAX_PAGE {
            return Err(AppError::BadRequest(format!(
                "page must be <= {}",
                PageRequest::MAX_PAGE
            )));
        }
        let per_page = self
            .per_page
            .unwrap_or(defaults.per_page)
            .clamp(1, PageRequest::MAX_PER_PAGE);

        let sort_by = match self.sort_by.as_deref() {
            None => defaults.sort_by,
            Some(s) => SortField::parse(s)
                .filter(|f| sortable.contains(f))
                .ok_or_else(|| AppError::BadRequest(format!("cannot sort by '{}'", s)))?,
        };
        let descending = match self.sort_dir.as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(AppError::BadRequest(format!("invalid sort_dir '{}'", other)))
            }
        };

        Ok(PageRequest {
            page,
            per_page,
            sort_by,
            descending,
        })
    }

    pub fn includes(&self, relation: &str) -> bool {
        self.includes
            .as_deref()
            .map(|s| s.split(',').any(|r| r.trim() == relation))
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl Pagination {
    pub fn new(page: &PageRequest, total: i64) -> Self {
        Self {
            page: page.page,
            per_page: page.per_page,
            total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BaseResponse {
    pub messages: Vec<Message>,
}

impl BaseResponse {
    pub fn success(text: &str) -> Self {
        Self {
            messages: vec![Message {
                text: text.to_string(),
                kind: "success".to_string(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_clamp() {
        let params = ListParams {
            per_page: Some(10_000),
            ..Default::default()
        };
        let page = params.page_request(&[SortField::Id]).unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.per_page, PageRequest::MAX_PER_PAGE);
        assert!(!page.descending);
    }

    #[test]
    fn test_page_request_rejects_overflowing_page() {
        let params = ListParams {
            page: Some(i64::MAX),
            per_page: Some(100),
            ..Default::default()
        };
        assert!(matches!(
            params.page_request(&[SortField::Id]),
            Err(AppError::BadRequest(_))
        ));

        let params = ListParams {
            page: Some(PageRequest::MAX_PAGE),
            per_page: Some(PageRequest::MAX_PER_PAGE),
            ..Default::default()
        };
        let page = params.page_request(&[SortField::Id]).unwrap();
        assert!(page.offset() > 0);
    }

    #[test]
    fn test_page_request_rejects_unsortable_field() {
        let params = ListParams {
            sort_by: Some("expires_at".into()),
            ..Default::default()
        };
        assert!(params.page_request(&[SortField::Id, SortField::CreatedAt]).is_err());
        assert!(params.page_request(&[SortField::ExpiresAt]).is_ok());
    }

    #[test]
    fn test_includes_parses_comma_list() {
        let params = ListParams {
            includes: Some("dns_server, dns_records".into()),
            ..Default::default()
        };
        assert!(params.includes("dns_server"));
        assert!(params.includes("dns_records"));
        assert!(!params.includes("zone"));
    }
}
