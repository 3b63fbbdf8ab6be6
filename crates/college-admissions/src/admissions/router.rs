use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicationStatus, Program};
use super::form::{RawFields, RawSubmission, UploadedFile};
use super::intake::ValidationError;
use super::media::MediaHost;
use super::repository::{ApplicationFilter, ApplicationStore, PageRequest};
use super::service::{AdmissionError, AdmissionService};

/// Router exposing public intake and status endpoints plus the admin API.
///
/// Admin routes require `Authorization: Bearer <token>` when `admin_token` is set.
pub fn admission_router<S, M>(
    service: Arc<AdmissionService<S, M>>,
    admin_token: Option<String>,
) -> Router
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    let body_limit = service.policy().max_request_bytes();

    let public = Router::new()
        .route("/api/applications", post(submit_handler::<S, M>))
        .route(
            "/api/applications/status",
            get(status_query_handler::<S, M>),
        )
        .route(
            "/api/applications/status/:application_id",
            get(status_handler::<S, M>),
        )
        .layer(DefaultBodyLimit::max(body_limit));

    let admin = Router::new()
        .route("/api/admin/applications", get(list_handler::<S, M>))
        .route(
            "/api/admin/applications/:application_id",
            get(detail_handler::<S, M>).patch(update_status_handler::<S, M>),
        )
        .route("/api/admin/statistics", get(statistics_handler::<S, M>))
        .route_layer(middleware::from_fn_with_state(
            AdminGuard::new(admin_token),
            require_admin,
        ));

    public.merge(admin).with_state(service)
}

/// Map a service error onto the public error body.
pub(crate) fn error_response(error: &AdmissionError) -> Response {
    let (status, message) = match error {
        AdmissionError::Validation(_) => (StatusCode::BAD_REQUEST, "missing information"),
        AdmissionError::Conflict(_) => (StatusCode::CONFLICT, "already submitted"),
        AdmissionError::NotFound => (StatusCode::NOT_FOUND, "application not found"),
        AdmissionError::Upload { .. } => (StatusCode::BAD_GATEWAY, "file upload failed, try again"),
        AdmissionError::Store(_) => (StatusCode::SERVICE_UNAVAILABLE, "service unavailable"),
    };
    let payload = json!({
        "error": message,
        "details": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn bad_request(details: impl Into<String>) -> Response {
    let payload = json!({
        "error": "missing information",
        "details": details.into(),
    });
    (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
}

/// Collect multipart text fields and files into a submission.
pub(crate) async fn read_submission(mut multipart: Multipart) -> Result<RawSubmission, Response> {
    let mut submission = RawSubmission::new(RawFields::new());

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| bad_request(err.body_text()))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| bad_request(err.body_text()))?;
                // unselected file inputs arrive as empty unnamed parts
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                let file = UploadedFile::new(file_name, content_type.as_deref(), bytes);
                if submission.accept_file(&name, file).is_err() {
                    return Err(bad_request(format!("unexpected file field '{name}'")));
                }
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| bad_request(err.body_text()))?;
                submission.fields.push_text(name, text);
            }
        }
    }

    Ok(submission)
}

pub(crate) async fn submit_handler<S, M>(
    State(service): State<Arc<AdmissionService<S, M>>>,
    multipart: Multipart,
) -> Response
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    let submission = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(response) => return response,
    };

    match service.submit(submission).await {
        Ok(receipt) => {
            let payload = json!({
                "applicationId": receipt.application_id,
                "status": receipt.status,
                "message": "Application submitted successfully",
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn status_handler<S, M>(
    State(service): State<Arc<AdmissionService<S, M>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    match service.status_by_id(&application_id).await {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StatusQuery {
    email: Option<String>,
    phone: Option<String>,
    transaction_id: Option<String>,
}

/// Status lookup by one of email, phone, or transaction id, checked in that order.
pub(crate) async fn status_query_handler<S, M>(
    State(service): State<Arc<AdmissionService<S, M>>>,
    Query(query): Query<StatusQuery>,
) -> Response
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    let result = if let Some(email) = query.email.as_deref() {
        service.status_by_email(email).await
    } else if let Some(phone) = query.phone.as_deref() {
        service.status_by_phone(phone).await
    } else if let Some(transaction_id) = query.transaction_id.as_deref() {
        service.status_by_transaction_id(transaction_id).await
    } else {
        Err(AdmissionError::Validation(ValidationError::BlankLookupKey(
            "email, phone or transactionId",
        )))
    };

    match result {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<String>,
    program: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> Result<ApplicationFilter, ValidationError> {
        let status = match non_blank(self.status.as_deref()) {
            Some(raw) => Some(
                raw.parse::<ApplicationStatus>()
                    .map_err(|_| ValidationError::InvalidStatus(raw.to_string()))?,
            ),
            None => None,
        };
        let program = match non_blank(self.program.as_deref()) {
            Some(raw) => Some(raw.parse::<Program>().map_err(|_| {
                ValidationError::InvalidField {
                    field: "program",
                    reason: format!("unknown program '{raw}'"),
                }
            })?),
            None => None,
        };
        Ok(ApplicationFilter { status, program })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub(crate) async fn list_handler<S, M>(
    State(service): State<Arc<AdmissionService<S, M>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    let filter = match query.filter() {
        Ok(filter) => filter,
        Err(error) => return error_response(&AdmissionError::Validation(error)),
    };
    let page = PageRequest::new(query.page, query.limit);

    match service.list(filter, page).await {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn detail_handler<S, M>(
    State(service): State<Arc<AdmissionService<S, M>>>,
    Path(application_id): Path<String>,
) -> Response
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    match service.get(&application_id).await {
        Ok(record) => (StatusCode::OK, axum::Json(record)).into_response(),
        Err(error) => error_response(&error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChange {
    status: String,
    #[serde(default)]
    notes: Option<String>,
}

pub(crate) async fn update_status_handler<S, M>(
    State(service): State<Arc<AdmissionService<S, M>>>,
    Path(application_id): Path<String>,
    axum::Json(change): axum::Json<StatusChange>,
) -> Response
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    match service
        .update_status(&application_id, &change.status, change.notes)
        .await
    {
        Ok(update) => (StatusCode::OK, axum::Json(update)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn statistics_handler<S, M>(
    State(service): State<Arc<AdmissionService<S, M>>>,
) -> Response
where
    S: ApplicationStore + 'static,
    M: MediaHost + 'static,
{
    match service.statistics().await {
        Ok(stats) => (StatusCode::OK, axum::Json(stats)).into_response(),
        Err(error) => error_response(&error),
    }
}

/// Shared-secret check for the admin routes.
#[derive(Debug, Clone)]
pub(crate) struct AdminGuard {
    token: Option<Arc<str>>,
}

impl AdminGuard {
    pub(crate) fn new(token: Option<String>) -> Self {
        Self {
            token: token
                .filter(|token| !token.trim().is_empty())
                .map(|token| Arc::from(token.trim())),
        }
    }

    pub(crate) fn allows(&self, authorization: Option<&str>) -> bool {
        let Some(expected) = self.token.as_deref() else {
            return true;
        };
        authorization
            .and_then(|value| value.strip_prefix("Bearer "))
            .is_some_and(|presented| presented.trim() == expected)
    }
}

async fn require_admin(State(guard): State<AdminGuard>, request: Request, next: Next) -> Response {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    if guard.allows(authorization) {
        next.run(request).await
    } else {
        let payload = json!({
            "error": "unauthorized",
        });
        (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
    }
}
