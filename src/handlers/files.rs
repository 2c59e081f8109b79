use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    models::User,
};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub url: String,
    pub project: String,
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub url: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub project: String,
    pub files: Vec<FileInfo>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct ProjectInfo {
    pub name: String,
    pub file_count: i64,
    pub total_size: i64,
}

#[derive(Debug, Serialize)]
pub struct ProjectsResponse {
    pub projects: Vec<ProjectInfo>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct ProjectsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub project: String,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteFileQuery {
    pub project: String,
    pub file: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteProjectQuery {
    pub project: String,
}

fn pagination(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.filter(|p| *p > 0).unwrap_or(1);
    let per_page = per_page.filter(|p| *p > 0 && *p <= 100).unwrap_or(10);
    (page, per_page, (page - 1) * per_page)
}

fn total_pages(total: i64, per_page: i64) -> i64 {
    if per_page == 0 {
        return 0;
    }
    (total + per_page - 1) / per_page
}

fn sanitize_project_name(project: &str) -> String {
    let name = project
        .trim()
        .to_lowercase()
        .replace("..", "")
        .replace(['/', '\\'], "-");
    if name.is_empty() {
        "default".to_string()
    } else {
        name
    }
}

fn file_url(state: &AppState, user: &User, project: &str, file: &str) -> String {
    format!(
        "{}/files/user_{}/{}/{}",
        state.config.domain, user.id, project, file
    )
}

/// Upload pipeline: identity and rate admission already happened in the
/// middleware; here the remaining order is validate, reserve quota, persist
/// bytes, persist the record, then commit the counter. Any rejection before
/// the byte-sink write means nothing was stored and nothing was counted.
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut project_name = String::new();
    let mut file_bytes = None;
    let mut file_name = String::from("file");
    let mut mime_type = String::from("application/octet-stream");

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Error reading form: {}", e)))?
    {
        match field.name() {
            Some("project") => {
                project_name = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Error reading form: {}", e)))?;
            }
            Some("file") => {
                if let Some(name) = field.file_name() {
                    file_name = name.to_string();
                }
                if let Some(ct) = field.content_type() {
                    mime_type = ct.to_string();
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Error reading file: {}", e)))?;
                file_bytes = Some(bytes);
            }
            _ => {}
        }
    }

    let bytes = file_bytes
        .ok_or_else(|| AppError::Validation("'file' form field is required".to_string()))?;

    if bytes.len() > state.config.max_file_size {
        return Err(AppError::Validation(format!(
            "File is too large. Max size is {} bytes.",
            state.config.max_file_size
        )));
    }
    if !state.config.allowed_mime_types.contains(&mime_type) {
        return Err(AppError::UnsupportedMediaType(mime_type));
    }

    let project_name = sanitize_project_name(&project_name);
    let size = bytes.len() as i64;

    // Reservation holds the tenant's quota lock until the commit below.
    let reservation = state.ledger.reserve(user.id, size).await?;

    let project = state
        .store
        .first_or_create_project(user.id, &project_name)
        .await?;

    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{}", ext)),
        None => (file_name.clone(), String::new()),
    };
    let safe_name = format!("{}-{}{}", stem, timestamp, ext);
    let path = format!("user_{}/{}/{}", user.id, project.name, safe_name);

    let written = state.files.write(&path, &bytes).await?;
    state
        .store
        .create_file(project.id, &safe_name, &path, written as i64, &mime_type)
        .await?;

    // Bytes and record are durable; from here on a counter failure is
    // drift, not a failed upload.
    state.ledger.commit_add(reservation).await;

    tracing::info!(
        user_id = %user.id,
        project = %project.name,
        file = %safe_name,
        size = written,
        "file uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded successfully".to_string(),
            url: file_url(&state, &user, &project.name, &safe_name),
            project: project.name,
            file: safe_name,
        }),
    ))
}

pub async fn list_projects(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ProjectsQuery>,
) -> Result<Json<ProjectsResponse>> {
    let (page, per_page, offset) = pagination(query.page, query.per_page);

    let projects = state.store.list_projects(user.id, per_page, offset).await?;
    let mut infos = Vec::with_capacity(projects.len());
    for project in projects {
        infos.push(ProjectInfo {
            file_count: state.store.count_files(project.id).await?,
            total_size: state.store.sum_project_file_sizes(project.id).await?,
            name: project.name,
        });
    }

    let total = state.store.count_projects(user.id).await?;

    Ok(Json(ProjectsResponse {
        projects: infos,
        total,
        page,
        per_page,
        total_pages: total_pages(total, per_page),
    }))
}

pub async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>> {
    let (page, per_page, offset) = pagination(query.page, query.per_page);

    let project = state
        .store
        .find_project(user.id, &query.project)
        .await?
        .ok_or(AppError::NotFound("Project"))?;

    let files = state.store.list_files(project.id, per_page, offset).await?;
    let infos = files
        .into_iter()
        .map(|f| FileInfo {
            url: file_url(&state, &user, &project.name, &f.name),
            name: f.name,
            size: f.size,
            uploaded_at: f.uploaded_at,
        })
        .collect();

    let total = state.store.count_files(project.id).await?;

    Ok(Json(ListResponse {
        project: project.name,
        files: infos,
        total,
        page,
        per_page,
        total_pages: total_pages(total, per_page),
    }))
}

/// Deletion is complete only once the counter reflects it; the byte-sink
/// removal is best-effort and never blocks the metadata deletion.
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<DeleteFileQuery>,
) -> Result<Json<Value>> {
    let project = state
        .store
        .find_project(user.id, &query.project)
        .await?
        .ok_or(AppError::NotFound("Project"))?;
    let file = state
        .store
        .find_file(project.id, &query.file)
        .await?
        .ok_or(AppError::NotFound("File"))?;

    if let Err(e) = state.files.delete(&file.path).await {
        tracing::warn!(path = %file.path, error = %e, "could not delete file from storage");
    }

    state.store.delete_file(file.id).await?;
    state.ledger.commit_remove(user.id, file.size).await?;

    tracing::info!(
        user_id = %user.id,
        project = %project.name,
        file = %file.name,
        size = file.size,
        "file deleted"
    );

    Ok(Json(json!({
        "message": "File deleted successfully",
        "project": query.project,
        "file": query.file,
    })))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<DeleteProjectQuery>,
) -> Result<Json<Value>> {
    let project = state
        .store
        .find_project(user.id, &query.project)
        .await?
        .ok_or(AppError::NotFound("Project"))?;

    let file_count = state.store.count_files(project.id).await?;
    if file_count > 0 {
        return Err(AppError::Validation(
            "Project has files and cannot be deleted. Delete all files first.".to_string(),
        ));
    }

    state.store.delete_project(project.id).await?;

    Ok(Json(json!({
        "message": "Project deleted successfully",
        "project": query.project,
    })))
}
