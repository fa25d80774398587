use actix_web::{delete, get, post, put, web, HttpResponse};
use tracing::info;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::auth::AuthenticatedUser;
use crate::api::models::{
    CreateMessageRequest, CreateSessionRequest, FavoriteSessionRequest, Page, PageQuery,
    RenameSessionRequest,
};
use crate::db::{service::DbService, DbPool};

type ApiResult = Result<HttpResponse, ApiError>;

const DEFAULT_SESSION_NAME: &str = "New Chat";

fn validate_page(query: &PageQuery) -> Result<(), ApiError> {
    if query.size == 0 {
        return Err(ApiError::Validation(
            "size: must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

// --- Sessions ---

#[post("")]
pub async fn create_session(
    pool: web::Data<DbPool>,
    user: web::ReqData<AuthenticatedUser>,
    req: web::Json<CreateSessionRequest>,
) -> ApiResult {
    let req = req.into_inner();
    let name = match req.name {
        Some(name) => {
            if name.trim().is_empty() {
                return Err(ApiError::Validation("name: must not be blank".to_string()));
            }
            name
        }
        None => DEFAULT_SESSION_NAME.to_string(),
    };

    info!("Create session for user_id={}", user.user_id());

    let conn = pool.lock().unwrap();
    let session = DbService::insert_session(&conn, user.user_id(), &name)?;
    Ok(HttpResponse::Created().json(session))
}

#[get("/{user_id}")]
pub async fn list_sessions(
    pool: web::Data<DbPool>,
    user_id: web::Path<String>,
    query: web::Query<PageQuery>,
) -> ApiResult {
    validate_page(&query)?;

    let conn = pool.lock().unwrap();
    let (sessions, total) =
        DbService::find_sessions_by_user(&conn, &user_id, query.page, query.size)?;
    Ok(HttpResponse::Ok().json(Page::new(sessions, query.page, query.size, total)))
}

#[put("/{id}/rename")]
pub async fn rename_session(
    pool: web::Data<DbPool>,
    id: web::Path<Uuid>,
    req: web::Json<RenameSessionRequest>,
) -> ApiResult {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name: must not be blank".to_string()));
    }

    let id = id.into_inner();
    info!("Rename session id={}", id);

    let conn = pool.lock().unwrap();
    match DbService::rename_session(&conn, id, &req.name)? {
        Some(session) => Ok(HttpResponse::Ok().json(session)),
        None => Err(ApiError::NotFound("Session not found".to_string())),
    }
}

#[put("/{id}/favorite")]
pub async fn favorite_session(
    pool: web::Data<DbPool>,
    id: web::Path<Uuid>,
    req: web::Json<FavoriteSessionRequest>,
) -> ApiResult {
    let id = id.into_inner();
    info!("Update favorite for session id={} favorite={}", id, req.favorite);

    let conn = pool.lock().unwrap();
    match DbService::set_favorite(&conn, id, req.favorite)? {
        Some(session) => Ok(HttpResponse::Ok().json(session)),
        None => Err(ApiError::NotFound("Session not found".to_string())),
    }
}

#[delete("/{id}")]
pub async fn delete_session(pool: web::Data<DbPool>, id: web::Path<Uuid>) -> ApiResult {
    let id = id.into_inner();
    let conn = pool.lock().unwrap();

    if DbService::get_session(&conn, id)?.is_none() {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    info!("Delete session id={}", id);
    DbService::delete_session(&conn, id)?;
    Ok(HttpResponse::NoContent().finish())
}

// --- Messages ---

#[post("/{id}/messages")]
pub async fn add_message(
    pool: web::Data<DbPool>,
    id: web::Path<Uuid>,
    req: web::Json<CreateMessageRequest>,
) -> ApiResult {
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation(
            "message: must not be blank".to_string(),
        ));
    }

    let id = id.into_inner();
    let req = req.into_inner();
    let conn = pool.lock().unwrap();

    if DbService::get_session(&conn, id)?.is_none() {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }

    info!("Save chat message for session_id={} sender={}", id, req.sender);

    let message =
        DbService::insert_message(&conn, id, req.sender, &req.message, req.context.as_ref())?;
    Ok(HttpResponse::Created().json(message))
}

#[get("/{id}/messages")]
pub async fn list_messages(
    pool: web::Data<DbPool>,
    id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> ApiResult {
    validate_page(&query)?;

    let id = id.into_inner();
    let conn = pool.lock().unwrap();

    if DbService::get_session(&conn, id)?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Session not found with id: {}",
            id
        )));
    }

    let (messages, total) = DbService::list_messages(&conn, id, query.page, query.size)?;
    Ok(HttpResponse::Ok().json(Page::new(messages, query.page, query.size, total)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/api/sessions")
            .service(create_session)
            .service(list_sessions)
            .service(rename_session)
            .service(favorite_session)
            .service(delete_session)
            .service(add_message)
            .service(list_messages),
    );
}
