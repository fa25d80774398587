use crate::api::error::ApiError;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use std::collections::HashMap;
use std::{
    future::{ready, Future, Ready},
    pin::Pin,
    rc::Rc,
};
use tracing::{debug, warn};

/// Maps static API keys to the user they belong to.
///
/// Keys are configured as "user_id:api_key" entries; malformed entries are
/// skipped with a warning.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    key_to_user: HashMap<String, String>,
}

impl ApiKeyStore {
    pub fn from_entries(entries: &[String]) -> Self {
        let mut key_to_user = HashMap::new();

        for entry in entries {
            let mut parts = entry.splitn(2, ':');
            match (parts.next(), parts.next()) {
                (Some(user_id), Some(api_key))
                    if !user_id.trim().is_empty() && !api_key.trim().is_empty() =>
                {
                    key_to_user.insert(api_key.trim().to_string(), user_id.trim().to_string());
                }
                _ => {
                    warn!("Skipping malformed api_keys entry: {:?}", entry);
                }
            }
        }

        ApiKeyStore { key_to_user }
    }

    pub fn user_id_for(&self, api_key: &str) -> Option<&str> {
        self.key_to_user.get(api_key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_user.is_empty()
    }

    pub fn len(&self) -> usize {
        self.key_to_user.len()
    }
}

/// The user identity resolved from the API key, attached to the request for
/// handlers to pick up via `web::ReqData`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(String);

impl AuthenticatedUser {
    pub fn user_id(&self) -> &str {
        &self.0
    }
}

pub struct ApiKeyAuth;

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let srv = self.service.clone();

        // Skip auth for /health and OPTIONS requests
        if req.method() == actix_web::http::Method::OPTIONS || req.path() == "/health" {
            return Box::pin(async move { srv.call(req).await });
        }

        // Get the key store from app data
        let store = match req.app_data::<actix_web::web::Data<ApiKeyStore>>() {
            Some(s) => s,
            None => {
                warn!("ApiKeyStore missing in app_data");
                return Box::pin(async move {
                    Err(actix_web::error::ErrorInternalServerError("Configuration error"))
                });
            }
        };

        let api_key = req
            .headers()
            .get("X-API-KEY")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let api_key = match api_key {
            Some(key) => key,
            None => {
                return Box::pin(async move {
                    Err(ApiError::Unauthorized("Missing API key".to_string()).into())
                });
            }
        };

        let user_id = match store.user_id_for(&api_key) {
            Some(user_id) => user_id.to_string(),
            None => {
                return Box::pin(async move {
                    Err(ApiError::Unauthorized("Invalid API key".to_string()).into())
                });
            }
        };

        debug!("Authenticated user: {}", user_id);
        req.extensions_mut().insert(AuthenticatedUser(user_id));

        Box::pin(async move {
            let res = srv.call(req).await?;
            Ok(res)
        })
    }
}
