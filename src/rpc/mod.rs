//! JSON RPC surface of the user service.
//!
//! Calls arrive as `POST /user.UserService/{method}` with a JSON body. The
//! auth gate runs before dispatch; for protected methods the resolved
//! [`AuthenticatedSubject`] is stored in the request extensions, where the
//! handlers pick it up.

mod handlers;

use crate::auth::gate::AUTHORIZATION_HEADER;
use crate::auth::AuthenticatedSubject;
use crate::error::{AppError, AuthError};
use crate::AppState;
use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use tracing::{debug, instrument};

pub const SERVICE_PATH: &str = "/user.UserService";

/// Registers the RPC route on an actix `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(&format!("{SERVICE_PATH}/{{method}}"), web::post().to(call));
}

#[instrument(skip_all, name = "identity.rpc", fields(method = %method))]
pub async fn call(
    req: HttpRequest,
    method: web::Path<String>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let method = method.into_inner();
    let authorization = req
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok());

    let identity = state.gate.authorize(&method, authorization)?;
    if let Some(subject) = identity.subject() {
        req.extensions_mut().insert(subject.clone());
    }

    debug!(target: "identity.rpc", "Dispatching call");
    handlers::dispatch(&method, &req, &body, &state).await
}

/// Subject stored by the gate for this request.
pub(crate) fn current_subject(req: &HttpRequest) -> Result<AuthenticatedSubject, AppError> {
    req.extensions()
        .get::<AuthenticatedSubject>()
        .cloned()
        .ok_or_else(|| AuthError::MissingCredentials.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_current_subject_reads_request_extensions() {
        let req = TestRequest::default().to_http_request();
        assert!(current_subject(&req).is_err());

        req.extensions_mut().insert(AuthenticatedSubject::new("u-1".into()));
        assert_eq!(current_subject(&req).unwrap().user_id(), "u-1");
    }
}
