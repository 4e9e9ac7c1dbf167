use super::current_subject;
use crate::db::{ProfileField, User};
use crate::error::AppError;
use crate::users::{AuthResult, ClientInfo, LoginRequest, RegisterRequest};
use crate::AppState;
use actix_web::{http::header, HttpRequest, HttpResponse};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RefreshTokenRequest {
    #[serde(default)]
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    new_password: String,
}

fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T, AppError> {
    let body: &[u8] = if body.is_empty() { b"{}" } else { body };
    serde_json::from_slice(body).map_err(|e| AppError::ValidationError(format!("invalid request body: {e}")))
}

/// Reads the string named after the field's column, e.g. `{"username": "..."}`.
fn field_value(body: &[u8], field: ProfileField) -> Result<String, AppError> {
    let map: serde_json::Map<String, serde_json::Value> = parse(body)?;
    match map.get(field.column()) {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(AppError::ValidationError(format!("{} must be a string", field.column()))),
    }
}

fn client_info(req: &HttpRequest) -> ClientInfo {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    let ip = forwarded.or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()));
    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    ClientInfo { ip, user_agent }
}

fn auth_response(result: AuthResult) -> HttpResponse {
    HttpResponse::Ok().json(result)
}

fn user_response(user: User) -> HttpResponse {
    HttpResponse::Ok().json(user)
}

fn empty_response() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({}))
}

pub(super) async fn dispatch(
    method: &str,
    req: &HttpRequest,
    body: &[u8],
    state: &AppState,
) -> Result<HttpResponse, AppError> {
    let users = &state.users;

    match method {
        "Register" => {
            let request: RegisterRequest = parse(body)?;
            info!(target: "identity.rpc", "Registration attempt");
            Ok(auth_response(users.register(request, client_info(req)).await?))
        }
        "Login" => {
            let request: LoginRequest = parse(body)?;
            info!(target: "identity.rpc", "Login attempt");
            Ok(auth_response(users.login(request).await?))
        }
        "RefreshToken" => {
            let request: RefreshTokenRequest = parse(body)?;
            Ok(auth_response(users.refresh(&request.refresh_token).await?))
        }
        "Logout" => {
            let subject = current_subject(req)?;
            let request: RefreshTokenRequest = parse(body)?;
            users.logout(&subject, &request.refresh_token).await?;
            Ok(empty_response())
        }
        "GetProfile" => {
            let subject = current_subject(req)?;
            Ok(user_response(users.get_profile(&subject).await?))
        }
        "UpdateUsername" => update(req, body, state, ProfileField::Username).await,
        "UpdateEmail" => update(req, body, state, ProfileField::Email).await,
        "UpdateFullName" => update(req, body, state, ProfileField::FullName).await,
        "UpdateAvatar" => update(req, body, state, ProfileField::AvatarUrl).await,
        "UpdateLanguage" => update(req, body, state, ProfileField::Language).await,
        "ChangePassword" => {
            let subject = current_subject(req)?;
            let request: ChangePasswordRequest = parse(body)?;
            users
                .change_password(&subject, &request.old_password, &request.new_password)
                .await?;
            Ok(empty_response())
        }
        "DeleteAccount" => {
            let subject = current_subject(req)?;
            users.delete_account(&subject).await?;
            Ok(empty_response())
        }
        other => Err(AppError::UnknownMethod(other.to_string())),
    }
}

async fn update(
    req: &HttpRequest,
    body: &[u8],
    state: &AppState,
    field: ProfileField,
) -> Result<HttpResponse, AppError> {
    let subject = current_subject(req)?;
    let value = field_value(body, field)?;
    Ok(user_response(state.users.update_profile(&subject, field, &value).await?))
}
