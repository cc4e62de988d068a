use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::db::operations::users::{self, UserRow};
use crate::response::json_error;
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Serialize)]
struct SuccessResponse<T> {
    success: bool,
    data: T,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequest {
    email: String,
    password: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthData {
    user: AuthUser,
    token: String,
}

pub async fn register(State(state): State<AppState>, Json(payload): Json<RegisterRequest>) -> Response {
    let email = payload.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "邮箱格式无效").into_response();
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        return json_error(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "密码长度不能少于 8 位",
        )
        .into_response();
    }

    let display_name = payload.display_name.trim().to_string();
    if display_name.is_empty() {
        return json_error(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", "用户名不能为空")
            .into_response();
    }

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    match users::find_user_by_email(proxy.as_ref(), &email).await {
        Ok(Some(_)) => {
            return json_error(StatusCode::CONFLICT, "CONFLICT", "该邮箱已被注册").into_response();
        }
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(error = %err, "register email check failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    }

    let password_hash = match crate::auth::hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            tracing::warn!(error = %err, "password hash failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    let now = Utc::now().naive_utc();
    let user = UserRow {
        id: state.id_generator().next_id(),
        email,
        display_name,
        password_hash,
        created_at: now,
        updated_at: now,
    };

    if let Err(err) = users::insert_user(proxy.as_ref(), &user).await {
        tracing::warn!(error = %err, "user insert failed");
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
            .into_response();
    }

    let token = match crate::auth::sign_jwt_for_user(&user.id) {
        Ok((token, _expires_at)) => token,
        Err(err) => {
            tracing::warn!(error = %err, "jwt sign failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    (
        StatusCode::CREATED,
        Json(SuccessResponse {
            success: true,
            data: AuthData {
                user: to_auth_user(&user),
                token,
            },
        }),
    )
        .into_response()
}

pub async fn login(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> Response {
    let email = payload.email.trim().to_lowercase();

    let Some(proxy) = state.db_proxy() else {
        return json_error(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", "服务不可用")
            .into_response();
    };

    let user = match users::find_user_by_email(proxy.as_ref(), &email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "邮箱或密码错误")
                .into_response();
        }
        Err(err) => {
            tracing::warn!(error = %err, "login lookup failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    if !crate::auth::verify_password(&payload.password, &user.password_hash) {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "邮箱或密码错误")
            .into_response();
    }

    let token = match crate::auth::sign_jwt_for_user(&user.id) {
        Ok((token, _expires_at)) => token,
        Err(err) => {
            tracing::warn!(error = %err, "jwt sign failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "服务器内部错误")
                .into_response();
        }
    };

    Json(SuccessResponse {
        success: true,
        data: AuthData {
            user: to_auth_user(&user),
            token,
        },
    })
    .into_response()
}

pub async fn logout(Extension(_user): Extension<AuthUser>) -> Response {
    // Tokens are stateless; the client discards its copy.
    Json(MessageResponse {
        success: true,
        message: "退出登录成功",
    })
    .into_response()
}

pub async fn me(Extension(user): Extension<AuthUser>) -> Response {
    Json(SuccessResponse {
        success: true,
        data: user,
    })
    .into_response()
}

fn to_auth_user(user: &UserRow) -> AuthUser {
    AuthUser {
        id: user.id.clone(),
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        created_at: crate::auth::format_naive_datetime_iso_millis(user.created_at),
        updated_at: crate::auth::format_naive_datetime_iso_millis(user.updated_at),
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2 && !email.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@host"));
        assert!(!is_valid_email("user name@example.com"));
        assert!(!is_valid_email("user@@example.com"));
    }
}
