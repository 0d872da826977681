use crate::{
    attendance::session::SessionRegistry,
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    model::role::Role,
    models::{ChangePasswordDto, Claims, LoginReqDto, TokenPair, TokenType},
    store::{CredentialStore, EmployeeStore, StoreError},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use anyhow::{Context, anyhow};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Issues an access/refresh pair and records the refresh `jti`.
async fn issue_pair(
    credentials: &dyn CredentialStore,
    config: &Config,
    user_id: u64,
    username: &str,
    role_id: u8,
    employee_id: Option<u64>,
) -> Result<TokenPair, HttpResponse> {
    let access_token = generate_access_token(
        user_id,
        username.to_string(),
        role_id,
        employee_id,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to sign access token");
        HttpResponse::InternalServerError().finish()
    })?;

    let (refresh_token, refresh_claims) = generate_refresh_token(
        user_id,
        username.to_string(),
        role_id,
        employee_id,
        &config.jwt_secret,
        config.refresh_token_ttl,
    )
    .map_err(|e| {
        error!(error = %e, "Failed to sign refresh token");
        HttpResponse::InternalServerError().finish()
    })?;

    debug!(user_id, jti = %refresh_claims.jti, "Storing refresh token");

    if let Err(e) = credentials
        .store_refresh(user_id, &refresh_claims.jti, refresh_claims.exp as i64)
        .await
    {
        error!(error = %e, "Failed to store refresh token");
        return Err(HttpResponse::InternalServerError().finish());
    }

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

/// Reads and verifies a bearer refresh token.
fn refresh_claims(req: &HttpRequest, config: &Config) -> Option<Claims> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))?;

    verify_token(token, &config.jwt_secret)
        .ok()
        .filter(|claims| claims.token_type == TokenType::Refresh)
}

/// Login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Employee not approved yet"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(credentials, employees, sessions, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    credentials: web::Data<dyn CredentialStore>,
    employees: web::Data<dyn EmployeeStore>,
    sessions: web::Data<SessionRegistry>,
    config: web::Data<Config>,
) -> impl Responder {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return HttpResponse::BadRequest().body("Username or password required");
    }

    let db_user = match credentials.find_user(user.username.trim()).await {
        Ok(Some(found)) => {
            debug!(user_id = found.id, "User found");
            found
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    let Some(role) = Role::from_id(db_user.role_id) else {
        error!(role_id = db_user.role_id, "User has an unknown role");
        return HttpResponse::InternalServerError().finish();
    };

    let employee = match db_user.employee_id {
        Some(employee_id) => match employees.get(employee_id).await {
            Ok(Some(employee)) => Some(employee),
            Ok(None) => {
                warn!(employee_id, "User linked to a missing employee");
                return HttpResponse::Unauthorized().body("Invalid credentials");
            }
            Err(e) => {
                error!(error = %e, "Database error while fetching employee");
                return HttpResponse::InternalServerError().finish();
            }
        },
        None => None,
    };

    if role == Role::Employee && !employee.as_ref().is_some_and(|e| e.is_approved) {
        info!("Login refused: employee not approved");
        return HttpResponse::Forbidden().json(json!({
            "error": "not_approved",
            "message": "Your account is awaiting admin approval"
        }));
    }

    let pair = match issue_pair(
        credentials.get_ref(),
        &config,
        db_user.id,
        &db_user.username,
        db_user.role_id,
        db_user.employee_id,
    )
    .await
    {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    if let Err(e) = credentials.touch_login(db_user.id).await {
        // not fatal for the login itself
        error!(error = %e, "Failed to update last_login_at");
    }

    if let Some(employee) = &employee {
        sessions.init(employee, role).await;
    }

    info!("Login successful");

    HttpResponse::Ok().json(pair)
}

/// Rotate refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token missing, invalid or already used")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    credentials: web::Data<dyn CredentialStore>,
    config: web::Data<Config>,
) -> impl Responder {
    let Some(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::Unauthorized().finish();
    };

    // a token can be redeemed once
    match credentials.revoke_refresh(&claims.jti).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(user_id = claims.user_id, jti = %claims.jti, "Refresh token reused or unknown");
            return HttpResponse::Unauthorized().finish();
        }
        Err(e) => {
            error!(error = %e, "Failed to revoke refresh token");
            return HttpResponse::InternalServerError().finish();
        }
    }

    match issue_pair(
        credentials.get_ref(),
        &config,
        claims.user_id,
        &claims.sub,
        claims.role,
        claims.employee_id,
    )
    .await
    {
        Ok(pair) => HttpResponse::Ok().json(pair),
        Err(resp) => resp,
    }
}

/// Logout
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Refresh token revoked and session closed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    credentials: web::Data<dyn CredentialStore>,
    sessions: web::Data<SessionRegistry>,
    config: web::Data<Config>,
) -> impl Responder {
    // anything but a valid refresh token is a silent no-op
    let Some(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    if let Err(e) = credentials.revoke_refresh(&claims.jti).await {
        error!(error = %e, "Failed to revoke refresh token");
    }

    if let Some(employee_id) = claims.employee_id {
        sessions.sign_out(employee_id).await;
    }

    info!(user_id = claims.user_id, "Logged out");

    HttpResponse::NoContent().finish()
}

/// Change password
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordDto,
    responses(
        (status = 204, description = "Password changed, other refresh tokens revoked"),
        (status = 400, description = "New password too short", body = Object, example = json!({
            "error": "password_too_short",
            "message": "New password must be at least 8 characters"
        })),
        (status = 401, description = "Not signed in, or current password is incorrect"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_change_password", skip_all, fields(user_id = auth.user_id))]
pub async fn change_password(
    auth: AuthUser,
    payload: web::Json<ChangePasswordDto>,
    credentials: web::Data<dyn CredentialStore>,
) -> impl Responder {
    if payload.new_password.chars().count() < MIN_PASSWORD_LEN {
        return HttpResponse::BadRequest().json(json!({
            "error": "password_too_short",
            "message": format!("New password must be at least {MIN_PASSWORD_LEN} characters")
        }));
    }

    let db_user = match credentials.find_user(&auth.username).await {
        Ok(Some(found)) if found.id == auth.user_id => found,
        Ok(_) => {
            warn!("Token refers to a missing user");
            return HttpResponse::Unauthorized().finish();
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = verify_password(&payload.current_password, &db_user.password) {
        info!(error = %e, "Password change refused: current password mismatch");
        return HttpResponse::Unauthorized().json(json!({
            "error": "invalid_credentials",
            "message": "Current password is incorrect"
        }));
    }

    let hashed = match hash_password(&payload.new_password) {
        Ok(hashed) => hashed,
        Err(e) => {
            error!(error = %e, "Failed to hash password");
            return HttpResponse::InternalServerError().finish();
        }
    };

    if let Err(e) = credentials.set_password(db_user.id, &hashed).await {
        error!(error = %e, "Failed to store new password");
        return HttpResponse::InternalServerError().finish();
    }

    // refresh tokens issued under the old password stop working
    match credentials.revoke_all_refresh(db_user.id).await {
        Ok(revoked) => info!(revoked, "Password changed"),
        Err(e) => error!(error = %e, "Password changed but refresh tokens were not revoked"),
    }

    HttpResponse::NoContent().finish()
}

/// Creates the bootstrap admin from config when it does not exist yet.
pub async fn ensure_admin(credentials: &dyn CredentialStore, config: &Config) -> anyhow::Result<()> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password) else {
        return Ok(());
    };

    if credentials.find_user(username).await?.is_some() {
        debug!(username = %username, "Bootstrap admin already present");
        return Ok(());
    }

    let hashed = hash_password(password).map_err(|e| anyhow!("failed to hash admin password: {e}"))?;
    match credentials
        .create_user(username, &hashed, Role::Admin.id(), None)
        .await
    {
        Ok(user_id) => info!(user_id, username = %username, "Bootstrap admin created"),
        // another instance won the race
        Err(StoreError::Conflict) => {}
        Err(e) => return Err(e).context("failed to create bootstrap admin"),
    }
    Ok(())
}
