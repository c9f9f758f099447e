/// gRPC server implementation for idm-service
///
/// Implements all RPCs from idm_service.proto:
/// - Authentication: Login, Logout, ChangePassword
/// - Token validation: ValidateToken
/// - Account management (admin only): Register, DeleteUser
use crate::error::IdentityError;
use crate::services::{IdentityService, TokenValidation};
use tonic::{Request, Response, Status};
use tracing::{error, warn};

// Import generated protobuf types
pub mod idm {
    tonic::include_proto!("idm");
}

use idm::auth_service_server::AuthService;
use idm::*;

/// IDM service gRPC server
#[derive(Clone)]
pub struct IdentityServiceServer {
    service: IdentityService,
}

impl IdentityServiceServer {
    pub fn new(service: IdentityService) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl AuthService for IdentityServiceServer {
    /// Exchange identity and password for a bearer token
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> std::result::Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        let issued = self
            .service
            .login(&req.username, &req.password)
            .await
            .map_err(to_status)?;

        Ok(Response::new(LoginResponse {
            token: issued.token,
        }))
    }

    /// Report whether a token is currently usable
    ///
    /// Invalid tokens are a successful response with `valid = false`.
    async fn validate_token(
        &self,
        request: Request<ValidateTokenRequest>,
    ) -> std::result::Result<Response<ValidateTokenResponse>, Status> {
        let req = request.into_inner();

        let response = match self
            .service
            .validate_token(&req.token)
            .await
            .map_err(to_status)?
        {
            TokenValidation::Valid(principal) => ValidateTokenResponse {
                valid: true,
                username: principal.subject,
                role: principal.role.to_string(),
            },
            TokenValidation::Invalid => ValidateTokenResponse {
                valid: false,
                username: String::new(),
                role: String::new(),
            },
        };

        Ok(Response::new(response))
    }

    async fn logout(
        &self,
        request: Request<LogoutRequest>,
    ) -> std::result::Result<Response<LogoutResponse>, Status> {
        let req = request.into_inner();

        self.service.logout(&req.token).await.map_err(to_status)?;

        Ok(Response::new(LogoutResponse {
            success: true,
            message: "Token successfully revoked".to_string(),
        }))
    }

    /// Create an account; the request token must belong to an admin
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> std::result::Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();

        self.service
            .register(&req.token, &req.username, &req.password, &req.role)
            .await
            .map_err(to_status)?;

        Ok(Response::new(RegisterResponse { success: true }))
    }

    async fn change_password(
        &self,
        request: Request<ChangePasswordRequest>,
    ) -> std::result::Result<Response<ChangePasswordResponse>, Status> {
        let req = request.into_inner();

        self.service
            .change_password(&req.username, &req.current_password, &req.new_password)
            .await
            .map_err(to_status)?;

        Ok(Response::new(ChangePasswordResponse { success: true }))
    }

    /// Remove an account; the request token must belong to an admin
    async fn delete_user(
        &self,
        request: Request<DeleteUserRequest>,
    ) -> std::result::Result<Response<DeleteUserResponse>, Status> {
        let req = request.into_inner();

        self.service
            .delete_user(&req.token, &req.username)
            .await
            .map_err(to_status)?;

        Ok(Response::new(DeleteUserResponse { success: true }))
    }
}

fn to_status(err: IdentityError) -> Status {
    if err.is_internal() {
        error!("Identity error: {:?}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    err.to_status()
}
