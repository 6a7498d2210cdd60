use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAdminRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "invalid email format"))]
    pub email: String,

    pub organization_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BootstrapRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,

    #[validate(email(message = "invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,

    #[validate(email(message = "invalid email format"))]
    pub email: String,

    #[validate(length(max = 2000, message = "description is too long"))]
    pub description: Option<String>,

    #[validate(url(message = "website must be a valid URL"))]
    pub website: Option<String>,
}

/// `?id=` on the organization routes. Kept as a string so that a missing
/// or malformed id gets a specific message.
#[derive(Debug, Deserialize)]
pub struct OrganizationQuery {
    pub id: Option<String>,
}

impl OrganizationQuery {
    pub fn organization_id(&self) -> Result<Uuid, AppError> {
        let raw = self
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::bad_request("id is required"))?;

        Uuid::parse_str(raw).map_err(|_| AppError::bad_request("id must be a valid UUID"))
    }
}
