//! Staff account administration and the signed-in user's own profile.

use serde_json::{json, Value};

use super::{ApiClient, ApiError};
use crate::models::user::{AccountStatus, CreateUser, UpdateUser, User};
use crate::models::ListResponse;

#[derive(Clone)]
pub struct UserService {
    api: ApiClient,
}

impl UserService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch all staff accounts (admin only)
    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let response: ListResponse<User> = self.api.get("/users").await?;
        Ok(response.into_vec())
    }

    pub async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        self.api.get(&format!("/users/{}", path_segment(id)?)).await
    }

    /// Create a staff account (admin only)
    pub async fn create_user(&self, user: &CreateUser) -> Result<User, ApiError> {
        require(&user.name, "Name is required")?;
        require(&user.email, "Email is required")?;
        require(&user.password, "Password is required")?;
        self.api.post("/users", user).await
    }

    pub async fn update_user(&self, id: &str, update: &UpdateUser) -> Result<User, ApiError> {
        self.api
            .put(&format!("/users/{}", path_segment(id)?), update)
            .await
    }

    pub async fn update_user_status(
        &self,
        id: &str,
        status: AccountStatus,
    ) -> Result<User, ApiError> {
        self.api
            .patch(
                &format!("/users/{}/status", path_segment(id)?),
                &json!({ "status": status }),
            )
            .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), ApiError> {
        let _: Value = self
            .api
            .delete(&format!("/users/{}", path_segment(id)?))
            .await?;
        Ok(())
    }

    /// Update the signed-in user's name and email
    pub async fn update_profile(&self, name: &str, email: &str) -> Result<(), ApiError> {
        require(name, "Name is required")?;
        require(email, "Email is required")?;
        let _: Value = self
            .api
            .put("/users/profile", &json!({ "name": name.trim(), "email": email.trim() }))
            .await?;
        Ok(())
    }

    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        if current_password.is_empty() {
            return Err(ApiError::Validation("Current password is required".to_string()));
        }
        if new_password.is_empty() {
            return Err(ApiError::Validation("New password is required".to_string()));
        }
        let body = json!({
            "currentPassword": current_password,
            "newPassword": new_password,
        });
        let _: Value = self.api.put("/users/change-password", &body).await?;
        Ok(())
    }
}

fn require(value: &str, message: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        Err(ApiError::Validation(message.to_string()))
    } else {
        Ok(())
    }
}

/// Identifiers go into the path verbatim, so they must be one plain segment.
pub(crate) fn path_segment(id: &str) -> Result<&str, ApiError> {
    let id = id.trim();
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(ApiError::Validation(format!("Invalid identifier: {:?}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_segment() {
        assert_eq!(path_segment(" 65a1f0 ").unwrap(), "65a1f0");
        assert_eq!(path_segment("ABC1234567").unwrap(), "ABC1234567");
        assert!(path_segment("").is_err());
        assert!(path_segment("../admin").is_err());
        assert!(path_segment("a/b").is_err());
        assert!(path_segment("a?b=c").is_err());
    }

    #[test]
    fn test_require() {
        assert!(require("x", "missing").is_ok());
        assert!(matches!(require("  ", "missing"), Err(ApiError::Validation(m)) if m == "missing"));
    }
}
