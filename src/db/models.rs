use serde::{Deserialize, Serialize};

/// Server-side account row. Content-facing identity lives in the tree
/// at `users/{uid}`; this table only holds credentials and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub google_sub: Option<String>,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub account_id: String,
    pub token: String,
    pub expires_at: String,
    pub created_at: String,
}

/// Tree record at `users/{uid}`. Field names match the persisted paths
/// of the original site, so existing exports stay readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: i64,
    #[serde(rename = "profilePic", skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
    #[serde(rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Tree record at `codes/{id}` (likes and comments live under child paths).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePost {
    pub title: String,
    pub language: String,
    pub description: String,
    pub code: String,
    pub timestamp: i64,
    pub author: String,
}

/// Tree record at `codes/{id}/comments/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeComment {
    pub text: String,
    pub uid: String,
    pub username: String,
    pub timestamp: i64,
}

/// Tree record at `messages/{id}`. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactMessage {
    pub name: String,
    pub username: String,
    pub subject: String,
    pub message: String,
    pub timestamp: i64,
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// Tree record at `reviews/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub name: String,
    pub username: String,
    pub text: String,
    pub rating: i64,
    pub timestamp: i64,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "editedAt", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<i64>,
}
