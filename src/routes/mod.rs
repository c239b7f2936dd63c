pub mod auth;
pub mod codes;
pub mod content;
pub mod events;
pub mod messages;
pub mod reviews;
