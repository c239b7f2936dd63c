pub mod accounts;
pub mod google;
pub mod handlers;
pub mod phone;
pub mod session;
pub mod tokens;
