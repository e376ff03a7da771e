pub mod account;
pub mod admin_clients;
pub mod admin_rbac;
pub mod admin_users;
pub mod auth;
pub mod authorize;
pub mod discovery;
pub mod token;
pub mod userinfo;
