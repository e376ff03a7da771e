pub mod jwt;
pub mod password;
pub mod pkce;
pub mod token;
