pub mod account;
pub mod middleware;
pub mod password;
pub mod session;
