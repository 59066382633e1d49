pub mod app_config;
pub mod captcha;
pub mod constants;
pub mod create_user;
pub mod db;
pub mod email;
pub mod filesystem;
pub mod ip;
pub mod middleware;
pub mod orm;
pub mod rate_limit;
pub mod session;
pub mod signer;
pub mod storage;
pub mod template;
pub mod user;
pub mod web;
