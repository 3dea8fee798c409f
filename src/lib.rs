pub mod app;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod db {
    pub mod comments;
    pub mod documents;
    pub mod ids;
    pub mod keys;
    pub mod models;
    pub mod quota;
}
pub mod api {
    pub mod comments;
    pub mod documents;
    pub mod errors;
    pub mod stats;
    pub mod validation;
}
