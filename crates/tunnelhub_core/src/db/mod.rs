pub mod models;

pub use models::{
    server::RelayServer,
    session::{LiveSessionInfo, Session, SessionStatus},
    usage::{DailyUsage, UsageSummary},
    user::{User, UserRole},
    Protocol,
};
pub use tunnelhub_common::db::{DbPool, Id, NoId};
