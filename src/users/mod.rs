pub mod dto;
pub mod handlers;
pub mod memory;
pub mod repo;
pub mod repo_types;
pub mod service;
pub mod vcode;

pub use memory::InMemoryUserRepo;
pub use repo::{PgUserRepo, UniqueViolation, UserRepo};
pub use service::{AccountService, UserService};
pub use vcode::VerificationCodes;
