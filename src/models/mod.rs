//! Data models for the library server

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::Book;
pub use loan::{Loan, LoanDetails, LoanStatus};
pub use user::{Role, User, UserClaims};
