//! sx-agent: The agent side of sentinel
//!
//! An agent prepares a dedicated account, asks a manager to trust it, then
//! waits on a short-lived listener for the manager's public key. Once the key
//! is installed the manager can open SSH sessions as that account.

pub mod account;
pub mod enroll;
pub mod finalize;
pub mod registration;

pub use account::SystemAccount;
pub use enroll::{enroll, EnrollOutcome};
pub use finalize::{FinalizeListener, FinalizeOutcome};
pub use registration::send_registration;
