pub mod alerts;
pub mod collateral;
pub mod commands;
pub mod handler;
pub mod monitor;
pub mod orders;
pub mod session;
pub mod submission;

pub use alerts::AlertRegistry;
pub use collateral::{signed_collateral_delta, CollateralManager};
pub use commands::{ChatCommand, CommandError};
pub use handler::CommandHandler;
pub use monitor::PriceMonitor;
pub use orders::{build_order, OrderDesk, OrderError};
pub use session::{Session, SessionError, SessionStore};
pub use submission::{token_for_update, SubmissionGuard};
