pub mod accounts_api;
pub mod contract;
pub mod oracle;
pub mod venue;
pub mod wallet;

pub use accounts_api::{AccountsApi, LookupError};
pub use oracle::HermesOracle;
pub use venue::{OrderCommitment, OrderPayload, PolynomialVenue, PositionInfo};
pub use wallet::{derive_wallet, derived_address};
