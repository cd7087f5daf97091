pub mod config;
pub mod config_loader;
pub mod scale;
pub mod traits;
pub mod types;

pub use config::{AppConfig, MonitorConfig, OracleConfig, TelegramConfig, VenueConfig};
pub use config_loader::ConfigLoader;
pub use scale::{ScaleError, PRICE_DECIMALS, SIZE_DECIMALS};
pub use traits::{Notifier, PriceOracle};
pub use types::{ChatUserId, Direction, OrderIntent};
