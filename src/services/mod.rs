pub mod notifier;
pub mod portfolio_sync;

pub use notifier::Notifier;
pub use portfolio_sync::PortfolioSync;
