pub mod risk_calculator;
pub mod sheets;
pub mod sync_log_service;
pub mod sync_service;
pub mod user_service;

pub use risk_calculator::{RiskModel, WeightedRiskModel};
pub use sync_service::{SyncError, SyncService};
