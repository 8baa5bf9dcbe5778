pub mod backend;
pub mod catboost;
pub mod container;
pub mod history;
pub mod lightgbm;
pub mod metrics;
pub mod process;
pub mod xgboost;

pub use backend::*;
pub use catboost::CatBoostBackend;
pub use history::{EvalHistory, RoundMetrics};
pub use lightgbm::LightGbmBackend;
pub use metrics::roc_auc;
pub use process::{ToolCommand, ToolOutput};
pub use xgboost::XgBoostBackend;
