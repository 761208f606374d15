//! Strategy module
//!
//! The per-cycle core and its stateful parts:
//! - `engine` - one decision/execution cycle per symbol
//! - `position_manager` - open positions, weighted-average cost, monotonic stops
//! - `risk` - per-trade exposure gate for entries
//! - `stops` - stop-loss, trailing and time-based stop math
//! - `executor` - broker submission plus audit records
//! - `trail` - structured per-cycle event trail

pub mod engine;
pub mod executor;
pub mod position_manager;
pub mod risk;
pub mod stops;
pub mod trail;

pub use engine::{Engine, StepResult};
pub use executor::OrderExecutor;
pub use position_manager::{PositionManager, SellOutcome};
pub use risk::{RiskCheck, RiskManager};
pub use stops::StopManager;
pub use trail::{Outcome, Stage, StepEvent, Trail};
