pub mod adapters;
pub mod agent;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod news;
pub mod persistence;
pub mod scheduler;
pub mod strategy;
pub mod telemetry;

pub use adapters::PaperBroker;
pub use agent::{Decider, DecisionContext, RuleBasedDecider};
pub use config::AppConfig;
pub use error::{OrderError, Result, SentinelError};
pub use exchange::Broker;
pub use news::{CachedNewsService, NewsService, Sentiment, SentimentCache};
pub use persistence::{AuditSink, JsonlAuditLog, NullAuditSink};
pub use scheduler::{Scheduler, SymbolStats};
pub use strategy::{
    Engine, OrderExecutor, Outcome, PositionManager, RiskManager, Stage, StepEvent, StepResult,
    StopManager,
};
pub use telemetry::{init_logging, CycleObserver, LoggingGuard, TracingObserver};
