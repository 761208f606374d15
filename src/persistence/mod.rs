pub mod audit;

pub use audit::{
    AuditEntry, AuditSink, DecisionRecord, JsonlAuditLog, NullAuditSink, Partition, TradeRecord,
};
