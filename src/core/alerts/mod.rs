// Alert records and the logic that produces and reduces them.
//
// Architecture:
// - model.rs: Alert record and status as exchanged with providers
// - aggregator.rs: Reduces a snapshot to the single governing condition
// - triggers.rs: Threshold checks for one zone
// - engine.rs: Raises, deduplicates and resolves alerts across zones

pub mod aggregator;
pub mod engine;
pub mod model;
pub mod triggers;
