pub mod indicators;

pub use indicators::compute as compute_indicators;
