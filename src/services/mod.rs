pub mod merger;
pub mod paths;
pub mod recommendations;
pub mod signals;
pub mod stats;
pub mod validator;

pub use merger::{composite, merge, merge_weighted};
pub use paths::PathMiner;
pub use recommendations::{EngineSettings, Recommender, SignalWeights};
pub use signals::{CandidateTally, SignalExtractor};
pub use stats::{render_csv, StatsAnalyzer};
pub use validator::ItemValidator;
