pub mod cli;
pub mod config;
pub mod corpus;
pub mod descriptor;
pub mod engine;
pub mod extract;
pub mod matcher;
pub mod metadata;
mod metrics;
pub mod refine;
pub mod search;
pub mod server;
pub mod service;
pub mod store;
pub mod thumbnail;
pub mod utils;

pub use config::Opts;
pub use corpus::Corpus;
pub use descriptor::DescriptorSet;
pub use engine::{MatchEngine, MatchOutcome, MatchParams};
pub use search::PotentialMatch;
pub use service::{MatchResult, MatchService};
