//! Hyperparameter optimization module
//!
//! Search spaces and a randomized search that plugs into feature
//! elimination as a [`crate::training::HyperparameterSearch`].

mod search_space;
mod randomized_search;

pub use search_space::{SearchSpace, Parameter, ParameterType, TrialParams, ParameterValue};
pub use randomized_search::{
    CandidateResult, RandomizedSearchConfig, RandomizedSearchCv, SearchResults,
};
