pub mod catalog;
pub mod history;
pub mod hybrid;
pub mod interactions;
pub mod popularity;
pub mod recommendations;
pub mod strategies;

pub use catalog::CatalogService;
pub use history::{InteractionHistoryReader, UserHistory};
pub use interactions::InteractionService;
pub use recommendations::{RecommendationOutcome, RecommendationService, RecommenderSettings};
