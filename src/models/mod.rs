pub mod interaction;
pub mod movie;
pub mod recommendation;

pub use interaction::{
    Favorite, MovieActivity, MovieRatingStats, NewRating, NewWatch, Rating, RatingScore,
    SimilarUser, UserStats, WatchHistory, MAX_RATING_SCORE, MIN_RATING_SCORE,
};
pub use movie::{Genre, Movie, MovieId, MovieOrder, MovieSummary, Tag, TrendingPeriod, UserId};
pub use recommendation::{
    Algorithm, Recommendation, RecommendationParams, RecommendationResult, ScoredMovie, Strategy,
    MAX_RECOMMENDATIONS,
};
