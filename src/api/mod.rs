mod handlers;
mod routes;
mod state;

pub use handlers::{ItemStatsRequest, PathsQuery, RecommendationRequest, ReportQuery};
pub use routes::create_router;
pub use state::AppState;
