pub mod context;
pub mod criteria;
pub mod models;
pub mod normalize;

pub use context::build_contextual_query;
pub use criteria::{MatchCriteria, PriceRange, MATCH_LIMIT, SERVICE_UNAVAILABLE};
pub use models::*;
pub use normalize::{extract_flow_text, normalize_flow_response, normalize_text, strip_code_fences};
