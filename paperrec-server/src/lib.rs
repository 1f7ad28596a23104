//! Online half of paperrec: user profiles, top-k resolution and the HTTP API.

pub mod http;
pub mod profile;
pub mod recommend;
pub mod resolve;

pub use profile::{build_profile, decay_weight, UserProfile};
pub use recommend::{recommend_for_user, ServingState};
pub use resolve::{resolve, Recommendation};
