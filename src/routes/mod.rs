pub mod auth;
pub mod dashboard;
pub mod posts;
pub mod profile;

pub use auth::auth_routes;
pub use dashboard::dashboard_routes;
pub use posts::posts_routes;
pub use profile::profile_routes;
