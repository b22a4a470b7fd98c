pub mod routes;

pub use routes::{app, simplejson_router};
