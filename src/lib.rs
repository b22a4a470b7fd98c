//! Adapter that answers a dashboard's SimpleJson datasource protocol on behalf of any
//! backend implementing [`DataSource`].

pub mod api;
pub mod config;
pub mod datasource;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod sample;
pub mod shaper;
pub mod validation;

pub use config::Config;
pub use datasource::DataSource;
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{FieldError, Result, SimpleJsonError};
