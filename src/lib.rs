#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod config;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod state;
pub mod telemetry;
pub(crate) mod transport;

pub use config::{Config, OverflowPolicy, Tuning};
pub use error::{Error, Kind};
pub use handler::SessionHandler;
pub use session::Session;
pub use state::{Phase, Status};

pub type Result<T> = std::result::Result<T, Error>;
