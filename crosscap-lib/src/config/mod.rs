//! Pipeline configuration.
//!
//! Every knob has a default, so an empty TOML file (or no file at all)
//! yields a working configuration. Validation runs before any work is
//! performed.

mod loader;
mod types;
mod validator;

pub use loader::load_from_path;
pub use types::{MatchConfig, SamplingConfig};
pub use validator::validate;
