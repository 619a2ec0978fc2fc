//! Administrative hierarchy and its seed loader.

pub mod model;
pub mod seed;

pub use model::{Administrative, AdministrativeLevel, NewAdministrative};
pub use seed::{SeedNode, load_seed_file, parse_seed, seed_administrative};
