pub mod overrides;
pub mod schema;

pub use overrides::Override;
pub use schema::{ModelSection, TrainConfig, TrainSection};
