pub mod artifacts;
pub mod epoch_stats;
pub mod model;
pub mod run;
pub mod trainer;

pub use artifacts::{class_index_map, write_class_indices, ClassIndexMap, RunArtifacts};
pub use epoch_stats::{EpochStats, TrainingSummary};
pub use model::{Mode, Model};
pub use run::{run, run_with_progress};
pub use trainer::{Phase, Trainer, TrainerOptions};
