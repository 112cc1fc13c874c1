use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::TrainConfig;
use crate::data::{DataLoader, ImageFolder, Pipeline};
use crate::error::{Error, Result};
use crate::loss::CrossEntropyLoss;
use crate::math::device::Device;
use crate::network::metadata::{InputType, ModelMetadata};
use crate::network::network::Network;
use crate::network::spec::NetworkSpec;
use crate::train::artifacts::{class_index_map, RunArtifacts};
use crate::train::epoch_stats::TrainingSummary;
use crate::train::trainer::{Trainer, TrainerOptions};

/// Trains the configured classifier without progress bars.
pub fn run(config: &TrainConfig, device: Device) -> Result<TrainingSummary> {
    run_with_progress(config, device, false)
}

/// Full run: checks the config against both image folders, then trains.
///
/// Nothing is written until the datasets have been opened and their classes
/// checked, so configuration and dataset errors leave the output paths
/// untouched.
pub fn run_with_progress(config: &TrainConfig, device: Device, show_progress: bool) -> Result<TrainingSummary> {
    config.validate()?;
    let model_cfg = &config.model;
    let train_cfg = &config.train;

    let train_set = ImageFolder::open(&model_cfg.train_data_path)?;
    let val_set = ImageFolder::open(&model_cfg.val_data_path)?;
    if train_set.classes().len() != model_cfg.classes {
        return Err(Error::Config(format!(
            "model.classes is {} but {} contains {} classes",
            model_cfg.classes,
            train_set.root().display(),
            train_set.classes().len()
        )));
    }
    if val_set.classes() != train_set.classes() {
        return Err(Error::Config(format!(
            "validation classes {:?} do not match training classes {:?}",
            val_set.classes(),
            train_set.classes()
        )));
    }

    let artifacts = RunArtifacts::from_config(config);
    artifacts.prepare()?;

    let workers = config.worker_count();
    info!("using {device} device.");
    info!("Using {workers} dataloader workers every process");
    info!(
        "using {} images for training, {} images for validation.",
        train_set.len(),
        val_set.len()
    );

    let class_index = class_index_map(train_set.classes());
    let labels = train_set.classes().to_vec();

    let mut train_loader = DataLoader::new(train_set, Pipeline::train(model_cfg.image_size), train_cfg.batch_size)
        .with_shuffle(true)
        .with_workers(workers)
        .with_seed(train_cfg.seed);
    let mut val_loader = DataLoader::new(val_set, Pipeline::eval(model_cfg.image_size), train_cfg.batch_size)
        .with_workers(workers)
        .with_seed(train_cfg.seed);

    let spec = NetworkSpec::classifier(
        model_cfg.model_name.clone(),
        config.input_size(),
        &model_cfg.hidden_layers,
        model_cfg.activation,
        model_cfg.classes,
    )
    .with_metadata(ModelMetadata {
        description: Some(format!("{}Net image classifier", model_cfg.model_name)),
        input_type: Some(InputType::ImageRgb {
            width: model_cfg.image_size,
            height: model_cfg.image_size,
        }),
        output_labels: Some(labels),
    });
    let mut network = Network::from_spec(&spec, &mut StdRng::seed_from_u64(train_cfg.seed))?;
    network.to_device(device);
    info!(
        parameters = network.parameter_count(),
        optimizer = ?train_cfg.optimizer,
        learning_rate = train_cfg.learning_rate,
        "built {}Net",
        model_cfg.model_name
    );

    let optimizer = train_cfg.optimizer.build(train_cfg.learning_rate);
    let options = TrainerOptions {
        epochs: train_cfg.epochs,
        show_progress,
        progress_tx: None,
    };
    let mut trainer = Trainer::new(network, optimizer, CrossEntropyLoss, options);
    trainer.fit(&mut train_loader, &mut val_loader, &class_index, &artifacts)
}
