//! Batched, optionally parallel loading of an `ImageFolder`.
//!
//! Each epoch is planned up front as a list of index batches. With workers
//! enabled, the plan is pushed onto a shared job queue; workers decode and
//! transform whole batches and send them back over a bounded channel, and
//! the consumer re-orders them so batches always arrive in plan order.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::data::image_folder::ImageFolder;
use crate::data::transforms::Pipeline;
use crate::data::{Batch, BatchSource, EpochBatches};
use crate::error::{Error, Result};
use crate::math::matrix::Matrix;

const MAX_WORKERS: usize = 8;

/// Worker count used when `train.num_workers` is not set:
/// `min(available_parallelism, batch_size, 8)`.
pub fn default_worker_count(batch_size: usize) -> usize {
    let cpus = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    cpus.min(batch_size).min(MAX_WORKERS)
}

/// Derives an independent RNG seed for one (epoch, batch) pair so that
/// augmentation does not depend on which worker handles the batch.
fn batch_seed(seed: u64, epoch: u64, batch: u64) -> u64 {
    let mut z = seed
        ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ batch.wrapping_add(1).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    // splitmix64 finalizer
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

pub struct DataLoader {
    dataset: Arc<ImageFolder>,
    pipeline: Arc<Pipeline>,
    batch_size: usize,
    shuffle: bool,
    num_workers: usize,
    seed: u64,
    epoch: u64,
}

impl DataLoader {
    /// Sequential, unshuffled loader; configure with the builder methods.
    pub fn new(dataset: ImageFolder, pipeline: Pipeline, batch_size: usize) -> DataLoader {
        DataLoader {
            dataset: Arc::new(dataset),
            pipeline: Arc::new(pipeline),
            batch_size: batch_size.max(1),
            shuffle: false,
            num_workers: 0,
            seed: 0,
            epoch: 0,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn dataset(&self) -> &ImageFolder {
        &self.dataset
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn plan(&self, epoch: u64) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            order.shuffle(&mut StdRng::seed_from_u64(batch_seed(self.seed, epoch, u64::MAX)));
        }
        order.chunks(self.batch_size).map(<[usize]>::to_vec).collect()
    }
}

impl BatchSource for DataLoader {
    fn len(&self) -> usize {
        self.dataset.len()
    }

    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn next_epoch(&mut self) -> Result<EpochBatches<'_>> {
        self.epoch += 1;
        let epoch = self.epoch;
        let plan = self.plan(epoch);
        let workers = self.num_workers.min(plan.len());

        if workers == 0 {
            return Ok(Box::new(InlineBatches {
                dataset: Arc::clone(&self.dataset),
                pipeline: Arc::clone(&self.pipeline),
                plan: plan.into_iter().enumerate(),
                seed: self.seed,
                epoch,
            }));
        }

        let batches = WorkerBatches::spawn(
            Arc::clone(&self.dataset),
            Arc::clone(&self.pipeline),
            plan,
            workers,
            self.seed,
            epoch,
        )?;
        Ok(Box::new(batches))
    }
}

fn load_batch(
    dataset: &ImageFolder,
    pipeline: &Pipeline,
    indices: &[usize],
    seed: u64,
) -> Result<Batch> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(indices.len());
    let mut labels = Vec::with_capacity(indices.len());
    for &index in indices {
        let (image, label) = dataset.load(index)?;
        rows.push(pipeline.apply(image, &mut rng));
        labels.push(label);
    }
    if let Some(first) = rows.first() {
        let width = first.len();
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(Error::Shape(format!(
                "sample {} produced {} values, expected {}",
                dataset.samples()[indices[i]].path.display(),
                row.len(),
                width
            )));
        }
    }
    Ok(Batch { inputs: Matrix::from_data(rows), labels })
}

struct InlineBatches {
    dataset: Arc<ImageFolder>,
    pipeline: Arc<Pipeline>,
    plan: std::iter::Enumerate<std::vec::IntoIter<Vec<usize>>>,
    seed: u64,
    epoch: u64,
}

impl Iterator for InlineBatches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let (i, indices) = self.plan.next()?;
        Some(load_batch(
            &self.dataset,
            &self.pipeline,
            &indices,
            batch_seed(self.seed, self.epoch, i as u64),
        ))
    }
}

type Job = (usize, Vec<usize>);
type Loaded = (usize, Result<Batch>);

struct WorkerBatches {
    total: usize,
    next: usize,
    pending: HashMap<usize, Result<Batch>>,
    results: Option<Receiver<Loaded>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerBatches {
    fn spawn(
        dataset: Arc<ImageFolder>,
        pipeline: Arc<Pipeline>,
        plan: Vec<Vec<usize>>,
        workers: usize,
        seed: u64,
        epoch: u64,
    ) -> Result<WorkerBatches> {
        let total = plan.len();
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        for job in plan.into_iter().enumerate() {
            // The receiver is alive in this scope, so sending cannot fail.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let jobs = Arc::new(Mutex::new(job_rx));
        let (result_tx, result_rx) = mpsc::sync_channel::<Loaded>(workers * 2);

        let mut batches = WorkerBatches {
            total,
            next: 0,
            pending: HashMap::new(),
            results: Some(result_rx),
            workers: Vec::with_capacity(workers),
        };

        for id in 0..workers {
            let jobs = Arc::clone(&jobs);
            let results = result_tx.clone();
            let dataset = Arc::clone(&dataset);
            let pipeline = Arc::clone(&pipeline);
            let handle = thread::Builder::new()
                .name(format!("loader-{id}"))
                .spawn(move || worker_loop(&jobs, &results, &dataset, &pipeline, seed, epoch))
                .map_err(|e| Error::Worker(format!("failed to spawn loader thread: {e}")))?;
            batches.workers.push(handle);
        }
        debug!(workers, batches = total, epoch, "started loader workers");
        Ok(batches)
    }
}

fn worker_loop(
    jobs: &Mutex<Receiver<Job>>,
    results: &SyncSender<Loaded>,
    dataset: &ImageFolder,
    pipeline: &Pipeline,
    seed: u64,
    epoch: u64,
) {
    loop {
        let job = match jobs.lock() {
            Ok(queue) => queue.recv(),
            Err(_) => break,
        };
        let Ok((i, indices)) = job else { break };
        let batch = load_batch(dataset, pipeline, &indices, batch_seed(seed, epoch, i as u64));
        if results.send((i, batch)).is_err() {
            // Consumer dropped the epoch.
            break;
        }
    }
}

impl Iterator for WorkerBatches {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.total {
            return None;
        }
        loop {
            if let Some(batch) = self.pending.remove(&self.next) {
                self.next += 1;
                return Some(batch);
            }
            match self.results.as_ref()?.recv() {
                Ok((i, batch)) => {
                    self.pending.insert(i, batch);
                }
                Err(_) => {
                    self.next = self.total;
                    return Some(Err(Error::Worker(
                        "loader workers exited before delivering every batch".into(),
                    )));
                }
            }
        }
    }
}

impl Drop for WorkerBatches {
    fn drop(&mut self) {
        // Closing the result channel makes blocked workers fail their send.
        self.results.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("a loader worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::path::Path;
    use tempfile::TempDir;

    fn make_folder(root: &Path, per_class: usize) -> ImageFolder {
        for (class, color) in [("a", [255, 0, 0]), ("b", [0, 255, 0]), ("c", [0, 0, 255])] {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                RgbImage::from_pixel(6, 6, Rgb(color)).save(dir.join(format!("{i:02}.png"))).unwrap();
            }
        }
        ImageFolder::open(root).unwrap()
    }

    fn collect(loader: &mut DataLoader) -> Vec<Batch> {
        loader.next_epoch().unwrap().collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn sequential_batches_keep_dataset_order() {
        let dir = TempDir::new().unwrap();
        let mut loader = DataLoader::new(make_folder(dir.path(), 4), Pipeline::eval(3), 5);
        assert_eq!(loader.num_batches(), 3);

        let batches = collect(&mut loader);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        let labels: Vec<usize> = batches.iter().flat_map(|b| b.labels.clone()).collect();
        assert_eq!(labels, vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
        assert_eq!(batches[0].inputs.cols, 27);
    }

    #[test]
    fn workers_deliver_batches_in_plan_order() {
        let dir = TempDir::new().unwrap();
        let folder = make_folder(dir.path(), 7);
        let mut inline = DataLoader::new(folder.clone(), Pipeline::train(4), 2).with_seed(3);
        let mut pooled = DataLoader::new(folder, Pipeline::train(4), 2).with_seed(3).with_workers(4);

        let a = collect(&mut inline);
        let b = collect(&mut pooled);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.labels, y.labels);
            assert_eq!(x.inputs, y.inputs);
        }
    }

    #[test]
    fn shuffled_epochs_cover_every_sample_once() {
        let dir = TempDir::new().unwrap();
        let mut loader = DataLoader::new(make_folder(dir.path(), 6), Pipeline::eval(2), 4)
            .with_shuffle(true)
            .with_seed(11)
            .with_workers(2);

        let first = loader.plan(1);
        let second = loader.plan(2);
        assert_ne!(first, second);
        for plan in [first, second] {
            let mut seen: Vec<usize> = plan.concat();
            seen.sort_unstable();
            assert_eq!(seen, (0..18).collect::<Vec<_>>());
        }

        let mut labels: Vec<usize> = collect(&mut loader).iter().flat_map(|b| b.labels.clone()).collect();
        labels.sort_unstable();
        assert_eq!(labels, [vec![0; 6], vec![1; 6], vec![2; 6]].concat());
    }

    #[test]
    fn corrupt_image_aborts_the_epoch() {
        let dir = TempDir::new().unwrap();
        make_folder(dir.path(), 2);
        std::fs::write(dir.path().join("b/zz.png"), b"not an image").unwrap();
        let folder = ImageFolder::open(dir.path()).unwrap();
        let mut loader = DataLoader::new(folder, Pipeline::eval(2), 2).with_workers(2);

        let results: Vec<Result<Batch>> = loader.next_epoch().unwrap().collect();
        assert!(results.iter().any(|r| matches!(r, Err(Error::Image { .. }))));
    }

    #[test]
    fn dropping_an_epoch_early_stops_workers() {
        let dir = TempDir::new().unwrap();
        let mut loader = DataLoader::new(make_folder(dir.path(), 10), Pipeline::eval(2), 1).with_workers(3);
        {
            let mut epoch = loader.next_epoch().unwrap();
            assert!(epoch.next().unwrap().is_ok());
        }
        assert_eq!(collect(&mut loader).len(), 30);
    }

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(default_worker_count(1), 1);
        assert!(default_worker_count(3) <= 3);
        assert!(default_worker_count(512) <= MAX_WORKERS);
        assert!(default_worker_count(512) >= 1);
    }
}
