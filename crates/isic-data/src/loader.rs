// Loader: prefetching batch iterator over a Dataset
//
// Each call to `iter()` starts one epoch:
//
//   visit order (sequential | shuffle buffer)
//     → producer thread: chunk into batches
//         → rayon pool (num_workers) maps Dataset::get, order preserved
//         → collate
//     → bounded channel (capacity = prefetch)
//   → BatchIter on the consumer side
//
// The first failing batch is delivered as an error and ends the epoch.
// Dropping the iterator early closes the channel; the producer notices on its
// next send and exits, and is joined in Drop.
//
// Usage:
//
//   let mut loader = Loader::new(Arc::new(dataset), LoaderConfig::default().batch_size(16))?;
//   for epoch in 0..num_epochs {
//       for batch in loader.iter() {
//           let batch = batch?;
//           // feed batch.images / batch.labels to the model ...
//       }
//   }

use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{thread_rng, Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::dataset::{Dataset, Sample};
use crate::error::{Error, Result};
use crate::manifest::Label;

// Configuration

/// How a loader walks its dataset each epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// `0..len`, in manifest (post-split) order.
    Sequential,
    /// Streaming shuffle through a buffer of the given size.
    ShuffleBuffer(usize),
}

/// Configuration for a [`Loader`].
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of samples per batch.
    pub batch_size: usize,
    /// Worker threads mapping records through the image pipeline.
    pub num_workers: usize,
    /// Batches prepared ahead of the consumer.
    pub prefetch: usize,
    pub order: Order,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
    /// Optional seed for reproducible shuffle-buffer order.
    pub seed: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            num_workers: 2,
            prefetch: 1,
            order: Order::Sequential,
            drop_last: false,
            seed: None,
        }
    }
}

impl LoaderConfig {
    pub fn batch_size(mut self, bs: usize) -> Self {
        self.batch_size = bs;
        self
    }
    pub fn num_workers(mut self, n: usize) -> Self {
        self.num_workers = n;
        self
    }
    pub fn prefetch(mut self, p: usize) -> Self {
        self.prefetch = p;
        self
    }
    pub fn order(mut self, o: Order) -> Self {
        self.order = o;
        self
    }
    pub fn drop_last(mut self, d: bool) -> Self {
        self.drop_last = d;
        self
    }
    pub fn seed(mut self, s: u64) -> Self {
        self.seed = Some(s);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        if self.num_workers == 0 {
            return Err(Error::config("num_workers must be > 0"));
        }
        if self.prefetch == 0 {
            return Err(Error::config("prefetch must be > 0"));
        }
        if self.order == Order::ShuffleBuffer(0) {
            return Err(Error::config("shuffle buffer size must be > 0"));
        }
        Ok(())
    }
}

// Batch

/// A collated batch of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Image identifiers, one per row.
    pub ids: Vec<String>,
    /// Pixels of every image, `[N, H, W, C]` row-major.
    pub images: Vec<f32>,
    /// `[N, H, W, C]`.
    pub shape: [usize; 4],
    /// `Some` for train/validation, `None` for test.
    pub labels: Option<Vec<Label>>,
}

impl Batch {
    /// Number of samples in this batch.
    pub fn len(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pixels of the `i`-th image.
    ///
    /// # Panics
    /// Panics if `i >= self.len()`.
    pub fn image(&self, i: usize) -> &[f32] {
        let per: usize = self.shape[1..].iter().product();
        &self.images[i * per..(i + 1) * per]
    }
}

/// Stack samples into a batch. All samples must share one shape.
fn collate(samples: Vec<Sample>) -> Result<Batch> {
    let Some(first) = samples.first() else {
        return Ok(Batch {
            ids: Vec::new(),
            images: Vec::new(),
            shape: [0, 0, 0, 0],
            labels: None,
        });
    };
    let [h, w, c] = first.shape;
    let n = samples.len();

    if let Some(odd) = samples.iter().find(|s| s.shape != first.shape) {
        return Err(Error::ShapeMismatch {
            path: PathBuf::from(&odd.id),
            expected: first.shape,
            got: odd.shape,
        });
    }

    let labels = samples.iter().map(|s| s.label).collect::<Option<Vec<_>>>();
    let mut ids = Vec::with_capacity(n);
    let mut images = Vec::with_capacity(n * h * w * c);
    for s in samples {
        images.extend_from_slice(&s.pixels);
        ids.push(s.id);
    }

    Ok(Batch {
        ids,
        images,
        shape: [n, h, w, c],
        labels,
    })
}

// Visit order

/// Streaming shuffle of `0..n` through a buffer of `buffer_size` slots.
///
/// A uniformly chosen slot is emitted and refilled with the next input
/// index; once the input is exhausted the buffer drains in random order.
pub fn shuffle_buffer_order<R: Rng + ?Sized>(
    n: usize,
    buffer_size: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut input = 0..n;
    let mut buffer: Vec<usize> = input.by_ref().take(buffer_size.max(1)).collect();
    let mut out = Vec::with_capacity(n);
    while !buffer.is_empty() {
        let slot = rng.gen_range(0..buffer.len());
        match input.next() {
            Some(next) => out.push(std::mem::replace(&mut buffer[slot], next)),
            None => out.push(buffer.swap_remove(slot)),
        }
    }
    out
}

// Loader

/// A re-iterable, prefetching batch stream over a [`Dataset`].
pub struct Loader {
    dataset: Arc<dyn Dataset>,
    config: LoaderConfig,
    pool: Arc<ThreadPool>,
    epoch: u64,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("dataset", &self.dataset.name())
            .field("len", &self.dataset.len())
            .field("config", &self.config)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl Loader {
    /// Create a loader. Fails on an invalid config.
    pub fn new(dataset: Arc<dyn Dataset>, config: LoaderConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.num_workers)
            .thread_name({
                let name = dataset.name().to_string();
                move |i| format!("isic-{name}-{i}")
            })
            .build()?;
        Ok(Self {
            dataset,
            config,
            pool: Arc::new(pool),
            epoch: 0,
        })
    }

    /// Total number of samples.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn name(&self) -> &str {
        self.dataset.name()
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The number of batches per epoch.
    pub fn num_batches(&self) -> usize {
        if self.config.drop_last {
            self.dataset.len() / self.config.batch_size
        } else {
            self.dataset.len().div_ceil(self.config.batch_size)
        }
    }

    fn visit_order(&self) -> Vec<usize> {
        let n = self.dataset.len();
        match self.config.order {
            Order::Sequential => (0..n).collect(),
            Order::ShuffleBuffer(size) => match self.config.seed {
                Some(seed) => {
                    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(self.epoch));
                    shuffle_buffer_order(n, size, &mut rng)
                }
                None => shuffle_buffer_order(n, size, &mut thread_rng()),
            },
        }
    }

    /// Start one epoch of prefetched batches.
    pub fn iter(&mut self) -> BatchIter {
        let order = self.visit_order();
        self.epoch += 1;

        let num_batches = self.num_batches();
        let bs = self.config.batch_size;
        let drop_last = self.config.drop_last;
        let dataset = self.dataset.clone();
        let pool = self.pool.clone();

        tracing::debug!(
            dataset = dataset.name(),
            epoch = self.epoch,
            samples = order.len(),
            batches = num_batches,
            "starting epoch"
        );

        let (tx, rx) = mpsc::sync_channel::<Result<Batch>>(self.config.prefetch);

        let handle = thread::spawn(move || {
            for chunk in order.chunks(bs) {
                if drop_last && chunk.len() < bs {
                    break;
                }
                let result = pool
                    .install(|| {
                        chunk
                            .par_iter()
                            .map(|&i| dataset.get(i))
                            .collect::<Result<Vec<Sample>>>()
                    })
                    .and_then(collate);

                let failed = result.is_err();
                if let Err(e) = &result {
                    tracing::error!(dataset = dataset.name(), error = %e, "batch failed");
                }
                // Receiver gone, or the epoch is aborted.
                if tx.send(result).is_err() || failed {
                    break;
                }
            }
        });

        BatchIter {
            rx: Some(rx),
            handle: Some(handle),
            remaining: num_batches,
        }
    }
}

// BatchIter

/// Yields prefetched batches from the producer thread.
///
/// The producer is joined when the iterator is fully consumed or dropped.
pub struct BatchIter {
    rx: Option<mpsc::Receiver<Result<Batch>>>,
    handle: Option<thread::JoinHandle<()>>,
    remaining: usize,
}

impl Iterator for BatchIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let rx = self.rx.as_ref()?;
        match rx.recv() {
            Ok(Ok(batch)) => {
                self.remaining -= 1;
                Some(Ok(batch))
            }
            Ok(Err(e)) => {
                self.remaining = 0;
                Some(Err(e))
            }
            Err(_) => {
                // Producer finished early
                self.remaining = 0;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl Drop for BatchIter {
    fn drop(&mut self) {
        // Closing the receiver makes the producer's next send fail.
        drop(self.rx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

// Tests
