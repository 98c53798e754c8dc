//! Background computation of radial activities.
//!
//! Jobs run on the rayon pool and report back over a channel. Every job gets
//! a generation number and only the result of the most recently submitted
//! job is handed out; results of superseded jobs are dropped.

use std::cell::{Cell as StdCell, RefCell};
use std::future::poll_fn;

use crate::volume::Volume;

use super::grid::PolarGridParams;
use super::{PolarSampling, compute_radial_activities};

use futures::FutureExt;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use log::debug;
use ndarray::Array2;

/// Owned inputs of one radial-activity computation.
#[derive(Clone, Debug)]
pub struct PolarJob {
    pub short_axis: Volume,
    pub sampling: PolarSampling,
    pub params: PolarGridParams,
}

impl PolarJob {
    pub fn run(&self) -> Array2<f64> {
        compute_radial_activities(&self.short_axis, &self.sampling, &self.params)
    }
}

type Message = (u64, Array2<f64>);

pub struct PolarWorker {
    sender: UnboundedSender<Message>,
    receiver: RefCell<UnboundedReceiver<Message>>,
    submitted: StdCell<u64>,
    completed: StdCell<u64>,
}

impl Default for PolarWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl PolarWorker {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            sender,
            receiver: RefCell::new(receiver),
            submitted: StdCell::new(0),
            completed: StdCell::new(0),
        }
    }

    /// Start `job` on the thread pool and return its generation.
    pub fn submit(&self, job: PolarJob) -> u64 {
        let generation = self.submitted.get() + 1;
        self.submitted.set(generation);

        let sender = self.sender.clone();
        rayon::spawn(move || {
            let activities = job.run();
            // the receiver is gone when the worker was dropped meanwhile
            let _ = sender.unbounded_send((generation, activities));
        });
        generation
    }

    /// Whether the latest submitted job has not reported yet.
    pub fn pending(&self) -> bool {
        self.completed.get() < self.submitted.get()
    }

    /// Result of the latest job if it arrived, without blocking.
    pub fn drain(&self) -> Option<Array2<f64>> {
        let mut latest = None;
        loop {
            let message = self.receiver.borrow_mut().next().now_or_never();
            match message {
                Some(Some(message)) => {
                    if let Some(activities) = self.accept(message) {
                        latest = Some(activities);
                    }
                }
                _ => return latest,
            }
        }
    }

    /// Wait for the latest job and return its result, `None` if nothing is
    /// pending.
    pub async fn settled(&self) -> Option<Array2<f64>> {
        let mut latest = None;
        while self.pending() {
            let message = poll_fn(|cx| self.receiver.borrow_mut().poll_next_unpin(cx)).await;
            let Some(message) = message else {
                break;
            };
            if let Some(activities) = self.accept(message) {
                latest = Some(activities);
            }
        }
        latest
    }

    fn accept(&self, (generation, activities): Message) -> Option<Array2<f64>> {
        if generation < self.submitted.get() {
            debug!(
                "dropping radial activities of job {generation}, job {} is newer",
                self.submitted.get()
            );
            return None;
        }
        self.completed.set(generation);
        Some(activities)
    }
}
