//! Runs independent units of work with bounded concurrency.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinError;

/// A finished unit of work.
#[derive(Debug)]
pub struct Completion<T> {
    /// The position of the unit in the submitted sequence.
    pub index: usize,
    /// The output of the unit, or the error if it panicked.
    pub output: Result<T, JoinError>,
}

/// A fixed-size pool of tokio tasks.
///
/// At most `concurrency` units run at the same time. A unit only starts once an earlier one has
/// finished and released its slot. There is no cancellation, units always run to completion.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    concurrency: usize,
}

impl Dispatcher {
    /// Creates a dispatcher running at most `concurrency` units at once.
    ///
    /// A concurrency of zero is raised to one.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    /// The maximum number of units running at once.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Starts running `units` in the background and returns their completions.
    ///
    /// Completions are yielded in the order the units finish, which is unrelated to the order
    /// they were submitted in. The stream ends once every unit has completed.
    pub fn dispatch<I, F, T>(&self, units: I) -> Completions<T>
    where
        I: IntoIterator<Item = F>,
        I::IntoIter: Send + 'static,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (sender, receiver) = mpsc::unbounded_channel();
        let units = units.into_iter();

        tokio::spawn(async move {
            for (index, unit) in units.enumerate() {
                // The semaphore is never closed, so acquiring only waits for a free slot.
                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let sender = sender.clone();

                tokio::spawn(async move {
                    // Running the unit as its own task turns a panic into a `JoinError`
                    // instead of losing the completion.
                    let output = tokio::spawn(unit).await;
                    drop(permit);
                    sender.send(Completion { index, output }).ok();
                });
            }
        });

        Completions { receiver }
    }
}

/// A [`Stream`] of [`Completion`]s in the order units finish.
#[derive(Debug)]
pub struct Completions<T> {
    receiver: mpsc::UnboundedReceiver<Completion<T>>,
}

impl<T> Stream for Completions<T> {
    type Item = Completion<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
