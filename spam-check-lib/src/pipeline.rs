//! Staged pipeline runner.
//!
//! A pipeline is a chain of [`Stage`]s connected by single-slot conduits.
//! Every stage runs as its own tokio task, reads from its upstream conduit
//! until it is closed and owns the sender of its downstream conduit. When a
//! stage returns, its sender is dropped, which closes the conduit exactly
//! once and lets the next stage finish its read loop.
//!
//! ```rust,no_run
//! use spam_check_lib::{stage_fn, Pipeline};
//! use tokio::sync::mpsc::{Receiver, Sender};
//!
//! #[tokio::main]
//! async fn main() {
//!     let doubled = Pipeline::from_items(vec![1u64, 2, 3])
//!         .stage(stage_fn("double", |mut rx: Receiver<u64>, tx: Sender<u64>| async move {
//!             while let Some(n) = rx.recv().await {
//!                 if tx.send(n * 2).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         }))
//!         .collect()
//!         .await;
//!     assert_eq!(doubled, vec![2, 4, 6]);
//! }
//! ```

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinSet;
use tracing::{debug, error, info_span, Instrument};

/// Number of items a conduit holds before `send` waits for the receiver.
pub const CONDUIT_CAPACITY: usize = 1;

/// Create a conduit between two stages.
pub fn conduit<T>() -> (Sender<T>, Receiver<T>) {
    mpsc::channel(CONDUIT_CAPACITY)
}

/// One concurrent step of a pipeline.
///
/// `run` must keep reading `input` until it yields `None` and must not return
/// while any work it spawned still holds a clone of `output`.
#[async_trait]
pub trait Stage: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Name used in log spans.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn run(self, input: Receiver<Self::Input>, output: Sender<Self::Output>);
}

/// A stage built from an async closure, see [`stage_fn`].
pub struct FnStage<F, I, O> {
    name: &'static str,
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

/// Turn an async closure taking `(input, output)` into a [`Stage`].
pub fn stage_fn<F, Fut, I, O>(name: &'static str, f: F) -> FnStage<F, I, O>
where
    F: FnOnce(Receiver<I>, Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    FnStage {
        name,
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, Fut, I, O> Stage for FnStage<F, I, O>
where
    F: FnOnce(Receiver<I>, Sender<O>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(self, input: Receiver<I>, output: Sender<O>) {
        (self.f)(input, output).await
    }
}

/// A running chain of stages whose last conduit carries `T`.
///
/// Stages start as soon as they are added, so building a pipeline must
/// happen inside a tokio runtime. Items only move once the final conduit is
/// drained with [`Pipeline::collect`], [`Pipeline::for_each`] or
/// [`Pipeline::run`].
pub struct Pipeline<T> {
    output: Receiver<T>,
    stages: JoinSet<()>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Start a pipeline that reads from an externally owned conduit.
    ///
    /// The pipeline ends once every sender of `input` has been dropped.
    pub fn from_receiver(input: Receiver<T>) -> Self {
        Self {
            output: input,
            stages: JoinSet::new(),
        }
    }

    /// Start a pipeline fed from an iterator.
    ///
    /// A source task pushes the items through the entry conduit and closes it
    /// once the iterator is exhausted.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send + 'static,
    {
        let (tx, rx) = conduit();
        let mut stages = JoinSet::new();
        stages.spawn(
            async move {
                for item in items {
                    if tx.send(item).await.is_err() {
                        debug!("downstream closed, stopping source");
                        break;
                    }
                }
            }
            .instrument(info_span!("stage", name = "source")),
        );
        Self { output: rx, stages }
    }

    /// Append a stage reading this pipeline's current output.
    pub fn stage<S>(self, stage: S) -> Pipeline<S::Output>
    where
        S: Stage<Input = T>,
    {
        let Pipeline { output, mut stages } = self;
        let (tx, rx) = conduit();
        let name = stage.name();

        stages.spawn(
            async move {
                debug!("stage started");
                stage.run(output, tx).await;
                debug!("stage finished");
            }
            .instrument(info_span!("stage", name)),
        );

        Pipeline { output: rx, stages }
    }

    /// Hand every item of the final conduit to `sink`, then wait for all stages.
    pub async fn for_each<F>(self, mut sink: F)
    where
        F: FnMut(T),
    {
        let Pipeline {
            mut output,
            mut stages,
        } = self;

        while let Some(item) = output.recv().await {
            sink(item);
        }

        while let Some(joined) = stages.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "pipeline stage task failed");
            }
        }
    }

    /// Drain the final conduit into a vector and wait for all stages.
    pub async fn collect(self) -> Vec<T> {
        let mut items = Vec::new();
        self.for_each(|item| items.push(item)).await;
        items
    }

    /// Run every stage to completion, discarding the final output.
    pub async fn run(self) {
        self.for_each(drop).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Forward<T> {
        name: &'static str,
        _marker: PhantomData<fn(T)>,
    }

    fn forward<T: Send + 'static>(name: &'static str) -> Forward<T> {
        Forward {
            name,
            _marker: PhantomData,
        }
    }

    #[async_trait]
    impl<T: Send + 'static> Stage for Forward<T> {
        type Input = T;
        type Output = T;

        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(self, mut input: Receiver<T>, output: Sender<T>) {
            while let Some(item) = input.recv().await {
                if output.send(item).await.is_err() {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_items_flow_through_every_stage() {
        let out = Pipeline::from_items(vec![1u64, 2, 3])
            .stage(forward("first"))
            .stage(stage_fn("square", |mut rx: Receiver<u64>, tx: Sender<u64>| async move {
                while let Some(n) = rx.recv().await {
                    let _ = tx.send(n * n).await;
                }
            }))
            .stage(forward("last"))
            .collect()
            .await;

        assert_eq!(out, vec![1, 4, 9]);
    }

    #[tokio::test]
    async fn test_stages_change_payload_type() {
        let out = Pipeline::from_items(vec![3u64, 1])
            .stage(stage_fn("format", |mut rx: Receiver<u64>, tx: Sender<String>| async move {
                while let Some(n) = rx.recv().await {
                    let _ = tx.send(format!("#{}", n)).await;
                }
            }))
            .collect()
            .await;

        assert_eq!(out, vec!["#3".to_string(), "#1".to_string()]);
    }

    #[tokio::test]
    async fn test_close_propagates_after_in_flight_work() {
        // The stage keeps working after its input closes; downstream must
        // still see the late item before its own input closes.
        let out = Pipeline::from_items(vec![1u64])
            .stage(stage_fn("late", |mut rx: Receiver<u64>, tx: Sender<u64>| async move {
                let mut seen = Vec::new();
                while let Some(n) = rx.recv().await {
                    seen.push(n);
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
                for n in seen {
                    let _ = tx.send(n + 100).await;
                }
            }))
            .collect()
            .await;

        assert_eq!(out, vec![101]);
    }

    #[tokio::test]
    async fn test_run_waits_for_every_stage() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        Pipeline::from_items(Vec::<u64>::new())
            .stage(stage_fn("slow", move |mut rx: Receiver<u64>, _tx: Sender<u64>| async move {
                while rx.recv().await.is_some() {}
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
            }))
            .run()
            .await;

        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_external_entry_conduit() {
        let (tx, rx) = conduit();
        let pipeline = Pipeline::from_receiver(rx).stage(forward("echo"));

        let feeder = tokio::spawn(async move {
            for word in ["a", "b"] {
                tx.send(word.to_string()).await.unwrap();
            }
        });

        let out = pipeline.collect().await;
        feeder.await.unwrap();
        assert_eq!(out, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_panicking_stage_does_not_fail_runner() {
        let out = Pipeline::from_items(vec![1u64, 2])
            .stage(stage_fn("boom", |mut rx: Receiver<u64>, _tx: Sender<u64>| async move {
                let _ = rx.recv().await;
                panic!("stage failure");
            }))
            .collect()
            .await;

        assert!(out.is_empty());
    }
}
