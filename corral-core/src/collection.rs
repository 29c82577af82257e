use crate::Result;
use crate::filter;
use crate::graph::{Edge, PackageNode, build_graph};
use crate::package::{PackageManager, PackageRecord};
use crate::throttle::AsyncThrottle;
use futures::future::{BoxFuture, join_all};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tokio::sync::{Semaphore, watch};

/// How `for_each` drives callbacks over the ordered array.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Discipline {
    /// One package at a time, in dependency order.
    #[default]
    Sequential,
    /// Everything at once, no ordering.
    Parallel,
    /// Dependency-aware with bounded parallelism.
    Streaming,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    #[default]
    Auto,
    Limit(usize),
}

/// External cancellation signal. Cloneable; `cancel` is sticky.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        CancelSignal::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Handed to callbacks so they can request a cooperative soft stop of the
/// surrounding `for_each` pass.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

// Per-pass abort flag merged with the optional external signal. Checked at
// suspension points only; a running callback is never preempted.
#[derive(Debug, Clone, Default)]
struct Canceller {
    local: Arc<AtomicBool>,
    external: Option<CancelSignal>,
}

impl Canceller {
    fn new(external: Option<CancelSignal>) -> Self {
        Canceller {
            local: Arc::new(AtomicBool::new(false)),
            external,
        }
    }

    fn aborted(&self) -> bool {
        self.local.load(Ordering::SeqCst)
            || self
                .external
                .as_ref()
                .is_some_and(CancelSignal::is_cancelled)
    }

    fn handle(&self) -> AbortHandle {
        AbortHandle {
            flag: Arc::clone(&self.local),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Resolved,
    Failed,
}

/// Package access and callback execution in dependency order.
///
/// The node array is a dependency-first total order over all packages,
/// project root included. Edges never change after construction; only the
/// per-node selected flag and the scheduling settings are mutable.
#[derive(Debug)]
pub struct PackageCollection {
    nodes: Vec<PackageNode>,
    dependencies: Vec<Vec<Edge>>,
    dependents: Vec<Vec<Edge>>,
    root: usize,
    start: usize,
    throttle: AsyncThrottle,
    concurrency: Concurrency,
    discipline: Discipline,
}

impl PackageCollection {
    /// Build the collection from discovered records. `start_dir` picks the
    /// start package (the one owning that directory, or the root).
    pub fn new(root: PackageRecord, members: Vec<PackageRecord>, start_dir: &Path) -> Self {
        let built = build_graph(root, members);
        let mut collection = PackageCollection {
            nodes: built.nodes,
            dependencies: built.dependencies,
            dependents: built.dependents,
            root: built.root,
            start: built.root,
            throttle: AsyncThrottle::new(),
            concurrency: Concurrency::Auto,
            discipline: Discipline::Sequential,
        };

        collection.start = collection
            .package_for_path(start_dir)
            .unwrap_or(collection.root);
        collection
    }

    pub fn nodes(&self) -> &[PackageNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &PackageNode {
        &self.nodes[index]
    }

    pub fn node_mut(&mut self, index: usize) -> &mut PackageNode {
        &mut self.nodes[index]
    }

    pub fn root(&self) -> &PackageNode {
        &self.nodes[self.root]
    }

    pub fn root_index(&self) -> usize {
        self.root
    }

    pub fn start(&self) -> &PackageNode {
        &self.nodes[self.start]
    }

    pub fn start_index(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn package_manager(&self) -> &PackageManager {
        &self.nodes[self.root].package_manager
    }

    /// Edges where the package at `index` is the dependent.
    pub fn local_dependencies(&self, index: usize) -> &[Edge] {
        &self.dependencies[index]
    }

    /// Edges where the package at `index` is the dependency.
    pub fn local_dependents(&self, index: usize) -> &[Edge] {
        &self.dependents[index]
    }

    pub fn selected(&self) -> impl Iterator<Item = &PackageNode> {
        self.nodes.iter().filter(|node| node.is_selected)
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    pub fn set_concurrency(&mut self, value: Concurrency) {
        self.concurrency = match value {
            Concurrency::Auto => Concurrency::Auto,
            Concurrency::Limit(limit) => Concurrency::Limit(limit.clamp(1, 100)),
        };
    }

    pub fn delay_ms(&self) -> u64 {
        self.throttle.delay_ms()
    }

    pub fn set_delay_ms(&mut self, value: u64) {
        self.throttle.set_delay_ms(value);
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    pub fn set_discipline(&mut self, value: Discipline) {
        self.discipline = value;
    }

    /// Select or deselect packages by filter expressions, applied left to
    /// right: `"foo"`, `"foo*"`, `"foo..."` (foo and its dependencies),
    /// `"foo^..."` (dependencies only), `"...foo"` (foo and its dependents),
    /// `"...^foo"` (dependents only), each optionally prefixed with `!` to
    /// deselect instead.
    pub fn filter<I, S>(&mut self, expressions: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        filter::apply(
            &mut self.nodes,
            &self.dependencies,
            &self.dependents,
            expressions,
        );
    }

    /// The package whose directory is the longest prefix of `path`.
    pub fn package_for_path(&self, path: &Path) -> Option<usize> {
        let mut best: Option<usize> = None;

        for (index, node) in self.nodes.iter().enumerate() {
            if !path.starts_with(&node.dir) {
                continue;
            }

            let longer = match best {
                Some(current) => {
                    node.dir.as_os_str().len() > self.nodes[current].dir.as_os_str().len()
                }
                None => true,
            };

            if longer {
                best = Some(index);
            }
        }

        best
    }

    /// Execute callbacks according to the configured discipline. Resolves
    /// `Ok(false)` after a soft stop; a callback error fails the whole call.
    pub async fn for_each<'c, F>(&'c self, callback: F, signal: Option<CancelSignal>) -> Result<bool>
    where
        F: Fn(&'c PackageNode, AbortHandle) -> BoxFuture<'c, Result<()>>,
    {
        match self.discipline {
            Discipline::Sequential => self.for_each_sequential(callback, signal).await,
            Discipline::Parallel => self.for_each_parallel(callback, signal).await,
            Discipline::Streaming => self.for_each_streaming(callback, signal).await,
        }
    }

    /// One package at a time, in dependency order.
    pub async fn for_each_sequential<'c, F>(
        &'c self,
        callback: F,
        signal: Option<CancelSignal>,
    ) -> Result<bool>
    where
        F: Fn(&'c PackageNode, AbortHandle) -> BoxFuture<'c, Result<()>>,
    {
        let cancel = Canceller::new(signal);

        for node in &self.nodes {
            if cancel.aborted() {
                break;
            }

            self.throttle.acquire().await;

            if cancel.aborted() {
                break;
            }

            let result = callback(node, cancel.handle()).await;
            node.log.flush();
            result?;
        }

        Ok(!cancel.aborted())
    }

    /// Every callback at once, with no dependency blocking. The throttle
    /// still staggers start times.
    pub async fn for_each_parallel<'c, F>(
        &'c self,
        callback: F,
        signal: Option<CancelSignal>,
    ) -> Result<bool>
    where
        F: Fn(&'c PackageNode, AbortHandle) -> BoxFuture<'c, Result<()>>,
    {
        let cancel = Canceller::new(signal);
        let callback = &callback;

        let tasks = self.nodes.iter().map(|node| {
            let cancel = cancel.clone();
            async move {
                self.throttle.acquire().await;

                if cancel.aborted() {
                    return Ok(());
                }

                let result = callback(node, cancel.handle()).await;
                node.log.flush();
                result
            }
        });

        for result in join_all(tasks).await {
            result?;
        }

        Ok(!cancel.aborted())
    }

    /// Dependency order with parallelism across packages that do not depend
    /// on each other, bounded by the concurrency setting. A package whose
    /// dependency callback failed is skipped silently; the failure itself
    /// still fails the overall call once every task has settled.
    pub async fn for_each_streaming<'c, F>(
        &'c self,
        callback: F,
        signal: Option<CancelSignal>,
    ) -> Result<bool>
    where
        F: Fn(&'c PackageNode, AbortHandle) -> BoxFuture<'c, Result<()>>,
    {
        let cancel = Canceller::new(signal);
        let callback = &callback;
        let semaphore = Semaphore::new(self.concurrency_limit());
        let semaphore = &semaphore;

        // First pass: a settlement channel per package, so tasks can await
        // dependency tasks that exist but have not started yet.
        let mut senders = Vec::with_capacity(self.nodes.len());
        let mut receivers = Vec::with_capacity(self.nodes.len());

        for _ in &self.nodes {
            let (sender, receiver) = watch::channel(None::<TaskOutcome>);
            senders.push(sender);
            receivers.push(receiver);
        }

        // Second pass: build every task, then start them all together.
        // Only dependencies appearing earlier in the ordered array are
        // awaited; in a cycle the later package waits on the earlier one
        // but not the reverse, so the pass cannot deadlock.
        let tasks: Vec<_> = senders
            .into_iter()
            .enumerate()
            .map(|(index, settled)| {
                let waits: Vec<_> = self.dependencies[index]
                    .iter()
                    .filter(|edge| edge.target < index)
                    .map(|edge| receivers[edge.target].clone())
                    .collect();
                let cancel = cancel.clone();

                async move {
                    let result = self
                        .run_streaming_node(index, waits, &cancel, semaphore, callback)
                        .await;
                    let outcome = if result.is_err() {
                        TaskOutcome::Failed
                    } else {
                        TaskOutcome::Resolved
                    };
                    let _ = settled.send(Some(outcome));
                    result
                }
            })
            .collect();

        for result in join_all(tasks).await {
            result?;
        }

        Ok(!cancel.aborted())
    }

    async fn run_streaming_node<'c, F>(
        &'c self,
        index: usize,
        mut waits: Vec<watch::Receiver<Option<TaskOutcome>>>,
        cancel: &Canceller,
        semaphore: &Semaphore,
        callback: &F,
    ) -> Result<()>
    where
        F: Fn(&'c PackageNode, AbortHandle) -> BoxFuture<'c, Result<()>>,
    {
        if cancel.aborted() {
            return Ok(());
        }

        for settled in waits.iter_mut() {
            // A failed dependency silently skips this package. The failure
            // is not re-raised here; the top-level join surfaces it.
            match settled.wait_for(Option::is_some).await {
                Ok(outcome) if matches!(*outcome, Some(TaskOutcome::Failed)) => return Ok(()),
                Ok(_) => {}
                Err(_) => return Ok(()),
            }
        }

        if cancel.aborted() {
            return Ok(());
        }

        let _permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return Ok(()),
        };

        if cancel.aborted() {
            return Ok(());
        }

        self.throttle.acquire().await;

        if cancel.aborted() {
            return Ok(());
        }

        let node = &self.nodes[index];
        let result = callback(node, cancel.handle()).await;
        node.log.flush();
        result
    }

    fn concurrency_limit(&self) -> usize {
        match self.concurrency {
            Concurrency::Limit(limit) => limit,
            Concurrency::Auto => thread::available_parallelism()
                .map(|count| count.get() + 1)
                .unwrap_or(2),
        }
    }
}
