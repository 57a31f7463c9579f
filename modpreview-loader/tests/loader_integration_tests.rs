//! Integration tests for loaders
//!
//! These tests verify:
//! - Reuse of cached bundles while dependency tokens are unchanged
//! - Recomputation on token change and on forced sessions
//! - Dependency aggregation through composed loaders
//! - Cancellation and session independence
//! - Diamond compositions, sequential and concurrent
//! - Cycles that answer with a stale bundle commit nothing

use async_trait::async_trait;
use modpreview_loader::loader::{
    merge_dependencies, merge_warnings, Analysis, Bundle, AnalysisInput, ContentAnalyzer, FileLoader, LoadResult, Loader,
    LoaderCell, LoaderRegistry, LoaderSession, ProgressPhase, ProgressRelay, Warning,
};
use modpreview_loader::{LoaderError, MemorySource, ResourceSource, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Upper-cases the file and counts invocations
struct Shout {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentAnalyzer for Shout {
    type Output = String;

    fn name(&self) -> &'static str {
        "Shout"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = input.require_content()?;
        let declared: Vec<String> = input.dependencies.iter().map(|d| d.path.clone()).collect();
        Ok(Analysis::new(content.trim().to_uppercase()).with_dependencies(declared))
    }
}

/// Reads its own file and appends the value of another loader
struct Compose {
    inner: Arc<FileLoader<Shout>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentAnalyzer for Compose {
    type Output = String;

    async fn analyze(&self, input: AnalysisInput<'_>, session: &LoaderSession) -> Result<Analysis<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let own = input.require_content()?.trim().to_string();
        let inner = self.inner.load(session).await?;
        session.throw_if_cancelled()?;

        Ok(Analysis::new(format!("{}+{}", own, inner.value))
            .with_dependencies(inner.dependencies.iter().cloned())
            .with_warnings(inner.warnings.iter().cloned()))
    }
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn shout(path: &str, source: &Arc<MemorySource>, calls: &Arc<AtomicUsize>) -> FileLoader<Shout> {
    FileLoader::new(
        path,
        Shout { calls: calls.clone() },
        source.clone() as Arc<dyn ResourceSource>,
        ProgressRelay::default(),
    )
}

#[tokio::test]
async fn test_unchanged_tokens_reuse_bundle() {
    let source = Arc::new(MemorySource::new());
    source.insert("x.txt", "hello");
    let calls = counter();
    let loader = shout("x.txt", &source, &calls);

    let first = loader.load(&LoaderSession::new(false)).await.unwrap();
    let second = loader.load(&LoaderSession::new(false)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(source.read_count("x.txt"), 1);
}

#[tokio::test]
async fn test_changed_token_recomputes() {
    let source = Arc::new(MemorySource::new());
    source.insert("x.txt", "hello");
    let calls = counter();
    let loader = shout("x.txt", &source, &calls);

    loader.load(&LoaderSession::new(false)).await.unwrap();
    source.insert("x.txt", "world");
    let result = loader.load(&LoaderSession::new(false)).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(result.value, "WORLD");
}

#[tokio::test]
async fn test_force_always_recomputes() {
    let source = Arc::new(MemorySource::new());
    source.insert("x.txt", "hello");
    let calls = counter();
    let loader = shout("x.txt", &source, &calls);

    loader.load(&LoaderSession::new(false)).await.unwrap();
    loader.load(&LoaderSession::new(true)).await.unwrap();
    assert_eq!(loader.get_value(true).await.unwrap(), "HELLO");

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_declared_dependency_invalidates() {
    let source = Arc::new(MemorySource::new());
    source.insert("x.txt", "#!gfx:interface/extra.gfx\nhello");
    let calls = counter();
    let loader = shout("x.txt", &source, &calls);

    let result = loader.load(&LoaderSession::new(false)).await.unwrap();
    assert!(result.dependencies.contains("interface/extra.gfx"));

    source.insert("interface/extra.gfx", "new");
    loader.load(&LoaderSession::new(false)).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_io_error_propagates_and_is_not_kept() {
    let source = Arc::new(MemorySource::new());
    let calls = counter();
    let loader = shout("missing.txt", &source, &calls);

    let err = loader.load(&LoaderSession::new(false)).await.unwrap_err();
    assert!(err.is_io());
    assert!(loader.cell().last_bundle().is_none());

    source.insert("missing.txt", "here");
    assert_eq!(loader.get_value(false).await.unwrap(), "HERE");
}

#[tokio::test]
async fn test_change_in_outer_file_reuses_inner_bundle() {
    let source = Arc::new(MemorySource::new());
    source.insert("x.txt", "inner");
    source.insert("y.txt", "outer");

    let a_calls = counter();
    let b_calls = counter();
    let a = Arc::new(shout("x.txt", &source, &a_calls));
    let b = FileLoader::new(
        "y.txt",
        Compose {
            inner: a.clone(),
            calls: b_calls.clone(),
        },
        source.clone(),
        ProgressRelay::default(),
    );

    let first = b.load(&LoaderSession::new(false)).await.unwrap();
    assert_eq!(first.value, "outer+INNER");
    let a_bundle = a.cell().last_bundle().unwrap();

    source.insert("y.txt", "changed");
    let second = b.load(&LoaderSession::new(false)).await.unwrap();

    assert_eq!(second.value, "changed+INNER");
    assert_eq!(b_calls.load(Ordering::SeqCst), 2);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&a_bundle, &a.cell().last_bundle().unwrap()));
    assert!(second.dependencies.contains("x.txt"));
    assert!(second.dependencies.contains("y.txt"));

    // A leaf change invalidates every ancestor
    source.insert("x.txt", "leaf");
    let third = b.load(&LoaderSession::new(false)).await.unwrap();
    assert_eq!(third.value, "changed+LEAF");
    assert_eq!(a_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_runs_nothing() {
    let source = Arc::new(MemorySource::new());
    source.insert("x.txt", "inner");
    source.insert("y.txt", "outer");

    let a_calls = counter();
    let b_calls = counter();
    let a = Arc::new(shout("x.txt", &source, &a_calls));
    let b = FileLoader::new(
        "y.txt",
        Compose {
            inner: a,
            calls: b_calls.clone(),
        },
        source.clone(),
        ProgressRelay::default(),
    );

    let session = LoaderSession::new(false);
    session.cancel();

    assert_eq!(b.load(&session).await.unwrap_err(), LoaderError::Cancelled);
    assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_concurrent_sessions_share_one_computation() {
    struct Slow {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ContentAnalyzer for Slow {
        type Output = usize;

        async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<usize>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(Analysis::new(input.require_content()?.len()))
        }
    }

    let source = Arc::new(MemorySource::new());
    source.insert("map/definition.csv", "1;2;3");
    let calls = counter();
    let loader = FileLoader::new(
        "map/definition.csv",
        Slow { calls: calls.clone() },
        source,
        ProgressRelay::default(),
    );

    let (s1, s2) = (LoaderSession::new(false), LoaderSession::new(false));
    let (a, b) = tokio::join!(loader.load(&s1), loader.load(&s2));

    assert_eq!(a.unwrap().value, 5);
    assert_eq!(b.unwrap().value, 5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Waits for a permit before analyzing, so a test can hold it in flight
struct Gated {
    permits: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentAnalyzer for Gated {
    type Output = String;

    fn name(&self) -> &'static str {
        "Gated"
    }

    async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.permits
            .acquire()
            .await
            .map_err(|e| LoaderError::Other(e.to_string()))?
            .forget();
        Ok(Analysis::new(input.require_content()?.to_string()))
    }
}

/// Composite over a single sub-loader
struct Wrapper {
    cell: LoaderCell<String>,
    sub: Arc<FileLoader<Gated>>,
}

#[async_trait]
impl Loader for Wrapper {
    type Output = String;

    fn cell(&self) -> &LoaderCell<String> {
        &self.cell
    }

    async fn load_impl(&self, session: &LoaderSession) -> Result<LoadResult<String>> {
        let sub = self.sub.load(session).await?;
        session.throw_if_cancelled()?;

        Ok(LoadResult::new(format!("[{}]", sub.value))
            .with_dependencies(merge_dependencies(&[&*sub]))
            .with_warnings(merge_warnings(&[&*sub])))
    }
}

#[tokio::test]
async fn test_cancelling_first_session_does_not_affect_second() {
    let source = Arc::new(MemorySource::new());
    source.insert("common/countries.txt", "GER");
    let relay = ProgressRelay::default();
    let mut events = relay.subscribe();

    let permits = Arc::new(Semaphore::new(0));
    let calls = counter();
    let sub = Arc::new(FileLoader::new(
        "common/countries.txt",
        Gated {
            permits: permits.clone(),
            calls: calls.clone(),
        },
        source.clone(),
        relay.clone(),
    ));
    let wrapper = Arc::new(Wrapper {
        cell: LoaderCell::new("[Wrapper]", source.clone(), relay.clone()),
        sub,
    });

    let first = Arc::new(LoaderSession::new(false));
    let task1 = {
        let (wrapper, first) = (wrapper.clone(), first.clone());
        tokio::spawn(async move { wrapper.load(&first).await })
    };

    // Wait until the sub-loader is in flight for the first session
    loop {
        let event = events.recv().await.unwrap();
        if event.loader == "[Gated common/countries.txt]" && event.phase == ProgressPhase::Started {
            break;
        }
    }

    let second = Arc::new(LoaderSession::new(false));
    let task2 = {
        let (wrapper, second) = (wrapper.clone(), second.clone());
        tokio::spawn(async move { wrapper.load(&second).await })
    };

    first.cancel();
    permits.add_permits(2);

    assert_eq!(task1.await.unwrap().unwrap_err(), LoaderError::Cancelled);
    let result = task2.await.unwrap().unwrap();
    assert_eq!(result.value, "[GER]");
    assert!(result.dependencies.contains("common/countries.txt"));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Loads every loader of a list and joins their values
struct Join {
    cell: LoaderCell<String>,
    parts: Vec<Arc<dyn Loader<Output = String>>>,
}

#[async_trait]
impl Loader for Join {
    type Output = String;

    fn cell(&self) -> &LoaderCell<String> {
        &self.cell
    }

    async fn load_impl(&self, session: &LoaderSession) -> Result<LoadResult<String>> {
        let mut bundles = Vec::new();
        for part in &self.parts {
            bundles.push(part.load(session).await?);
            session.throw_if_cancelled()?;
        }

        let views: Vec<&dyn Bundle> = bundles.iter().map(|b| &**b as &dyn Bundle).collect();
        let value = bundles.iter().map(|b| b.value.clone()).collect::<Vec<_>>().join(",");
        Ok(LoadResult::new(value)
            .with_dependencies(merge_dependencies(&views))
            .with_warnings(merge_warnings(&views)))
    }
}

#[tokio::test]
async fn test_diamond_runs_shared_loader_once_per_session() {
    let source = Arc::new(MemorySource::new());
    source.insert("map/definition.csv", "provinces");
    let calls = counter();
    let shared: Arc<dyn Loader<Output = String>> = Arc::new(shout("map/definition.csv", &source, &calls));

    let relay = ProgressRelay::default();
    let left: Arc<dyn Loader<Output = String>> = Arc::new(Join {
        cell: LoaderCell::new("[Left]", source.clone(), relay.clone()),
        parts: vec![shared.clone()],
    });
    let right: Arc<dyn Loader<Output = String>> = Arc::new(Join {
        cell: LoaderCell::new("[Right]", source.clone(), relay.clone()),
        parts: vec![shared.clone()],
    });
    let top = Join {
        cell: LoaderCell::new("[Top]", source.clone(), relay),
        parts: vec![left, right],
    };

    let session = LoaderSession::new(true);
    let result = top.load(&session).await.unwrap();

    assert_eq!(result.value, "PROVINCES,PROVINCES");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(session.visited_loaders().len(), 4);
}

/// Upper-cases the file after a short delay, so concurrent callers overlap
struct SlowShout {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ContentAnalyzer for SlowShout {
    type Output = String;

    async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(Analysis::new(input.require_content()?.trim().to_uppercase()))
    }
}

/// Loads both sides at the same time and joins their values
struct ConcurrentPair {
    cell: LoaderCell<String>,
    left: Arc<dyn Loader<Output = String>>,
    right: Arc<dyn Loader<Output = String>>,
}

#[async_trait]
impl Loader for ConcurrentPair {
    type Output = String;

    fn cell(&self) -> &LoaderCell<String> {
        &self.cell
    }

    async fn load_impl(&self, session: &LoaderSession) -> Result<LoadResult<String>> {
        let (left, right) = futures::join!(self.left.load(session), self.right.load(session));
        let (left, right) = (left?, right?);
        session.throw_if_cancelled()?;

        Ok(LoadResult::new(format!("{},{}", left.value, right.value))
            .with_dependencies(merge_dependencies(&[&*left, &*right]))
            .with_warnings(merge_warnings(&[&*left, &*right])))
    }
}

#[tokio::test]
async fn test_concurrent_diamond_awaits_shared_loader() {
    let source = Arc::new(MemorySource::new());
    source.insert("map/definition.csv", "provinces");
    let calls = counter();
    let shared: Arc<dyn Loader<Output = String>> = Arc::new(FileLoader::new(
        "map/definition.csv",
        SlowShout { calls: calls.clone() },
        source.clone(),
        ProgressRelay::default(),
    ));

    let relay = ProgressRelay::default();
    let side = |label: &str| -> Arc<dyn Loader<Output = String>> {
        Arc::new(Join {
            cell: LoaderCell::new(label, source.clone(), relay.clone()),
            parts: vec![shared.clone()],
        })
    };
    let top = ConcurrentPair {
        cell: LoaderCell::new("[Top]", source.clone(), relay.clone()),
        left: side("[Left]"),
        right: side("[Right]"),
    };

    let cold = top.load(&LoaderSession::new(false)).await.unwrap();
    assert_eq!(cold.value, "PROVINCES,PROVINCES");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    source.insert("map/definition.csv", "changed");
    let changed = top.load(&LoaderSession::new(false)).await.unwrap();
    assert_eq!(changed.value, "CHANGED,CHANGED");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let unchanged = top.load(&LoaderSession::new(false)).await.unwrap();
    assert!(Arc::ptr_eq(&changed, &unchanged));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Appends `!` to the value of the loader it points to, if any
struct Cyclic {
    cell: LoaderCell<String>,
    other: parking_lot::Mutex<Option<Arc<Cyclic>>>,
}

#[async_trait]
impl Loader for Cyclic {
    type Output = String;

    fn cell(&self) -> &LoaderCell<String> {
        &self.cell
    }

    async fn load_impl(&self, session: &LoaderSession) -> Result<LoadResult<String>> {
        let other = self.other.lock().clone();
        match other {
            Some(other) => other
                .load(session)
                .await
                .map(|b| LoadResult::new(format!("{}!", b.value))),
            None => Ok(LoadResult::new(String::new())),
        }
    }
}

fn cyclic_pair() -> (Arc<Cyclic>, Arc<Cyclic>) {
    let source: Arc<dyn ResourceSource> = Arc::new(MemorySource::new());
    let a = Arc::new(Cyclic {
        cell: LoaderCell::new("[A]", source.clone(), ProgressRelay::default()),
        other: parking_lot::Mutex::new(None),
    });
    let b = Arc::new(Cyclic {
        cell: LoaderCell::new("[B]", source, ProgressRelay::default()),
        other: parking_lot::Mutex::new(Some(a.clone())),
    });
    (a, b)
}

#[tokio::test]
async fn test_cycle_without_prior_result_fails_instead_of_hanging() {
    let (a, b) = cyclic_pair();
    *a.other.lock() = Some(b);

    let result = tokio::time::timeout(Duration::from_secs(5), a.load(&LoaderSession::new(false)))
        .await
        .expect("cyclic load must not hang");
    assert!(matches!(result, Err(LoaderError::Cycle { .. })));
}

#[tokio::test]
async fn test_cycle_answer_is_never_committed() {
    let (a, b) = cyclic_pair();
    let before = a.load(&LoaderSession::new(false)).await.unwrap();
    assert_eq!(before.value, "");

    *a.other.lock() = Some(b.clone());
    let session = LoaderSession::new(true);
    let result = a.load(&session).await.unwrap();

    // B saw A's last bundle; neither result may be kept as fresh
    assert_eq!(result.value, "!!");
    assert!(session.is_tainted());
    assert!(Arc::ptr_eq(&a.cell().last_bundle().unwrap(), &before));
    assert!(b.cell().last_bundle().is_none());
}

#[tokio::test]
async fn test_progress_reaches_parent_relay() {
    let source = Arc::new(MemorySource::new());
    source.insert("x.txt", "hello");

    let root = ProgressRelay::default();
    let mut events = root.subscribe();
    let loader = FileLoader::new(
        "x.txt",
        Shout { calls: counter() },
        source,
        ProgressRelay::child_of(&root),
    );

    loader.load(&LoaderSession::new(false)).await.unwrap();
    loader.load(&LoaderSession::new(false)).await.unwrap();

    let phases: Vec<ProgressPhase> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|e| e.phase)
        .collect();
    assert_eq!(
        phases,
        vec![ProgressPhase::Started, ProgressPhase::Finished, ProgressPhase::Reused]
    );
}

#[tokio::test]
async fn test_registry_reuses_loaders_per_path() {
    let source = Arc::new(MemorySource::new());
    source.insert("interface/a.gui", "a");
    source.insert("interface/b.gui", "b");
    let calls = counter();

    let registry = {
        let (source, calls) = (source.clone(), calls.clone());
        LoaderRegistry::new(move |path| shout(path, &source, &calls))
    };

    let paths = ["interface/a.gui", "interface/b.gui"];
    let first = registry.load_multiple(&paths[..], &LoaderSession::new(false)).await.unwrap();
    let second = registry.load_multiple(&paths[..], &LoaderSession::new(false)).await.unwrap();

    assert_eq!(first.iter().map(|r| r.value.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
    assert_eq!(first, second);
    assert_eq!(registry.len(), 2);
    assert!(Arc::ptr_eq(&registry.get("interface/a.gui"), &registry.get("interface/a.gui")));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_warnings_survive_composition() {
    struct Warns;

    #[async_trait]
    impl ContentAnalyzer for Warns {
        type Output = ();

        async fn analyze(&self, input: AnalysisInput<'_>, _session: &LoaderSession) -> Result<Analysis<()>> {
            Ok(Analysis::new(()).with_warnings([Warning::new(input.path, "deprecated key")]))
        }
    }

    let source = Arc::new(MemorySource::new());
    source.insert("events/a.txt", "");
    let loader = FileLoader::new("events/a.txt", Warns, source, ProgressRelay::default());

    let result = loader.load(&LoaderSession::new(false)).await.unwrap();
    assert_eq!(result.warnings, vec![Warning::new("events/a.txt", "deprecated key")]);
}
