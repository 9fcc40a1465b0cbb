mod common;

use common::{conn, other_conn, register_library, FakeZosmf};
use mfsync::api::{DsMask, JobInfo, JobsFilter, SpoolFileInfo, UssEntry};
use mfsync::attributes::AttributesService;
use mfsync::events::{FileEvent, FileEventListener};
use mfsync::fetch::{CacheListener, FileFetchProvider, JobQuery, UssQuery};
use mfsync::progress::{Progress, ProgressIndicator};
use mfsync::vfs::FileSystem;
use mfsync::{Config, DataOps, FileHandle, RemoteQuery};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const JOB_LOG: &str = "J E S 2  J O B  L O G  --  S Y S T E M  S 0 W 1  --  N O D E  S 0 W 1\n\
0\n\
19.45.23 TSU06062 ---- TUESDAY,   20 JUN 2023 ----\n\
19.45.23 TSU06062  HASP373 TESTJOB  STARTED\n\
20.09.29 TSU06062  HASP395 TESTJOB  ENDED - ABEND=S222\n\
0------ JES2 JOB STATISTICS ------\n\
-  20 JUN 2023 JOB EXECUTION DATE\n";

/// Records cache notifications in arrival order.
struct Recorder<R> {
    events: Mutex<Vec<(&'static str, RemoteQuery<R>)>>,
}

impl<R> Recorder<R> {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }
}

impl<R: Clone + Send + Sync> CacheListener<R> for Recorder<R> {
    fn on_cache_updated(&self, query: &RemoteQuery<R>, _files: &[FileHandle]) {
        self.events.lock().unwrap().push(("updated", query.clone()));
    }

    fn on_cache_cleaned(&self, query: &RemoteQuery<R>) {
        self.events.lock().unwrap().push(("cleaned", query.clone()));
    }

    fn on_fetch_cancelled(&self, query: &RemoteQuery<R>) {
        self.events.lock().unwrap().push(("cancelled", query.clone()));
    }

    fn on_fetch_failure(&self, query: &RemoteQuery<R>, _error: &mfsync::SyncError) {
        self.events.lock().unwrap().push(("failed", query.clone()));
    }
}

fn deletion_counter(ops: &DataOps) -> Arc<AtomicUsize> {
    let deleted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deleted);
    let listener: Arc<dyn FileEventListener> = Arc::new(move |event: &FileEvent| {
        if matches!(event, FileEvent::Deleted(_)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    ops.events().subscribe(listener);
    deleted
}

fn names(files: &[FileHandle]) -> Vec<String> {
    files.iter().map(|f| f.name().to_string()).collect()
}

#[test]
fn test_vanished_dataset_is_cleaned_up_once() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_datasets(&["USER.A", "USER.B", "USER.C"]);
    let ops = DataOps::new(Config::default(), api.clone())?;
    let deleted = deletion_counter(&ops);

    let query = RemoteQuery::batched(conn(), DsMask::new("user.*"));
    ops.datasets().reload(&query, None);
    let before = ops.datasets().get_cached(&query).unwrap();
    assert_eq!(names(&before), ["USER.A", "USER.B", "USER.C"]);
    let vanished = before[2].clone();

    api.set_datasets(&["USER.A", "USER.B"]);
    ops.datasets().clean_cache(&query, true);
    assert!(ops.datasets().get_cached(&query).is_none());
    ops.datasets().reload(&query, None);

    let after = ops.datasets().get_cached(&query).unwrap();
    assert_eq!(names(&after), ["USER.A", "USER.B"]);
    assert_eq!(after[..], before[..2]);
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
    assert!(!ops.file_system().is_valid(&vanished));
    assert!(ops.attributes().get_attributes(&vanished).is_none());
    Ok(())
}

#[test]
fn test_reload_drops_vanished_dataset() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_datasets(&["USER.A", "USER.B", "USER.C"]);
    let ops = DataOps::new(Config::default(), api.clone())?;
    let deleted = deletion_counter(&ops);

    let query = RemoteQuery::batched(conn(), DsMask::new("USER.*"));
    ops.datasets().reload(&query, None);
    let before = ops.datasets().get_cached(&query).unwrap();
    let vanished = before[2].clone();

    api.set_datasets(&["USER.A", "USER.B"]);
    ops.datasets().reload(&query, None);

    let after = ops.datasets().get_cached(&query).unwrap();
    assert_eq!(names(&after), ["USER.A", "USER.B"]);
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
    assert!(!ops.file_system().is_valid(&vanished));
    assert!(ops.attributes().get_attributes(&vanished).is_none());
    Ok(())
}

#[test]
fn test_reload_drops_vanished_uss_file() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    let listing = |files: &[&str]| files.iter().map(|f| UssEntry::file(*f)).collect::<Vec<_>>();
    api.uss_dirs
        .lock()
        .unwrap()
        .insert("/u/user".into(), listing(&["a.txt", "b.txt", "c.txt"]));
    let ops = DataOps::new(Config::default(), api.clone())?;
    let deleted = deletion_counter(&ops);

    let query = RemoteQuery::unit(conn(), UssQuery::new("/u/user"));
    ops.uss().reload(&query, None);
    let before = ops.uss().get_cached(&query).unwrap();
    assert_eq!(before.len(), 3);
    let vanished = before
        .iter()
        .find(|f| f.name() == "c.txt")
        .cloned()
        .expect("c.txt listed");

    api.uss_dirs
        .lock()
        .unwrap()
        .insert("/u/user".into(), listing(&["a.txt", "b.txt"]));
    ops.uss().reload(&query, None);

    let after = ops.uss().get_cached(&query).unwrap();
    assert_eq!(after.len(), 2);
    assert!(!after.contains(&vanished));
    assert_eq!(deleted.load(Ordering::SeqCst), 1);
    assert!(ops.attributes().get_attributes(&vanished).is_none());
    Ok(())
}

#[test]
fn test_shared_dataset_keeps_other_requesters() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_datasets(&["USER.A", "USER.C"]);
    let ops = DataOps::new(Config::default(), api.clone())?;

    let first = RemoteQuery::batched(conn(), DsMask::new("USER.*"));
    let second = RemoteQuery::batched(other_conn(), DsMask::new("USER.*"));
    ops.datasets().reload(&first, None);
    ops.datasets().reload(&second, None);
    let shared = ops.datasets().get_cached(&first).unwrap()[1].clone();
    assert_eq!(ops.attributes().get_attributes(&shared).unwrap().requesters().len(), 2);

    api.set_datasets(&["USER.A"]);
    ops.datasets().clean_cache(&first, false);
    ops.datasets().reload(&first, None);

    assert!(ops.file_system().is_valid(&shared));
    let attributes = ops.attributes().get_attributes(&shared).unwrap();
    let requesters = attributes.requesters();
    assert_eq!(requesters.len(), 1);
    assert_eq!(requesters[0].connection, other_conn());
    Ok(())
}

#[test]
fn test_batched_listing_pages_through() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_datasets(&["USER.A", "USER.B", "USER.C", "USER.D", "USER.E"]);
    let mut config = Config::default();
    config.batch_size = 2;
    let ops = DataOps::new(config, api.clone())?;

    let query = RemoteQuery::batched(conn(), DsMask::new("USER.*"));
    ops.datasets().reload(&query, None);
    assert_eq!(names(&ops.datasets().get_cached(&query).unwrap()), ["USER.A", "USER.B"]);

    // A fresh but equal query resumes the stored cursor.
    let same = RemoteQuery::batched(conn(), DsMask::new("USER.*"));
    assert!(ops.datasets().load_more(&same, None));
    assert_eq!(api.calls_to(r#"list_datasets USER.* Some("USER.B") Some(3)"#), 1);
    assert!(ops.datasets().load_more(&query, None));
    assert_eq!(
        names(&ops.datasets().get_cached(&query).unwrap()),
        ["USER.A", "USER.B", "USER.C", "USER.D", "USER.E"]
    );

    assert!(!ops.datasets().load_more(&query, None));
    assert_eq!(api.calls_to("list_datasets"), 3);
    let cursor = query.progress().unwrap();
    assert_eq!(cursor.already_fetched, 5);
    assert!(!cursor.fetch_needed);
    Ok(())
}

#[test]
fn test_failed_listing_sets_error_state() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.missing.lock().unwrap().insert("/u/gone".into());
    let ops = DataOps::new(Config::default(), api.clone())?;
    let recorder = Recorder::<UssQuery>::new();
    ops.uss().subscribe(recorder.clone());

    let query = RemoteQuery::unit(conn(), UssQuery::new("/u/gone"));
    ops.uss().reload(&query, None);

    assert!(!ops.uss().is_cache_valid(&query));
    assert!(ops.uss().get_cached(&query).is_none());
    assert_eq!(
        ops.uss().get_fetched_error_message(&query).as_deref(),
        Some("No such file or directory.")
    );
    assert_eq!(recorder.kinds(), ["failed"]);

    api.missing.lock().unwrap().clear();
    api.uss_dirs
        .lock()
        .unwrap()
        .insert("/u/gone".into(), vec![UssEntry::file("back.txt")]);
    ops.uss().reload(&query, None);
    assert!(ops.uss().is_cache_valid(&query));
    assert!(ops.uss().get_fetched_error_message(&query).is_none());
    assert_eq!(ops.uss().get_cached(&query).unwrap().len(), 1);
    Ok(())
}

#[test]
fn test_cancelled_fetch_leaves_no_entry() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    let ops = DataOps::new(Config::default(), api.clone())?;
    let recorder = Recorder::<UssQuery>::new();
    ops.uss().subscribe(recorder.clone());

    let progress = Progress::new();
    progress.cancel();
    let query = RemoteQuery::unit(conn(), UssQuery::new("/u/user"));
    ops.uss().reload(&query, Some(&progress));

    assert_eq!(recorder.kinds(), ["cancelled"]);
    assert!(ops.uss().get_cached(&query).is_none());
    assert!(ops.uss().get_fetched_error_message(&query).is_none());
    assert!(ops.uss().is_cache_valid(&query));
    assert_eq!(api.calls_to("list_uss_path"), 0);
    Ok(())
}

#[test]
fn test_colliding_query_is_refreshed() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_datasets(&["USER.A1", "USER.B1"]);
    let ops = DataOps::new(Config::default(), api.clone())?;
    let recorder = Recorder::<DsMask>::new();
    ops.datasets().subscribe(recorder.clone());

    let wide = RemoteQuery::batched(conn(), DsMask::new("USER.*"));
    let narrow = RemoteQuery::batched(conn(), DsMask::new("USER.A*"));
    ops.datasets().reload(&wide, None);
    ops.datasets().reload(&narrow, None);

    let events = recorder.events.lock().unwrap();
    let order: Vec<_> = events.iter().map(|(kind, q)| (*kind, q.request.mask.clone())).collect();
    assert_eq!(
        order,
        [
            ("updated", "USER.*".to_string()),
            ("updated", "USER.A*".to_string()),
            ("updated", "USER.*".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn test_refresh_date_is_latest_node() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    let ops = DataOps::new(Config::default(), api)?;
    let query = RemoteQuery::unit(conn(), UssQuery::new("/u/user"));
    assert!(ops.uss().find_cache_refresh_date(&query).is_none());

    let earlier = chrono::Local::now() - chrono::Duration::minutes(5);
    let later = chrono::Local::now();
    ops.uss().apply_refresh_cache_date(&query, "left", later);
    ops.uss().apply_refresh_cache_date(&query, "right", earlier);
    assert_eq!(ops.uss().find_cache_refresh_date(&query), Some(later));
    Ok(())
}

#[test]
fn test_jobs_get_timestamps_from_log() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.jobs
        .lock()
        .unwrap()
        .push(JobInfo::new("TSU06062", "TESTJOB"));
    api.set_content("TESTJOB/TSU06062/1", JOB_LOG.as_bytes());
    api.spool_files.lock().unwrap().insert(
        "TSU06062".into(),
        vec![SpoolFileInfo::new(2, "JESMSGLG"), SpoolFileInfo::new(3, "JESJCL")],
    );
    let ops = DataOps::new(Config::default(), api.clone())?;

    let jobs = RemoteQuery::unit(conn(), JobsFilter::default());
    ops.jobs().reload(&jobs, None);
    let job = ops.jobs().get_cached(&jobs).unwrap()[0].clone();
    let attributes = ops.attributes().get_attributes(&job).unwrap();
    let info = &attributes.as_job().unwrap().info;
    assert_eq!(info.exec_started.as_deref(), Some("20 JUN 2023 19.45.23"));
    assert_eq!(info.exec_ended.as_deref(), Some("20 JUN 2023 20.09.29"));

    let spool = RemoteQuery::unit(conn(), JobQuery::new(job));
    ops.spool_files().reload(&spool, None);
    assert_eq!(ops.spool_files().get_cached(&spool).unwrap().len(), 2);
    Ok(())
}

#[test]
fn test_spool_listing_of_non_job_fails() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    let ops = DataOps::new(Config::default(), api.clone())?;
    let library = register_library(ops.attributes().as_ref(), "USER.LIB", &[conn()]);

    let query = RemoteQuery::unit(conn(), JobQuery::new(library.clone()));
    ops.spool_files().reload(&query, None);

    let message = ops.spool_files().get_fetched_error_message(&query).unwrap();
    assert!(message.contains("is not a job"), "{message}");
    assert_eq!(api.calls_to("list_spool_files"), 0);
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Succeed,
    Fail,
    Cancel,
    Clean,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Succeed),
        Just(Step::Fail),
        Just(Step::Cancel),
        Just(Step::Clean),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_cached_files_and_error_are_exclusive(steps in prop::collection::vec(step(), 1..12)) {
        let api = Arc::new(FakeZosmf::new());
        api.uss_dirs.lock().unwrap().insert("/u/user".into(), vec![UssEntry::file("a.txt")]);
        let ops = DataOps::new(Config::default(), api.clone()).unwrap();
        let query = RemoteQuery::unit(conn(), UssQuery::new("/u/user"));

        for step in steps {
            match step {
                Step::Succeed => {
                    api.missing.lock().unwrap().clear();
                    ops.uss().reload(&query, None);
                }
                Step::Fail => {
                    api.missing.lock().unwrap().insert("/u/user".into());
                    ops.uss().reload(&query, None);
                }
                Step::Cancel => {
                    let progress = Progress::new();
                    progress.cancel();
                    ops.uss().reload(&query, Some(&progress));
                }
                Step::Clean => ops.uss().clean_cache(&query, false),
            }
            let cached = ops.uss().get_cached(&query).is_some();
            let failed = ops.uss().get_fetched_error_message(&query).is_some();
            prop_assert!(!(cached && failed));
            prop_assert_eq!(ops.uss().is_cache_valid(&query), !failed);
        }
    }
}
