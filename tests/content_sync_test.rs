mod common;

use common::{conn, other_conn, register_library, wire, FakeZosmf, URL};
use mfsync::api::{DatasetInfo, DsMask, UssEntry};
use mfsync::attributes::{
    AttributesService, DatasetAttributes, FileAttributes, RequestOrigin, Requester,
};
use mfsync::content::Charset;
use mfsync::fetch::{FileFetchProvider, LibraryQuery, UssQuery};
use mfsync::sync::auto::SyncRejection;
use mfsync::sync::{AcceptRemote, AlwaysUpload, Document, DocumentSyncProvider, MemoryDocument};
use mfsync::vfs::FileSystem;
use mfsync::{Config, DataOps, FileHandle, RemoteQuery};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn member_setup(api: &Arc<FakeZosmf>, ops: &DataOps) -> FileHandle {
    api.set_members("USER.LIB", &["M1"]);
    let library = register_library(ops.attributes().as_ref(), "USER.LIB", &[conn()]);
    let query = RemoteQuery::batched(conn(), LibraryQuery::new(library));
    ops.members().reload(&query, None);
    ops.members().get_cached(&query).unwrap()[0].clone()
}

fn uss_setup(api: &Arc<FakeZosmf>, ops: &DataOps) -> FileHandle {
    api.uss_dirs.lock().unwrap().insert(
        "/u/user".into(),
        vec![UssEntry::directory(".."), UssEntry::file("a.txt")],
    );
    let query = RemoteQuery::unit(conn(), UssQuery::new("/u/user"));
    ops.uss().reload(&query, None);
    let files = ops.uss().get_cached(&query).unwrap();
    assert_eq!(files.len(), 1);
    files[0].clone()
}

#[test]
fn test_member_accepts_remote_change() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_content("USER.LIB(M1)", &wire("OLD\n"));
    let ops = DataOps::new(Config::default(), api.clone())?;
    let member = member_setup(&api, &ops);

    let sync = ops.synchronizer_for(&member).expect("member synchronizer");
    let doc = Arc::new(MemoryDocument::new());
    let provider = DocumentSyncProvider::new(member.clone(), doc.clone(), AcceptRemote);

    sync.synchronize_with_remote(&provider, None);
    assert_eq!(&doc.current_content()[..], b"OLD\n");
    assert_eq!(&sync.successful_content_storage(&provider)[..], b"OLD\n");

    api.set_content("USER.LIB(M1)", &wire("NEW\n"));
    sync.synchronize_with_remote(&provider, None);

    assert_eq!(&doc.current_content()[..], b"NEW\n");
    assert_eq!(&sync.successful_content_storage(&provider)[..], b"NEW\n");
    assert!(api.uploads.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_local_edit_is_uploaded() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_content("/u/user/a.txt", &wire("REMOTE\n"));
    api.uss_tags
        .lock()
        .unwrap()
        .insert("/u/user/a.txt".into(), "t IBM-1047    T=on  /u/user/a.txt".into());
    let ops = DataOps::new(Config::default(), api.clone())?;
    let file = uss_setup(&api, &ops);

    let sync = ops.synchronizer_for(&file).expect("uss synchronizer");
    let doc = Arc::new(MemoryDocument::new());
    let provider = DocumentSyncProvider::new(file.clone(), doc.clone(), AlwaysUpload);
    sync.synchronize_with_remote(&provider, None);
    assert_eq!(doc.encoding(), Some(Charset::new("IBM-1047")));

    doc.set_content(b"LOCAL\n");
    ops.content_changed(&file);
    assert!(sync.is_file_upload_needed(&provider));
    sync.synchronize_with_remote(&provider, None);

    assert_eq!(api.content("/u/user/a.txt"), Some(wire("LOCAL\n")));
    assert_eq!(&sync.successful_content_storage(&provider)[..], b"LOCAL\n");
    assert!(!sync.is_file_upload_needed(&provider));
    Ok(())
}

#[test]
fn test_unchanged_content_is_a_no_op() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_content("/u/user/a.txt", &wire("SAME"));
    let ops = DataOps::new(Config::default(), api.clone())?;
    let file = uss_setup(&api, &ops);

    let sync = ops.synchronizer_for(&file).unwrap();
    let doc = Arc::new(MemoryDocument::new());
    let provider = DocumentSyncProvider::new(file.clone(), doc.clone(), AlwaysUpload);
    sync.synchronize_with_remote(&provider, None);
    ops.content_changed(&file);
    sync.synchronize_with_remote(&provider, None);

    assert!(api.uploads.lock().unwrap().is_empty());
    assert_eq!(&doc.current_content()[..], b"SAME");
    assert!(!sync.is_file_upload_needed(&provider));
    Ok(())
}

#[test]
fn test_read_only_document_never_uploads() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_content("/u/user/a.txt", &wire("REMOTE"));
    let ops = DataOps::new(Config::default(), api.clone())?;
    let file = uss_setup(&api, &ops);

    let sync = ops.synchronizer_for(&file).unwrap();
    let doc = Arc::new(MemoryDocument::new());
    let provider = DocumentSyncProvider::new(file.clone(), doc.clone(), AlwaysUpload);
    sync.synchronize_with_remote(&provider, None);

    doc.set_read_only(true);
    doc.set_content(b"LOCAL");
    ops.content_changed(&file);
    sync.synchronize_with_remote(&provider, None);

    assert!(api.uploads.lock().unwrap().is_empty());
    assert_eq!(api.content("/u/user/a.txt"), Some(wire("REMOTE")));
    Ok(())
}

#[test]
fn test_second_requester_serves_after_first_fails() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_content("USER.SEQ", &wire("DATA"));
    api.break_connection(&other_conn());
    let ops = DataOps::new(Config::default(), api.clone())?;

    let mut info = DatasetInfo::new("USER.SEQ");
    info.volser = Some("VOL001".into());
    let requesters = vec![
        Requester::new(other_conn(), RequestOrigin::DatasetMask(DsMask::new("USER.*"))),
        Requester::new(conn(), RequestOrigin::DatasetMask(DsMask::new("USER.*"))),
    ];
    let file = ops
        .attributes()
        .get_or_create_virtual_file(FileAttributes::Dataset(DatasetAttributes::new(
            info, URL, requesters,
        )))
        .unwrap();

    let sync = ops.synchronizer_for(&file).expect("dataset synchronizer");
    let doc = Arc::new(MemoryDocument::new());
    let provider = DocumentSyncProvider::new(file, doc.clone(), AcceptRemote);
    sync.synchronize_with_remote(&provider, None);

    assert_eq!(&doc.current_content()[..], b"DATA");
    assert_eq!(api.calls_to("retrieve_dataset USER.SEQ via conn-2"), 1);
    assert_eq!(api.calls_to("retrieve_dataset USER.SEQ via conn-1"), 1);
    Ok(())
}

#[test]
fn test_fetch_failure_reaches_provider() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    let ops = DataOps::new(Config::default(), api.clone())?;
    let member = member_setup(&api, &ops);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let doc = Arc::new(MemoryDocument::new());
    let provider = DocumentSyncProvider::new(member.clone(), doc.clone(), AcceptRemote)
        .on_throwable_handler(move |_, e| sink.lock().unwrap().push(e.display_message()));

    ops.synchronizer_for(&member)
        .unwrap()
        .synchronize_with_remote(&provider, None);

    assert_eq!(*errors.lock().unwrap(), vec!["No such file or directory.".to_string()]);
    assert!(doc.current_content().is_empty());
    Ok(())
}

#[test]
fn test_auto_sync_uploads_after_edit() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_content("/u/user/a.txt", &wire("REMOTE"));
    let mut config = Config::default();
    config.auto_sync = true;
    config.queue.throttle_ms = 0;
    let ops = DataOps::new(config, api.clone())?;
    let file = uss_setup(&api, &ops);

    let doc = Arc::new(MemoryDocument::new());
    let provider = Arc::new(DocumentSyncProvider::new(file.clone(), doc.clone(), AlwaysUpload));
    ops.start_sync(provider.clone())?;
    assert!(wait_for(|| &doc.current_content()[..] == b"REMOTE"));
    assert_eq!(ops.start_sync(provider), Err(SyncRejection::AlreadySynced));

    doc.set_content(b"EDITED");
    ops.content_changed(&file);
    assert!(wait_for(|| api.content("/u/user/a.txt") == Some(wire("EDITED"))));

    ops.file_system().delete(&file)?;
    assert!(!ops.auto_sync().is_already_synced(&file));
    ops.shutdown();
    Ok(())
}

#[test]
fn test_disabled_auto_sync_only_seeds() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    api.set_content("/u/user/a.txt", &wire("REMOTE"));
    let mut config = Config::default();
    config.queue.throttle_ms = 0;
    let ops = DataOps::new(config, api.clone())?;
    let file = uss_setup(&api, &ops);

    let doc = Arc::new(MemoryDocument::new());
    let provider = Arc::new(DocumentSyncProvider::new(file.clone(), doc.clone(), AlwaysUpload));
    ops.start_sync(provider)?;
    assert!(wait_for(|| &doc.current_content()[..] == b"REMOTE"));

    doc.set_content(b"EDITED");
    ops.content_changed(&file);
    std::thread::sleep(Duration::from_millis(100));

    assert!(api.uploads.lock().unwrap().is_empty());
    ops.shutdown();
    Ok(())
}

#[test]
fn test_directories_are_not_synced() -> anyhow::Result<()> {
    let api = Arc::new(FakeZosmf::new());
    let ops = DataOps::new(Config::default(), api.clone())?;
    let library = register_library(ops.attributes().as_ref(), "USER.LIB", &[conn()]);

    let provider = Arc::new(DocumentSyncProvider::new(
        library.clone(),
        Arc::new(MemoryDocument::new()),
        AcceptRemote,
    ));
    assert_eq!(ops.start_sync(provider), Err(SyncRejection::Directory));
    assert!(ops.synchronizer_for(&library).is_none());
    Ok(())
}
