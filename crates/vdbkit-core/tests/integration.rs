use parking_lot::Mutex;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use vdbkit_core::mock::{MockBuilder, MockWorkspace};
use vdbkit_core::{
    Archive, ArchiveEvent, ArchiveOptions, CancelToken, ChangeListener, CoreError, DataRole,
    EventKind, ImportVdbEntry, ModelDescriptor, NullProgress, Permission, SyncState,
    TranslatorOverride,
};
use vdbkit_schema::{ImportName, ModelType, RoleName, TranslatorName};

struct Env {
    dir: tempfile::TempDir,
    ws: Arc<MockWorkspace>,
}

impl Env {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            ws: Arc::new(MockWorkspace::new()),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.path().join("sales.vdb")
    }

    fn options(&self) -> ArchiveOptions {
        ArchiveOptions::new(self.dir.path().join("state")).with_workspace(self.ws.clone())
    }

    fn open(&self) -> Archive {
        Archive::open(self.path(), self.options()).unwrap()
    }
}

fn zip_member(path: &Path, name: &str) -> Option<String> {
    let mut zip = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
    let mut member = zip.by_name(name).ok()?;
    let mut text = String::new();
    member.read_to_string(&mut text).unwrap();
    Some(text)
}

fn recorder(log: &Arc<Mutex<Vec<EventKind>>>) -> Arc<dyn ChangeListener> {
    let log = Arc::clone(log);
    Arc::new(move |e: &ArchiveEvent| log.lock().push(e.kind))
}

// Scenario A: new archive, one model, save.
#[test]
fn new_archive_with_model_saves_manifest() {
    let env = Env::new();
    let archive = Archive::open(env.path(), ArchiveOptions::new(env.dir.path().join("state")))
        .unwrap();
    archive.add_model_entry("a.xmi").unwrap();
    assert!(archive.is_modified());

    archive.save(&NullProgress).unwrap();
    assert!(!archive.is_modified());

    let manifest = zip_member(&env.path(), "META-INF/vdb.xml").expect("manifest present");
    assert_eq!(manifest.matches("<model ").count(), 1);
    assert!(manifest.contains("name=\"a.xmi\""));
}

// Scenario B: removing the only model that required an import drops it.
#[test]
fn removing_model_drops_its_imports() {
    let env = Env::new();
    let archive = env.open();
    let model = archive.add_model_entry("modelA.xmi").unwrap();
    archive
        .register_import_vdbs(&["vdbX"], "modelA.xmi", &NullProgress)
        .unwrap();
    assert!(archive.import_vdb("vdbX").is_some());

    assert!(archive.remove_entry(model));
    assert!(archive
        .import_vdb_entries()
        .iter()
        .all(|i| i.name() != "vdbX"));
}

// Scenario C: query timeout survives save and reload.
#[test]
fn query_timeout_round_trips_through_disk() {
    let env = Env::new();
    let archive = env.open();
    archive.set_query_timeout(30);
    archive.save(&NullProgress).unwrap();
    archive.close();

    let reloaded = env.open();
    assert_eq!(reloaded.query_timeout(), 30);
    assert_eq!(reloaded.query_timeout_millis(), 30_000);
    assert!(!reloaded.is_modified());
}

#[test]
fn zero_timeout_is_unset_after_reload() {
    let env = Env::new();
    let archive = env.open();
    archive.set_query_timeout(5);
    archive.set_query_timeout(0);
    archive.save(&NullProgress).unwrap();
    let manifest = zip_member(&env.path(), "META-INF/vdb.xml").unwrap();
    assert!(!manifest.contains("query-timeout"));
    assert_eq!(env.open().query_timeout(), 0);
}

// Scenario D: a removed listener hears nothing.
#[test]
fn removed_listener_receives_nothing() {
    let env = Env::new();
    let archive = env.open();
    let log = Arc::new(Mutex::new(Vec::new()));
    let listener = recorder(&log);
    assert!(archive.add_listener(Arc::clone(&listener)));
    assert!(archive.remove_listener(&listener));

    archive.add_entry("docs/a.txt").unwrap();
    archive.set_description(Some("changed"));
    assert!(log.lock().is_empty());
}

#[test]
fn events_arrive_in_registration_order() {
    let env = Env::new();
    let archive = env.open();
    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        archive.add_listener(Arc::new(move |_: &ArchiveEvent| order.lock().push(tag)));
    }
    archive.set_description(Some("x"));
    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[test]
fn round_trip_preserves_every_collection() {
    let env = Env::new();
    env.ws.put_file("proj/Orders.xmi", b"<orders/>");
    env.ws.put_file("otherFiles/notes.txt", b"notes");
    let mut desc = ModelDescriptor::new(ModelType::Physical);
    desc.source.name = Some("orders".to_owned());
    desc.source.translator = Some("ora".to_owned());
    desc.source.jndi_name = Some("java:/orders".to_owned());
    env.ws.set_model("proj/Orders.xmi", desc);

    let archive = env.open();
    archive.set_description(Some("Sales archive"));
    archive.set_query_timeout(12);
    archive.add_model_entry("proj/Orders.xmi").unwrap();
    archive.add_entry("otherFiles/notes.txt").unwrap();
    archive
        .register_import_vdbs(&["Inventory"], "proj/Orders.xmi", &NullProgress)
        .unwrap();
    archive
        .import_vdb("Inventory")
        .unwrap()
        .set_version(4)
        .unwrap();
    archive.add_translator(
        TranslatorOverride::new(TranslatorName::parse("ora").unwrap(), "oracle")
            .with_property("MaxResultRows", "500"),
    );
    archive.add_data_policy(
        DataRole::new(RoleName::parse("readers").unwrap())
            .with_permission(Permission::read_only("Orders"))
            .with_mapped_role("staff"),
    );
    archive.synchronize(&NullProgress).unwrap();
    archive.save(&NullProgress).unwrap();
    archive.close();

    let back = env.open();
    assert_eq!(back.description().as_deref(), Some("Sales archive"));
    assert_eq!(back.version(), 1);
    assert_eq!(back.query_timeout(), 12);

    let model = back.model_entry("proj/Orders.xmi").unwrap();
    let settings = model.settings();
    assert_eq!(settings.model_type, ModelType::Physical);
    assert_eq!(settings.jndi_name.as_deref(), Some("java:/orders"));
    assert!(settings.import_vdbs.contains("Inventory"));
    assert_eq!(model.sync_state(), SyncState::Synchronized);

    assert_eq!(back.user_file_entries().len(), 1);
    assert_eq!(back.import_vdb("Inventory").unwrap().version(), 4);
    assert_eq!(
        back.translator("ora").unwrap().property("MaxResultRows").as_deref(),
        Some("500")
    );
    let role = back.data_policy("readers").unwrap();
    assert!(role.permissions[0].allow_read);
    assert_eq!(role.mapped_role_names, vec!["staff".to_owned()]);
    assert!(back.import_tracker().is_required("Inventory"));
    assert!(back.is_synchronized());

    let payload = back.working_dir().payload_path("proj/Orders.xmi");
    assert_eq!(fs::read(payload).unwrap(), b"<orders/>");
}

#[test]
fn description_doubles_as_zip_comment() {
    let env = Env::new();
    let archive = env.open();
    archive.set_description(Some("commented"));
    archive.save(&NullProgress).unwrap();
    let zip = zip::ZipArchive::new(fs::File::open(env.path()).unwrap()).unwrap();
    assert_eq!(zip.comment(), b"commented");
}

#[test]
fn add_twice_returns_same_instance() {
    let env = Env::new();
    let archive = env.open();
    let a = archive.add_model_entry("m.xmi").unwrap();
    let b = archive.add_model_entry("/m.xmi").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(archive.model_entries().len(), 1);
}

#[test]
fn model_synchronized_only_on_first_add() {
    let env = Env::new();
    let builder = Arc::new(MockBuilder::new());
    env.ws.put_file("m.xmi", b"v1");
    let archive = Archive::open(env.path(), env.options().with_builder(builder)).unwrap();
    let model = archive.add_model_entry("m.xmi").unwrap();
    let first = model.checksum();

    env.ws.put_file("m.xmi", b"v2");
    archive.add_model_entry("m.xmi").unwrap();
    assert_eq!(model.checksum(), first);
}

#[test]
fn every_mutation_marks_modified() {
    let env = Env::new();
    let archive = env.open();
    archive.save(&NullProgress).unwrap();

    let mutations: Vec<Box<dyn Fn(&Archive)>> = vec![
        Box::new(|a| {
            a.add_entry("x.txt").unwrap();
        }),
        Box::new(|a| {
            let e = a.file_entry("x.txt").unwrap();
            a.remove_entry(e);
        }),
        Box::new(|a| {
            a.add_translator(TranslatorOverride::new(
                TranslatorName::parse("t").unwrap(),
                "jdbc",
            ));
        }),
        Box::new(|a| a.set_description(Some("new"))),
        Box::new(|a| a.set_query_timeout(9)),
        Box::new(|a| {
            a.add_import_vdb(ImportVdbEntry::new(ImportName::parse("I").unwrap()));
        }),
    ];
    for mutate in mutations {
        mutate(&archive);
        assert!(archive.is_modified());
        archive.save(&NullProgress).unwrap();
        assert!(!archive.is_modified());
    }
}

#[test]
fn shared_import_survives_until_last_model() {
    let env = Env::new();
    let archive = env.open();
    let m1 = archive.add_model_entry("m1.xmi").unwrap();
    let m2 = archive.add_model_entry("m2.xmi").unwrap();
    archive
        .register_import_vdbs(&["X"], "m1.xmi", &NullProgress)
        .unwrap();
    archive
        .register_import_vdbs(&["X"], "m2.xmi", &NullProgress)
        .unwrap();

    archive.remove_entry(m1);
    assert!(archive.import_vdb("X").is_some());
    archive.remove_entry(m2);
    assert!(archive.import_vdb("X").is_none());
}

#[test]
fn unregistering_shared_import_keeps_it() {
    let env = Env::new();
    let archive = env.open();
    archive
        .register_import_vdbs(&["X", "Y"], "m1.xmi", &NullProgress)
        .unwrap();
    archive
        .register_import_vdbs(&["X"], "m2.xmi", &NullProgress)
        .unwrap();
    let changes = archive
        .register_import_vdbs(&[], "m1.xmi", &NullProgress)
        .unwrap();
    assert_eq!(changes.removed, vec![ImportName::parse("Y").unwrap()]);
    assert!(archive.import_vdb("X").is_some());
}

#[test]
fn reload_compares_payloads_against_workspace() {
    let env = Env::new();
    env.ws.put_file("a.txt", b"v1");
    env.ws.put_file("b.txt", b"v1");
    let archive = env.open();
    archive.add_entry("a.txt").unwrap();
    archive.add_entry("b.txt").unwrap();
    archive.synchronize(&NullProgress).unwrap();
    archive.save(&NullProgress).unwrap();
    archive.close();

    env.ws.put_file("b.txt", b"v2");
    let back = env.open();
    assert_eq!(
        back.file_entry("a.txt").unwrap().sync_state(),
        SyncState::Synchronized
    );
    assert_eq!(
        back.file_entry("b.txt").unwrap().sync_state(),
        SyncState::NotSynchronized
    );
    assert!(!back.is_synchronized());

    let report = back.synchronize(&NullProgress).unwrap();
    assert_eq!(report.refreshed, 1);
    assert!(back.is_synchronized());
    assert!(back.is_modified());
}

#[test]
fn failed_save_leaves_live_file_untouched() {
    let env = Env::new();
    env.ws.put_file("a.txt", b"a");
    let archive = env.open();
    archive.add_entry("a.txt").unwrap();
    archive.synchronize(&NullProgress).unwrap();
    archive.save(&NullProgress).unwrap();
    let before = fs::read(env.path()).unwrap();

    archive.set_description(Some("never written"));
    let token = CancelToken::new();
    token.cancel();
    assert!(matches!(archive.save(&token), Err(CoreError::Cancelled)));
    assert_eq!(fs::read(env.path()).unwrap(), before);
    assert!(archive.is_modified());

    let leftovers: Vec<_> = fs::read_dir(env.dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn corrupt_archive_fails_to_load() {
    let env = Env::new();
    fs::write(env.path(), b"definitely not a zip").unwrap();
    assert!(Archive::open(env.path(), env.options()).is_err());
}

#[test]
fn schema_invalid_manifest_is_format_error() {
    let env = Env::new();
    {
        let file = fs::File::create(env.path()).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("META-INF/vdb.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        std::io::Write::write_all(&mut zip, b"<vdb name=\"\" version=\"0\"/>").unwrap();
        zip.finish().unwrap();
    }
    let err = Archive::open(env.path(), env.options()).unwrap_err();
    assert!(matches!(err, CoreError::Format(_)));
}

#[test]
fn saved_event_follows_save() {
    let env = Env::new();
    let archive = env.open();
    let log = Arc::new(Mutex::new(Vec::new()));
    archive.add_listener(recorder(&log));
    archive.add_entry("a.txt").unwrap();
    archive.save(&NullProgress).unwrap();
    assert_eq!(*log.lock(), vec![EventKind::EntryAdded, EventKind::Saved]);
}

#[test]
fn readers_see_consistent_snapshots_during_mutation() {
    let env = Env::new();
    let archive = Arc::new(env.open());
    let stop = Arc::new(AtomicUsize::new(0));

    let reader = {
        let archive = Arc::clone(&archive);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut observed = 0usize;
            while stop.load(Ordering::SeqCst) == 0 {
                let snapshot = archive.file_entries();
                let mut names: Vec<_> = snapshot.iter().map(|e| e.name().to_string()).collect();
                let len = names.len();
                names.sort();
                names.dedup();
                assert_eq!(names.len(), len);
                observed = observed.max(len);
                let _ = archive.is_synchronized();
                let _ = archive.is_modified();
            }
            observed
        })
    };

    for i in 0..200 {
        let name = format!("f/{i}.txt");
        archive.add_entry(&name).unwrap();
        if i % 2 == 0 {
            let entry = archive.file_entry(&name).unwrap();
            archive.remove_entry(entry);
        }
    }
    stop.store(1, Ordering::SeqCst);
    let observed = reader.join().unwrap();
    assert!(observed <= 101);
    assert_eq!(archive.file_entries().len(), 100);
}

#[test]
fn close_deletes_working_directory() {
    let env = Env::new();
    env.ws.put_file("a.txt", b"a");
    let archive = env.open();
    archive.add_entry("a.txt").unwrap();
    archive.synchronize(&NullProgress).unwrap();
    let root = archive.working_dir().root().to_path_buf();
    assert!(root.exists());
    archive.close();
    assert!(!root.exists());
}

#[test]
fn model_files_point_into_working_dir() {
    let env = Env::new();
    env.ws.put_file("p/a.xmi", b"a");
    let archive = env.open();
    archive.add_model_entry("p/a.xmi").unwrap();
    let files = archive.model_files();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with(archive.working_dir().root()));
    assert_eq!(fs::read(&files[0]).unwrap(), b"a");
}

#[test]
fn free_text_whitespace_survives_reload() {
    let env = Env::new();
    let archive = env.open();
    archive.set_description(Some("  padded\n"));
    archive.add_data_policy(
        DataRole::new(RoleName::parse("readers").unwrap()).with_mapped_role(" spaced "),
    );
    archive.save(&NullProgress).unwrap();
    archive.close();

    let back = env.open();
    assert_eq!(back.description().as_deref(), Some("  padded\n"));
    let role = back.data_policy("readers").unwrap();
    assert_eq!(role.mapped_role_names, vec![" spaced ".to_owned()]);
}

#[cfg(unix)]
#[test]
fn unmodified_save_leaves_file_in_place() {
    use std::os::unix::fs::MetadataExt;

    let env = Env::new();
    let archive = env.open();
    archive.set_description(Some("once"));
    archive.save(&NullProgress).unwrap();
    let before = fs::metadata(env.path()).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    archive.add_listener(recorder(&log));
    archive.save(&NullProgress).unwrap();
    let after = fs::metadata(env.path()).unwrap();
    assert_eq!(before.ino(), after.ino());
    assert!(log.lock().is_empty());

    archive.set_description(Some("twice"));
    archive.save(&NullProgress).unwrap();
    assert_ne!(fs::metadata(env.path()).unwrap().ino(), before.ino());
}

#[test]
fn unmodified_fresh_archive_still_saves() {
    let env = Env::new();
    let archive = env.open();
    assert!(!archive.is_modified());
    archive.save(&NullProgress).unwrap();
    assert!(zip_member(&env.path(), "META-INF/vdb.xml").is_some());
}

#[test]
fn failed_load_discards_extracted_payloads() {
    let env = Env::new();
    {
        let file = fs::File::create(env.path()).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("big/payload.bin", options).unwrap();
        std::io::Write::write_all(&mut zip, &[7u8; 4096]).unwrap();
        zip.start_file("META-INF/vdb.xml", options).unwrap();
        std::io::Write::write_all(&mut zip, b"<vdb name=\"x\" version=\"0\"/>").unwrap();
        zip.finish().unwrap();
    }
    let err = Archive::open(env.path(), env.options()).unwrap_err();
    assert!(matches!(err, CoreError::Format(_)));

    let work = vdbkit_store::StateLayout::new(env.dir.path().join("state"))
        .working_dir(&env.path())
        .unwrap();
    assert!(!work.has_payload("big/payload.bin"));
}
