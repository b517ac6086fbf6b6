use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use kickstand_core::{
    ActivationEnvironment, ArchiveType, BootstrapError, InstallAction, LaunchConfig, PresenceKind,
    ProgressEvent, ProvisionableComponent, Transfer,
};

use super::*;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_root_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "kickstand-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let root = build_test_root_path(nanos);
    fs::create_dir_all(&root).expect("must create test root");
    root
}

fn test_layout(root: &Path) -> AppLayout {
    AppLayout::new(root, &LaunchConfig::default())
}

fn directory_component(id: &str, path: PathBuf) -> ProvisionableComponent {
    ProvisionableComponent {
        id: id.to_string(),
        path,
        kind: PresenceKind::Directory,
        action: InstallAction::CreateEnvironment,
    }
}

/// Serves each canned response to one connection, in order, then returns how
/// many connections it accepted. Write errors are ignored so a client that
/// hangs up early does not fail the server thread.
fn serve_responses(responses: Vec<Vec<u8>>) -> (String, std::thread::JoinHandle<usize>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("must bind test server");
    let address = listener.local_addr().expect("must read test server address");
    let url = format!("http://{address}/artifact.tar.gz");
    let handle = std::thread::spawn(move || {
        let mut served = 0;
        for response in responses {
            let (mut stream, _) = listener.accept().expect("must accept test client");
            let mut request_buffer = [0_u8; 1024];
            let _ = stream.read(&mut request_buffer);
            let _ = stream.write_all(&response);
            let _ = stream.flush();
            served += 1;
        }
        served
    });
    (url, handle)
}

fn ok_response(payload: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    )
    .into_bytes();
    response.extend_from_slice(payload);
    response
}

fn status_response(status: &str) -> Vec<u8> {
    format!("HTTP/1.1 {status}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").into_bytes()
}

fn sha256_hex(payload: &[u8]) -> String {
    use sha2::Digest;
    hex::encode(sha2::Sha256::digest(payload))
}

#[test]
fn build_test_root_path_disambiguates_same_timestamp_calls() {
    assert_ne!(build_test_root_path(7), build_test_root_path(7));
}

#[test]
fn join_relative_accepts_either_separator() {
    let root = Path::new("app");
    assert_eq!(
        join_relative(root, "venv/Scripts"),
        root.join("venv").join("Scripts")
    );
    assert_eq!(
        join_relative(root, "venv\\Lib\\site-packages"),
        root.join("venv").join("Lib").join("site-packages")
    );
    assert_eq!(join_relative(root, "./source/"), root.join("source"));
}

#[test]
fn layout_resolves_paths_against_root() {
    let root = PathBuf::from("app-root");
    let layout = test_layout(&root);

    assert_eq!(layout.source_dir(), root.join("source"));
    assert_eq!(layout.entry_script(), root.join("source").join("main.py"));
    assert_eq!(layout.runtime_dir(), root.join("python"));
    assert_eq!(layout.environment_dir(), root.join("venv"));
    assert_eq!(crash_log_path(layout.root()), root.join("crash.log"));
    assert_eq!(
        layout.state_path(),
        root.join(".kickstand").join("state.json")
    );
    assert_eq!(
        layout.download_path("python-3.10.11.tar.gz"),
        root.join("python-3.10.11.tar.gz")
    );
    assert_eq!(config_path(&root), root.join("kickstand.toml"));
}

#[test]
fn plan_orders_runtime_environment_then_packages() {
    let root = PathBuf::from("app-root");
    let mut config = LaunchConfig::default();
    config.packages = vec![kickstand_core::PackageConfig {
        name: "PyQt5".to_string(),
        url: "https://example.test/PyQt5.whl".to_string(),
        file_name: "PyQt5.whl".to_string(),
        marker: "venv/lib/PyQt5".to_string(),
        sha256: None,
    }];
    let layout = AppLayout::new(&root, &config);

    let plan = layout.plan(&config).expect("default plan must be valid");
    let ids = plan
        .components()
        .map(|component| component.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["runtime", "environment", "package:PyQt5"]);
    assert!(matches!(
        plan.runtime.action,
        InstallAction::ExtractArchive(_)
    ));
    assert_eq!(plan.environment.action, InstallAction::CreateEnvironment);
    assert_eq!(
        plan.packages[0].path,
        root.join("venv").join("lib").join("PyQt5")
    );
    let InstallAction::InstallPackage(artifact) = &plan.packages[0].action else {
        panic!("package must carry a wheel artifact");
    };
    assert_eq!(
        artifact.archive_type().expect("wheel must be recognized"),
        ArchiveType::Wheel
    );
}

#[test]
fn plan_rejects_package_marker_equal_to_environment_dir() {
    let mut config = LaunchConfig::default();
    config.packages = vec![kickstand_core::PackageConfig {
        name: "broken".to_string(),
        url: "https://example.test/broken.whl".to_string(),
        file_name: "broken.whl".to_string(),
        marker: "venv".to_string(),
        sha256: None,
    }];
    let layout = AppLayout::new("app-root", &config);

    let err = layout.plan(&config).expect_err("shared path must be rejected");
    assert!(matches!(err, BootstrapError::Configuration { .. }));
}

#[test]
fn load_launch_config_defaults_when_file_is_missing() {
    let root = test_root();
    let config = load_launch_config(&config_path(&root)).expect("missing config must default");
    assert_eq!(config, LaunchConfig::default());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn load_launch_config_reads_partial_file() {
    let root = test_root();
    fs::write(
        config_path(&root),
        "app_name = \"Demo\"\n[download]\nattempts = 3\n",
    )
    .expect("must write config");

    let config = load_launch_config(&config_path(&root)).expect("config must parse");
    assert_eq!(config.app_name, "Demo");
    assert_eq!(config.download.attempts, 3);
    assert_eq!(config.source_dir, "source");
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn load_launch_config_reports_path_on_invalid_file() {
    let root = test_root();
    fs::write(config_path(&root), "[download]\nattempts = 0\n").expect("must write config");

    let err = load_launch_config(&config_path(&root)).expect_err("zero attempts must fail");
    assert!(
        err.to_string().contains("kickstand.toml"),
        "unexpected error: {err}"
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn state_store_tracks_pending_then_installed() {
    let root = test_root();
    let store = StateStore::new(test_layout(&root).state_path());
    let runtime_dir = root.join("python");

    assert_eq!(store.status("runtime"), None);
    store
        .mark_pending("runtime", &runtime_dir)
        .expect("must mark pending");
    assert_eq!(store.status("runtime"), Some(ComponentStatus::Pending));
    store
        .mark_installed("runtime", &runtime_dir)
        .expect("must mark installed");
    assert_eq!(store.status("runtime"), Some(ComponentStatus::Installed));

    let record = store.load();
    assert_eq!(record.version, STATE_RECORD_VERSION);
    assert_eq!(record.components["runtime"].path, runtime_dir);
    assert!(
        !store.path().with_extension("json.tmp").exists(),
        "temporary state file must be renamed away"
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn state_store_ignores_corrupt_record() {
    let root = test_root();
    let store = StateStore::new(test_layout(&root).state_path());
    fs::create_dir_all(store.path().parent().expect("state path must have parent"))
        .expect("must create state dir");
    fs::write(store.path(), "{not json").expect("must write corrupt state");

    assert_eq!(store.load(), StateRecord::default());
    store
        .mark_installed("environment", &root.join("venv"))
        .expect("corrupt record must be overwritten");
    assert_eq!(store.status("environment"), Some(ComponentStatus::Installed));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn state_store_ignores_unknown_version() {
    let root = test_root();
    let store = StateStore::new(test_layout(&root).state_path());
    fs::create_dir_all(store.path().parent().expect("state path must have parent"))
        .expect("must create state dir");
    fs::write(
        store.path(),
        r#"{"version":99,"components":{"runtime":{"status":"installed","path":"python"}}}"#,
    )
    .expect("must write future state");

    assert_eq!(store.status("runtime"), None);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn probe_requires_directory_and_no_pending_record() {
    let root = test_root();
    let store = StateStore::new(test_layout(&root).state_path());
    let probe = EnvironmentProbe::new(store.clone());
    let component = directory_component("runtime", root.join("python"));

    assert!(!probe.exists(&component), "missing directory is absent");

    fs::write(&component.path, b"not a dir").expect("must write file fixture");
    assert!(!probe.exists(&component), "file is not a directory");
    fs::remove_file(&component.path).expect("must remove file fixture");

    fs::create_dir_all(&component.path).expect("must create runtime dir");
    assert!(probe.exists(&component), "unrecorded directory counts as present");

    store
        .mark_pending(&component.id, &component.path)
        .expect("must mark pending");
    assert!(
        !probe.exists(&component),
        "interrupted install must not count as present"
    );

    store
        .mark_installed(&component.id, &component.path)
        .expect("must mark installed");
    assert!(probe.exists(&component));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn path_has_kind_distinguishes_files() {
    let root = test_root();
    let file = root.join("marker");
    fs::write(&file, b"x").expect("must write marker");
    assert!(path_has_kind(&file, PresenceKind::File));
    assert!(!path_has_kind(&file, PresenceKind::Directory));
    assert!(path_has_kind(&root, PresenceKind::Directory));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn fs_utils_helpers_tolerate_missing_paths() {
    let root = test_root();
    remove_file_if_exists(&root.join("missing.bin")).expect("missing file is fine");
    remove_dir_if_exists(&root.join("missing-dir")).expect("missing dir is fine");
    probe_writable(&root).expect("temp dir must be writable");
    assert!(fs::read_dir(&root).expect("must list root").next().is_none());
    assert_eq!(
        part_path(Path::new("dl").join("python.tar.gz").as_path()),
        Path::new("dl").join("python.tar.gz.part")
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn download_streams_body_and_reports_progress() {
    let root = test_root();
    let payload = b"kickstand-download-known-total".to_vec();
    let (url, server) = serve_responses(vec![ok_response(&payload)]);
    let dest = root.join("python-3.10.11.tar.gz");
    let mut observed = Vec::new();

    let downloader = Downloader::new(1).expect("must build downloader");
    let mut sink = |event: ProgressEvent| {
        observed.push(event);
        Transfer::Continue
    };
    let bytes = downloader
        .download(&url, &dest, Some(sha256_hex(&payload).as_str()), &mut sink)
        .expect("download must succeed");

    assert_eq!(server.join().expect("server thread must join"), 1);
    assert_eq!(bytes, payload.len() as u64);
    assert_eq!(fs::read(&dest).expect("must read download"), payload);
    assert!(!part_path(&dest).exists(), "part file must be renamed away");
    assert_eq!(
        observed.first().copied(),
        Some(ProgressEvent::new(0, Some(payload.len() as u64)))
    );
    assert_eq!(
        observed.last().copied(),
        Some(ProgressEvent::new(
            payload.len() as u64,
            Some(payload.len() as u64)
        ))
    );
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn download_checksum_mismatch_leaves_no_file() {
    let root = test_root();
    let (url, server) = serve_responses(vec![ok_response(b"tampered")]);
    let dest = root.join("python.tar.gz");

    let downloader = Downloader::new(1).expect("must build downloader");
    let mut sink = |_event: ProgressEvent| Transfer::Continue;
    let err = downloader
        .download(&url, &dest, Some(sha256_hex(b"expected").as_str()), &mut sink)
        .expect_err("checksum mismatch must fail");

    server.join().expect("server thread must join");
    assert!(matches!(err, BootstrapError::ChecksumMismatch { .. }));
    assert!(!dest.exists());
    assert!(!part_path(&dest).exists());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn download_http_error_is_network_failure() {
    let root = test_root();
    let (url, server) = serve_responses(vec![status_response("404 Not Found")]);
    let dest = root.join("python.tar.gz");

    let downloader = Downloader::new(1).expect("must build downloader");
    let mut sink = |_event: ProgressEvent| Transfer::Continue;
    let err = downloader
        .download(&url, &dest, None, &mut sink)
        .expect_err("404 must fail");

    assert_eq!(server.join().expect("server thread must join"), 1);
    match err {
        BootstrapError::Network { message, .. } => {
            assert!(message.contains("404"), "unexpected message: {message}")
        }
        other => panic!("expected network error, got {other:?}"),
    }
    assert!(!dest.exists());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn download_retries_until_attempts_are_exhausted_or_success() {
    let root = test_root();
    let payload = b"kickstand-retry".to_vec();
    let (url, server) = serve_responses(vec![
        status_response("500 Internal Server Error"),
        status_response("503 Service Unavailable"),
        ok_response(&payload),
    ]);
    let dest = root.join("retry.tar.gz");

    let downloader = Downloader::new(3)
        .expect("must build downloader")
        .with_retry_delay(Duration::from_millis(1));
    let mut sink = |_event: ProgressEvent| Transfer::Continue;
    downloader
        .download(&url, &dest, None, &mut sink)
        .expect("third attempt must succeed");

    assert_eq!(server.join().expect("server thread must join"), 3);
    assert_eq!(fs::read(&dest).expect("must read download"), payload);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn download_abort_is_not_retried_and_cleans_up() {
    let root = test_root();
    let (url, server) = serve_responses(vec![ok_response(b"never wanted")]);
    let dest = root.join("aborted.tar.gz");

    let downloader = Downloader::new(5)
        .expect("must build downloader")
        .with_retry_delay(Duration::from_millis(1));
    let mut sink = |_event: ProgressEvent| Transfer::Abort;
    let err = downloader
        .download(&url, &dest, None, &mut sink)
        .expect_err("abort must stop the download");

    assert_eq!(server.join().expect("server thread must join"), 1);
    assert!(err.is_aborted());
    assert!(!dest.exists());
    assert!(!part_path(&dest).exists());
    let _ = fs::remove_dir_all(&root);
}

fn write_tar_gz(path: &Path) {
    let file = fs::File::create(path).expect("must create tar.gz");
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_size(0);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "python/bin/", std::io::empty())
        .expect("must append dir");

    let script = b"#!/bin/sh\nexit 0\n";
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, "python/bin/python3", script.as_slice())
        .expect("must append interpreter");

    let readme = b"runtime";
    let mut header = tar::Header::new_gnu();
    header.set_size(readme.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "python/README", readme.as_slice())
        .expect("must append readme");

    builder
        .into_inner()
        .expect("must finish tar")
        .finish()
        .expect("must finish gzip");
}

#[test]
fn extract_tar_gz_unpacks_into_destination() {
    let root = test_root();
    let archive = root.join("python-3.10.11.tar.gz");
    write_tar_gz(&archive);

    let entries =
        extract_archive_as(&archive, &root, ArchiveType::TarGz).expect("extraction must succeed");

    assert_eq!(entries, 3);
    assert_eq!(
        fs::read(root.join("python").join("README")).expect("must read readme"),
        b"runtime"
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(root.join("python").join("bin").join("python3"))
            .expect("must stat interpreter")
            .permissions()
            .mode();
        assert_ne!(mode & 0o111, 0, "interpreter must stay executable");
    }
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn extract_zip_restores_unix_modes() {
    let root = test_root();
    let archive = root.join("runtime.zip");
    {
        let file = fs::File::create(&archive).expect("must create zip");
        let mut writer = zip::ZipWriter::new(file);
        let executable = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        let plain = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
        writer
            .add_directory("tools/", executable)
            .expect("must add dir");
        writer
            .start_file("tools/run", executable)
            .expect("must start executable");
        writer.write_all(b"#!/bin/sh\n").expect("must write executable");
        writer
            .start_file("tools/notes.txt", plain)
            .expect("must start notes");
        writer.write_all(b"notes").expect("must write notes");
        writer.finish().expect("must finish zip");
    }

    let dest = root.join("out");
    extract_archive_as(&archive, &dest, ArchiveType::Zip).expect("extraction must succeed");

    assert_eq!(
        fs::read(dest.join("tools").join("notes.txt")).expect("must read notes"),
        b"notes"
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let run_mode = fs::metadata(dest.join("tools").join("run"))
            .expect("must stat executable")
            .permissions()
            .mode();
        let notes_mode = fs::metadata(dest.join("tools").join("notes.txt"))
            .expect("must stat notes")
            .permissions()
            .mode();
        assert_eq!(run_mode & 0o777, 0o755);
        assert_eq!(notes_mode & 0o111, 0);
    }
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn extract_zip_rejects_parent_traversal() {
    let root = test_root();
    let archive = root.join("evil.zip");
    {
        let file = fs::File::create(&archive).expect("must create zip");
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("../escaped.txt", zip::write::SimpleFileOptions::default())
            .expect("must start entry");
        writer.write_all(b"escaped").expect("must write entry");
        writer.finish().expect("must finish zip");
    }

    let dest = root.join("out");
    let err = extract_archive_as(&archive, &dest, ArchiveType::Zip)
        .expect_err("traversal must be rejected");

    assert!(matches!(err, BootstrapError::Extraction { .. }));
    assert!(!root.join("escaped.txt").exists());
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn extract_refuses_wheels() {
    let root = test_root();
    let wheel = root.join("PyQt5.whl");
    fs::write(&wheel, b"wheel").expect("must write wheel");

    assert!(matches!(
        extract_archive_as(&wheel, &root.join("out"), ArchiveType::Wheel),
        Err(BootstrapError::Extraction { .. })
    ));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn extract_corrupt_tar_gz_is_extraction_error() {
    let root = test_root();
    let archive = root.join("broken.tar.gz");
    fs::write(&archive, b"definitely not gzip").expect("must write archive");

    let err = extract_archive_as(&archive, &root.join("out"), ArchiveType::TarGz)
        .expect_err("corrupt archive must fail");
    assert!(matches!(err, BootstrapError::Extraction { .. }));
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn activation_prepends_environment_bin_dir_and_sets_markers() {
    let root = PathBuf::from("app-root");
    let config = LaunchConfig::default();
    let layout = AppLayout::new(&root, &config);
    let inherited = std::env::join_paths([PathBuf::from("first"), PathBuf::from("second")])
        .expect("must join paths");

    let activation =
        compute_activation_environment_with_path(&layout, &config.environment, Some(&inherited));

    let path = activation.get("PATH").expect("PATH must be set");
    let entries = std::env::split_paths(path).collect::<Vec<_>>();
    assert_eq!(
        entries,
        vec![
            layout.environment_bin_dir().to_path_buf(),
            PathBuf::from("first"),
            PathBuf::from("second"),
        ]
    );
    assert_eq!(
        activation.get("VIRTUAL_ENV"),
        Some(layout.environment_dir().as_os_str())
    );
    assert_eq!(
        activation.get("PIP_CONFIG_FILE"),
        Some(OsString::from(NULL_DEVICE).as_os_str())
    );
    assert_eq!(
        activation.get("HSA_OVERRIDE_GFX_VERSION"),
        Some(OsString::from("10.3.0").as_os_str())
    );
    for name in ["QT_PLUGIN_PATH", "PIP_INDEX_URL", "PYTHONPATH"] {
        assert!(activation.should_purge(name), "{name} must be purged");
    }
    assert!(!activation.should_purge("HOME"));
}

#[test]
fn activation_without_inherited_path_uses_bin_dir_alone() {
    let config = LaunchConfig::default();
    let layout = AppLayout::new("app-root", &config);

    let activation = compute_activation_environment_with_path(&layout, &config.environment, None);

    assert_eq!(
        activation.get("PATH"),
        Some(layout.environment_bin_dir().as_os_str())
    );
}

#[test]
fn apply_activation_purges_before_setting() {
    unsafe {
        std::env::set_var("KSAPPLY_STALE", "1");
        std::env::set_var("KSKEEP_X", "1");
    }
    let mut activation = ActivationEnvironment::new();
    activation.purge_prefix("KSAPPLY");
    activation.set("KSAPPLY_FRESH", "2");

    apply_activation_environment(&activation);

    let kept = std::env::var("KSKEEP_X");
    unsafe {
        std::env::remove_var("KSKEEP_X");
    }
    assert!(std::env::var_os("KSAPPLY_STALE").is_none());
    assert_eq!(std::env::var("KSAPPLY_FRESH").as_deref(), Ok("2"));
    assert_eq!(kept.as_deref(), Ok("1"), "unmatched variables must survive");
    unsafe {
        std::env::remove_var("KSAPPLY_FRESH");
    }
}

#[test]
fn environment_and_package_commands_use_expected_interpreters() {
    let config = LaunchConfig::default();
    let root = PathBuf::from("app-root");
    let layout = AppLayout::new(&root, &config);
    let activation = compute_activation_environment_with_path(&layout, &config.environment, None);

    let create = create_environment_command(&layout, &activation);
    assert_eq!(create.program(), layout.runtime_interpreter().as_os_str());
    assert_eq!(
        create.arguments(),
        [
            OsString::from("-m"),
            OsString::from("venv"),
            layout.environment_dir().as_os_str().to_os_string(),
        ]
    );

    let wheel = layout.download_path("PyQt5.whl");
    let install = install_package_command(&layout, &activation, &wheel);
    assert_eq!(install.program(), layout.environment_interpreter().as_os_str());
    assert_eq!(
        install.arguments(),
        [
            OsString::from("-m"),
            OsString::from("pip"),
            OsString::from("install"),
            wheel.as_os_str().to_os_string(),
        ]
    );
    assert_eq!(install.environment(), Some(&activation));
}

#[test]
fn command_spec_display_joins_program_and_args() {
    let spec = CommandSpec::new("python").args(["-m", "pip", "install", "x.whl"]);
    assert_eq!(spec.display(), "python -m pip install x.whl");
}

#[test]
fn resolve_reports_missing_program_as_not_found() {
    let err = CommandSpec::new("kickstand-definitely-missing-program")
        .resolve()
        .expect_err("missing program must not resolve");
    assert!(matches!(err, BootstrapError::NotFound { .. }));
}

#[cfg(unix)]
#[test]
fn resolve_searches_activation_path_first() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root();
    let bin = root.join("bin");
    fs::create_dir_all(&bin).expect("must create bin dir");
    let tool = bin.join("kickstand-fake-tool");
    fs::write(&tool, b"#!/bin/sh\nexit 0\n").expect("must write tool");
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).expect("must chmod tool");

    let mut activation = ActivationEnvironment::new();
    activation.set("PATH", bin.as_os_str());
    let resolved = CommandSpec::new("kickstand-fake-tool")
        .activated(&activation)
        .resolve()
        .expect("tool must resolve through activation PATH");

    assert_eq!(resolved, tool);
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn absolute_app_root_anchors_relative_roots_to_working_directory() {
    let cwd = std::env::current_dir().expect("must read working directory");

    let root = absolute_app_root(Path::new("app-root")).expect("root must resolve");

    assert!(root.is_absolute());
    assert_eq!(root, cwd.join("app-root"));
    let already = test_root();
    assert_eq!(
        absolute_app_root(&already).expect("absolute root must resolve"),
        already
    );
    let _ = fs::remove_dir_all(&already);
}

#[cfg(unix)]
#[test]
fn relative_root_interpreter_runs_from_its_own_working_directory() {
    use std::os::unix::fs::PermissionsExt;

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let relative = PathBuf::from(format!(
        "kickstand-relative-root-{}-{}",
        std::process::id(),
        nanos
    ));
    let config = LaunchConfig::default();
    let write_interpreter = |layout: &AppLayout| {
        let interpreter = layout.environment_interpreter();
        fs::create_dir_all(interpreter.parent().expect("interpreter must have a parent"))
            .expect("must create interpreter dir");
        fs::write(interpreter, b"#!/bin/sh\nexit 0\n").expect("must write interpreter");
        fs::set_permissions(interpreter, fs::Permissions::from_mode(0o755))
            .expect("must chmod interpreter");
    };

    let relative_layout = AppLayout::new(&relative, &config);
    write_interpreter(&relative_layout);
    let spec = CommandSpec::new(relative_layout.environment_interpreter())
        .current_dir(relative_layout.root());
    let resolved = spec.resolve();
    let relative_run = run_supervised(&spec);

    let absolute = absolute_app_root(&relative).expect("root must resolve");
    let absolute_layout = AppLayout::new(&absolute, &config);
    let absolute_run = run_supervised(
        &CommandSpec::new(absolute_layout.environment_interpreter())
            .current_dir(absolute_layout.root()),
    );
    let _ = fs::remove_dir_all(&relative);

    let cwd = std::env::current_dir().expect("must read working directory");
    assert_eq!(
        resolved.expect("relative interpreter must resolve"),
        cwd.join(relative_layout.environment_interpreter())
    );
    relative_run.expect("relative root child must spawn");
    absolute_run.expect("absolute root child must spawn");
}

#[cfg(target_os = "linux")]
#[test]
fn run_supervised_shares_launcher_stdin() {
    let Ok(expected) = fs::read_link("/proc/self/fd/0") else {
        return;
    };
    let root = test_root();
    let out = root.join("stdin-target");
    let spec = CommandSpec::new("sh").args([
        OsString::from("-c"),
        OsString::from("readlink /proc/self/fd/0 > \"$1\""),
        OsString::from("sh"),
        out.clone().into_os_string(),
    ]);

    run_supervised(&spec).expect("child must run");

    let seen = fs::read_to_string(&out).expect("must read child stdin target");
    let _ = fs::remove_dir_all(&root);
    assert_eq!(seen.trim_end(), expected.to_string_lossy());
}

#[cfg(unix)]
#[test]
fn run_supervised_captures_stderr_of_failing_child() {
    let spec = CommandSpec::new("sh").args(["-c", "printf boom >&2; exit 3"]);

    let err = run_supervised(&spec).expect_err("non-zero exit must fail");

    match &err {
        BootstrapError::ChildProcess { code, stderr, .. } => {
            assert_eq!(*code, Some(3));
            assert_eq!(stderr, "boom");
        }
        other => panic!("expected child process error, got {other:?}"),
    }
    assert_eq!(err.to_string(), "boom");
}

#[cfg(unix)]
#[test]
fn run_supervised_applies_activation_to_child() {
    unsafe {
        std::env::set_var("KSCHILD_STALE", "1");
    }
    let mut activation = ActivationEnvironment::new();
    activation.purge_prefix("KSCHILD");
    activation.set("KSCHILD_MARKER", "active");

    let spec = CommandSpec::new("sh")
        .args([
            "-c",
            "test -z \"$KSCHILD_STALE\" && test \"$KSCHILD_MARKER\" = active",
        ])
        .activated(&activation);
    let result = run_supervised(&spec);

    unsafe {
        std::env::remove_var("KSCHILD_STALE");
    }
    result.expect("child must see purged and activated environment");
    assert!(std::env::var_os("KSCHILD_MARKER").is_none());
}

#[cfg(unix)]
#[test]
fn launch_detached_starts_child_without_waiting() {
    let spec = CommandSpec::new("sh").args(["-c", "exit 0"]);

    let child = launch_detached(&spec).expect("launch must succeed");
    let status = child.wait().expect("must wait for child");
    assert!(status.success());
}

#[test]
fn crash_log_appends_entries_with_blank_separator() {
    let root = test_root();
    let log = CrashLog::new(crash_log_path(&root));

    log.append(&kickstand_core::CrashRecord::new("t1", "first failure"))
        .expect("must append first");
    let record = log
        .record_error(&BootstrapError::child_process(
            "python -m pip install x.whl",
            Some(1),
            "pip exploded\n".to_string(),
        ))
        .expect("must append second");

    let contents = fs::read_to_string(log.path()).expect("must read crash log");
    assert!(contents.starts_with("LAUNCHER t1\nfirst failure\n\nLAUNCHER "));
    assert!(contents.ends_with(
        "pip exploded\ncommand `python -m pip install x.whl` exited with status 1\n\n"
    ));
    assert_eq!(record.message, "pip exploded\n");
    let _ = fs::remove_dir_all(&root);
}

#[test]
fn timestamp_now_is_not_empty() {
    let stamp = timestamp_now();
    assert!(stamp.len() >= "2024-01-01 00:00:00.000 +0000".len(), "{stamp}");
}
