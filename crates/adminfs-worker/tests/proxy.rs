//! Worker proxy against an in-process helper.

use adminfs_authorization::testing::ScriptedAuthority;
use adminfs_authorization::{AuthorityAnswer, AuthorizationDebounce, AuthorizationGate};
use adminfs_core::{AdminConfig, AdminError, CallerId, ErrorCode, JobFlags, Locator, OpenMode};
use adminfs_helper::{Dispatcher, LocalBus};
use adminfs_worker::testing::{HostEvent, RecordingHost};
use adminfs_worker::WorkerProxy;
use assert_matches::assert_matches;
use proptest::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const MIB: usize = 1024 * 1024;

fn gate(authority: &Arc<ScriptedAuthority>, config: &AdminConfig) -> AuthorizationGate {
    AuthorizationGate::new(authority.clone(), config.action_id.as_str())
}

fn proxy_with(authority: &Arc<ScriptedAuthority>, config: AdminConfig) -> WorkerProxy {
    let config = Arc::new(config);
    let dispatcher = Dispatcher::new(gate(authority, &config), config.clone());
    let (bus, _service) = LocalBus::spawn(dispatcher, config.max_message_size);
    WorkerProxy::new(
        Arc::new(bus),
        CallerId::new(":1.42"),
        AuthorizationDebounce::new(config.honor_window()),
        config,
    )
}

fn allowing() -> WorkerProxy {
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::Yes));
    proxy_with(&authority, AdminConfig::default())
}

fn url(path: &Path) -> Locator {
    Locator::from_path(path).unwrap()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[tokio::test(start_paused = true)]
async fn denied_listing_is_honored_for_the_window() {
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::No));
    let proxy = proxy_with(&authority, AdminConfig::default());
    let host = RecordingHost::new();
    let root = Locator::parse("admin:///root").unwrap();

    let first = proxy.list_dir(root.clone(), &host).await.unwrap_err();
    assert!(first.is_access_denied());
    assert_eq!(authority.calls(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let second = proxy.list_dir(root.clone(), &host).await.unwrap_err();
    assert!(second.is_access_denied());
    assert_eq!(authority.calls(), 1, "second listing must reuse the denial");

    tokio::time::advance(Duration::from_secs(10)).await;
    let third = proxy.list_dir(root, &host).await.unwrap_err();
    assert!(third.is_access_denied());
    assert_eq!(authority.calls(), 2, "an expired denial prompts again");
}

#[tokio::test]
async fn writes_are_never_debounced() {
    let dir = tempfile::tempdir().unwrap();
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::No));
    let proxy = proxy_with(&authority, AdminConfig::default());
    let host = RecordingHost::new();

    for _ in 0..2 {
        let err = proxy
            .put(url(&dir.path().join("x")), None, JobFlags::NONE, &host)
            .await
            .unwrap_err();
        assert!(err.is_access_denied());
    }
    assert_eq!(authority.calls(), 2);
}

#[tokio::test]
async fn bad_parameters_surface_as_a_generic_failure() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = allowing();
    let err = proxy
        .chmod(url(dir.path()), 0o17777, &RecordingHost::new())
        .await
        .unwrap_err();
    assert_matches!(err, AdminError::Transport { .. });
}

#[tokio::test]
async fn listing_and_stat_reach_the_host() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("passwd"), "root:x:0:0\n").unwrap();
    std::fs::create_dir(dir.path().join("sudoers.d")).unwrap();
    let proxy = allowing();

    let host = RecordingHost::new();
    proxy.list_dir(url(dir.path()), &host).await.unwrap();
    let mut names: Vec<String> = host.entries().into_iter().map(|e| e.name).collect();
    names.sort();
    assert_eq!(names, vec![".", "passwd", "sudoers.d"]);

    let host = RecordingHost::new();
    proxy
        .stat(url(&dir.path().join("passwd")), &host)
        .await
        .unwrap();
    let stats = host.stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].size, 11);
    assert!(!stats[0].is_dir());
}

#[tokio::test]
async fn get_splits_content_into_messages() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blob.bin");
    let content = pattern(100_000);
    std::fs::write(&path, &content).unwrap();
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::Yes));
    let proxy = proxy_with(
        &authority,
        AdminConfig {
            max_message_size: 4096,
            transfer_chunk_size: 4096,
            ..AdminConfig::default()
        },
    );

    let host = RecordingHost::new();
    proxy.get(url(&path), &host).await.unwrap();

    assert!(host.blobs().iter().all(|b| !b.is_empty() && b.len() <= 4096));
    assert_eq!(host.received(), content);
    assert!(host
        .events()
        .iter()
        .any(|e| matches!(e, HostEvent::MimeType(_))));
}

#[tokio::test]
async fn get_of_a_large_file_stays_under_one_mebibyte_per_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("image.raw");
    let content = pattern(3 * MIB + 17);
    std::fs::write(&path, &content).unwrap();
    let proxy = allowing();

    let host = RecordingHost::new();
    proxy.get(url(&path), &host).await.unwrap();
    assert!(host.blobs().iter().all(|b| b.len() <= MIB));
    assert_eq!(host.received().len(), content.len());
    assert_eq!(host.received(), content);
}

#[tokio::test]
async fn put_three_chunks_with_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sysctl.conf");
    std::fs::write(&path, "stale contents, much longer than what replaces them").unwrap();
    let proxy = allowing();

    let host = RecordingHost::with_chunks(["net.ipv4.", "ip_forward", " = 1\n"]);
    proxy
        .put(url(&path), Some(0o644), JobFlags::OVERWRITE, &host)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"net.ipv4.ip_forward = 1\n");
    assert_eq!(
        std::fs::metadata(&path).unwrap().permissions().mode() & 0o777,
        0o644
    );
    let requests = host
        .events()
        .iter()
        .filter(|e| **e == HostEvent::DataRequested)
        .count();
    assert_eq!(requests, 4);
}

#[tokio::test]
async fn put_of_a_chunk_larger_than_the_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big");
    let chunk = pattern(600_000);
    let proxy = allowing();

    let host = RecordingHost::with_chunks([chunk.clone()]);
    proxy
        .put(url(&path), None, JobFlags::NONE, &host)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), chunk);
}

#[tokio::test]
async fn cancelled_host_gets_a_cancelled_download() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge");
    std::fs::write(&path, pattern(8 * MIB)).unwrap();
    let proxy = allowing();

    let host = RecordingHost::new();
    host.kill();
    let err = proxy.get(url(&path), &host).await.unwrap_err();
    assert!(err.is_cancelled(), "{err:?}");
    assert!(host.received().len() < 8 * MIB);
}

#[tokio::test]
async fn cancelled_host_never_sees_success_from_unkillable_commands() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("made");
    let file = dir.path().join("secret");
    std::fs::write(&file, "s").unwrap();
    let proxy = allowing();

    let host = RecordingHost::new();
    host.kill();
    let err = proxy.mkdir(url(&target), None, &host).await.unwrap_err();
    assert!(err.is_cancelled());
    // The command itself still ran to completion.
    assert!(target.is_dir());

    let err = proxy.stat(url(&file), &host).await.unwrap_err();
    assert!(err.is_cancelled());
    let err = proxy.chmod(url(&file), 0o600, &host).await.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(
        std::fs::metadata(&file).unwrap().permissions().mode() & 0o777,
        0o600
    );
}

#[tokio::test]
async fn refused_start_leaves_no_command_behind() {
    let dir = tempfile::tempdir().unwrap();
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::No));
    let config = Arc::new(AdminConfig::default());
    let dispatcher = Dispatcher::new(gate(&authority, &config), config.clone());
    let registry = dispatcher.registry().clone();
    let (bus, _service) = LocalBus::spawn(dispatcher, config.max_message_size);
    let proxy = WorkerProxy::new(
        Arc::new(bus),
        CallerId::new(":1.42"),
        AuthorizationDebounce::new(config.honor_window()),
        config,
    );
    let host = RecordingHost::new();

    authority.push(AuthorityAnswer::Yes);
    let err = proxy.stat(url(dir.path()), &host).await.unwrap_err();
    assert!(err.is_access_denied());
    assert!(registry.is_empty());

    authority.push(AuthorityAnswer::Yes);
    let err = proxy.del(url(dir.path()), &host).await.unwrap_err();
    assert!(err.is_access_denied());
    assert!(registry.is_empty());
    assert!(dir.path().exists());

    authority.push(AuthorityAnswer::Yes);
    let err = proxy
        .open(url(&dir.path().join("f")), OpenMode::WRITE, &host)
        .await
        .unwrap_err();
    assert!(err.is_access_denied());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn cancelled_file_call_keeps_the_session_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fstab");
    std::fs::write(&path, "proc /proc proc defaults 0 0\n").unwrap();
    let proxy = allowing();

    let mut session = proxy
        .open(url(&path), OpenMode::READ, &RecordingHost::new())
        .await
        .unwrap();
    let cancelled = RecordingHost::new();
    cancelled.kill();
    let err = proxy.seek(&mut session, 5, &cancelled).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(!session.is_finished());

    let host = RecordingHost::new();
    proxy.read(&mut session, 5, &host).await.unwrap();
    proxy.close(&mut session, &host).await.unwrap();
    assert_eq!(host.blobs(), vec![b"/proc".to_vec()]);
}

#[tokio::test]
async fn job_failures_keep_their_code() {
    let dir = tempfile::tempdir().unwrap();
    let proxy = allowing();
    let err = proxy
        .del(url(&dir.path().join("absent")), &RecordingHost::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DoesNotExist);

    let err = proxy
        .copy(
            url(&dir.path().join("absent")),
            url(&dir.path().join("copy")),
            None,
            JobFlags::NONE,
            &RecordingHost::new(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::DoesNotExist);
}

#[tokio::test]
async fn file_session_through_the_proxy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crontab");
    std::fs::write(&path, "0 * * * * job\n").unwrap();
    let proxy = allowing();
    let host = RecordingHost::new();

    let mut session = proxy
        .open(url(&path), OpenMode::READ | OpenMode::WRITE, &host)
        .await
        .unwrap();
    proxy.read(&mut session, 1, &host).await.unwrap();
    proxy.seek(&mut session, 14, &host).await.unwrap();
    proxy.write(&mut session, b"5 4 * * * other\n", &host).await.unwrap();
    assert_eq!(proxy.size(&session).await.unwrap(), 30);
    proxy.truncate(&mut session, 14, &host).await.unwrap();
    proxy.close(&mut session, &host).await.unwrap();
    assert!(session.is_finished());

    assert_eq!(
        host.events(),
        vec![
            HostEvent::MimeType("text/plain".to_string()),
            HostEvent::Data(b"0".to_vec()),
            HostEvent::Position(14),
            HostEvent::Written(16),
            HostEvent::Truncated(14),
        ]
    );
    assert_eq!(std::fs::read(&path).unwrap(), b"0 * * * * job\n");

    let err = proxy.read(&mut session, 1, &host).await.unwrap_err();
    assert_matches!(err, AdminError::Invalid { .. });
}

#[tokio::test(start_paused = true)]
async fn waits_until_authorization_lapses() {
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::No));
    authority.push(AuthorityAnswer::Yes);
    authority.push(AuthorityAnswer::Yes);
    let config = AdminConfig::default();
    let proxy = proxy_with(&authority, config.clone()).with_gate(gate(&authority, &config));

    proxy
        .wait_until_authorization_expired(&RecordingHost::new())
        .await
        .unwrap();
    assert_eq!(authority.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn authorization_wait_stops_when_cancelled() {
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::Yes));
    let config = AdminConfig::default();
    let proxy = proxy_with(&authority, config.clone()).with_gate(gate(&authority, &config));

    let host = RecordingHost::new();
    host.kill();
    let err = proxy
        .wait_until_authorization_expired(&host)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn put_then_get_preserves_any_chunking(
        chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..20_000), 0..6)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (written, read) = runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("roundtrip");
            let proxy = allowing();

            let upload = RecordingHost::with_chunks(chunks.clone());
            proxy.put(url(&path), None, JobFlags::OVERWRITE, &upload).await.unwrap();
            let download = RecordingHost::new();
            proxy.get(url(&path), &download).await.unwrap();
            (std::fs::read(&path).unwrap(), download.received())
        });
        let expected = chunks.concat();
        prop_assert_eq!(&written, &expected);
        prop_assert_eq!(&read, &expected);
    }
}
