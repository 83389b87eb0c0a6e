//! Command lifecycle through the dispatcher, against a real temporary tree.

use adminfs_authorization::testing::ScriptedAuthority;
use adminfs_authorization::{AuthorityAnswer, AuthorizationGate};
use adminfs_core::{
    AdminConfig, CallerId, Command, CommandEvent, CommandResult, ControlCall, ControlReply,
    ErrorCode, JobFlags, Locator, OpenMode, Request,
};
use adminfs_helper::{CommandState, Dispatcher, EventStream};
use adminfs_stream::{PipeEndpoint, StreamPipe};
use assert_matches::assert_matches;
use proptest::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

fn caller() -> CallerId {
    CallerId::new(":1.101")
}

fn dispatcher_with(authority: &Arc<ScriptedAuthority>, config: AdminConfig) -> Dispatcher {
    let gate = AuthorizationGate::new(authority.clone(), config.action_id.as_str());
    Dispatcher::new(gate, Arc::new(config))
}

fn allowing() -> (Dispatcher, Arc<ScriptedAuthority>) {
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::Yes));
    (dispatcher_with(&authority, AdminConfig::default()), authority)
}

fn url(path: &Path) -> Locator {
    Locator::from_path(path).unwrap()
}

async fn drain_events(events: &mut EventStream) -> Vec<CommandEvent> {
    let mut seen = Vec::new();
    while let Some(event) = events.next().await {
        seen.push(event);
    }
    seen
}

fn terminal(events: &[CommandEvent]) -> &CommandResult {
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    match events.last() {
        Some(CommandEvent::Result(result)) => result,
        other => panic!("last event is not a result: {other:?}"),
    }
}

#[tokio::test]
async fn denied_stat_registers_nothing() {
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::No));
    let dispatcher = dispatcher_with(&authority, AdminConfig::default());

    let request = Request::new(
        caller(),
        Command::Stat {
            url: Locator::parse("admin:///etc/shadow").unwrap(),
        },
    );
    let err = dispatcher.create(request, None).await.unwrap_err();

    assert!(err.is_access_denied());
    assert!(dispatcher.registry().is_empty());
    assert_eq!(authority.calls(), 1);
    assert_eq!(authority.subjects(), vec![caller()]);
}

#[tokio::test]
async fn stat_reports_one_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motd");
    std::fs::write(&path, "welcome\n").unwrap();
    let (dispatcher, _) = allowing();

    let address = dispatcher
        .create(Request::new(caller(), Command::Stat { url: url(&path) }), None)
        .await
        .unwrap();
    assert_eq!(dispatcher.registry().len(), 1);
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();

    let seen = drain_events(&mut events).await;
    assert!(terminal(&seen).is_success());
    assert_matches!(&seen[0], CommandEvent::StatRecord(record) if record.name == "motd" && record.size == 8);
    assert!(dispatcher.registry().is_empty());
}

#[tokio::test]
async fn list_dir_batches_start_with_dot() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c"] {
        std::fs::write(dir.path().join(name), name).unwrap();
    }
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::Yes));
    let dispatcher = dispatcher_with(
        &authority,
        AdminConfig {
            list_batch_size: 2,
            ..AdminConfig::default()
        },
    );

    let address = dispatcher
        .create(
            Request::new(caller(), Command::ListDir { url: url(dir.path()) }),
            None,
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();

    let seen = drain_events(&mut events).await;
    assert!(terminal(&seen).is_success());
    let batches: Vec<&Vec<_>> = seen
        .iter()
        .filter_map(|e| match e {
            CommandEvent::Entries(batch) => Some(batch),
            _ => None,
        })
        .collect();
    assert_eq!(batches.iter().map(|b| b.len()).collect::<Vec<_>>(), vec![2, 2]);
    assert_eq!(batches[0][0].name, ".");
    let mut names: Vec<&str> = batches.iter().flat_map(|b| b.iter()).map(|e| e.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec![".", "a", "b", "c"]);
}

#[tokio::test]
async fn put_with_overwrite_writes_concatenated_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fstab");
    std::fs::write(&path, "old contents that are longer than the new ones").unwrap();
    let (dispatcher, _) = allowing();

    let (mut writer, reader) = StreamPipe::open().unwrap();
    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::Put {
                    url: url(&path),
                    permissions: Some(0o644),
                    flags: JobFlags::OVERWRITE,
                },
            ),
            Some(PipeEndpoint::Reader(reader)),
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();

    let mut chunks = [&b"UUID=1 / ext4 "[..], b"defaults ", b"0 1\n"].into_iter();
    let result = loop {
        match events.next().await {
            Some(CommandEvent::DataRequest) => {
                match chunks.next() {
                    Some(chunk) => writer.write_chunk(chunk).await.unwrap(),
                    None => writer.finish().await.unwrap(),
                }
                dispatcher
                    .control(&caller(), &address, ControlCall::Data)
                    .await
                    .unwrap();
            }
            Some(CommandEvent::Result(result)) => break result,
            other => panic!("unexpected event {other:?}"),
        }
    };

    assert!(result.is_success(), "{result:?}");
    assert_eq!(std::fs::read(&path).unwrap(), b"UUID=1 / ext4 defaults 0 1\n");
    let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
}

#[tokio::test]
async fn put_without_overwrite_refuses_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keep");
    std::fs::write(&path, "precious").unwrap();
    let (dispatcher, _) = allowing();

    let (_writer, reader) = StreamPipe::open().unwrap();
    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::Put {
                    url: url(&path),
                    permissions: None,
                    flags: JobFlags::NONE,
                },
            ),
            Some(PipeEndpoint::Reader(reader)),
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();

    let seen = drain_events(&mut events).await;
    assert_eq!(terminal(&seen).code, ErrorCode::AlreadyExists);
    assert_eq!(std::fs::read(&path).unwrap(), b"precious");
}

#[tokio::test]
async fn killing_a_blocked_get_yields_one_cancelled_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    std::fs::write(&path, vec![7u8; 4 * 1024 * 1024]).unwrap();
    let (dispatcher, _) = allowing();

    // Nobody reads the pipe, so the job blocks once the buffer is full.
    let (writer, _reader) = StreamPipe::open().unwrap();
    let address = dispatcher
        .create(
            Request::new(caller(), Command::Get { url: url(&path) }),
            Some(PipeEndpoint::Writer(writer)),
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();
    assert_matches!(events.next().await, Some(CommandEvent::MimeTypeFound(_)));

    let object = dispatcher.registry().get(&address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Kill)
        .await
        .unwrap();

    let seen = drain_events(&mut events).await;
    assert_eq!(terminal(&seen).code, ErrorCode::Cancelled);
    assert_eq!(object.state(), CommandState::Cancelled);
    assert!(dispatcher.registry().is_empty());
}

#[tokio::test]
async fn kill_before_start_still_delivers_a_result() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, _) = allowing();
    let address = dispatcher
        .create(
            Request::new(caller(), Command::Del { url: url(&dir.path().join("x")) }),
            None,
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Kill)
        .await
        .unwrap();
    let seen = drain_events(&mut events).await;
    assert_eq!(terminal(&seen).code, ErrorCode::Cancelled);
}

#[tokio::test]
async fn denied_start_retires_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("new-dir");
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::Yes));
    let dispatcher = dispatcher_with(&authority, AdminConfig::default());

    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::Mkdir {
                    url: url(&target),
                    permissions: Some(0o750),
                },
            ),
            None,
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();

    authority.push(AuthorityAnswer::No);
    let err = dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap_err();
    assert!(err.is_access_denied());
    assert!(dispatcher.registry().is_empty());
    assert!(!target.exists());

    let seen = drain_events(&mut events).await;
    assert_eq!(terminal(&seen).code, ErrorCode::AccessDenied);

    let err = dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
    assert_eq!(authority.calls(), 2);
}

#[tokio::test]
async fn every_control_call_is_authorized_again() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("motd");
    let authority = Arc::new(ScriptedAuthority::always(AuthorityAnswer::Yes));
    let dispatcher = dispatcher_with(&authority, AdminConfig::default());

    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::File {
                    url: url(&path),
                    mode: OpenMode::WRITE,
                },
            ),
            None,
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    let me = caller();
    let control = |call| dispatcher.control(&me, &address, call);

    control(ControlCall::Start).await.unwrap();
    assert_eq!(events.next().await, Some(CommandEvent::Opened));

    authority.push(AuthorityAnswer::No);
    let err = control(ControlCall::Write(b"nope".to_vec())).await.unwrap_err();
    assert!(err.is_access_denied());
    let object = dispatcher.registry().get(&address).unwrap();
    assert_eq!(object.state(), CommandState::Running);

    control(ControlCall::Close).await.unwrap();
    assert_eq!(events.next().await, Some(CommandEvent::Closed));
    let seen = drain_events(&mut events).await;
    assert!(terminal(&seen).is_success());
    assert!(std::fs::read(&path).unwrap().is_empty());
    assert_eq!(authority.calls(), 4);
}

#[tokio::test]
async fn dropped_file_subscriber_retires_the_command() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes");
    std::fs::write(&path, "x").unwrap();
    let (dispatcher, _) = allowing();

    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::File {
                    url: url(&path),
                    mode: OpenMode::READ,
                },
            ),
            None,
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();
    assert_matches!(events.next().await, Some(CommandEvent::MimeTypeFound(_)));
    assert_eq!(events.next().await, Some(CommandEvent::Opened));
    drop(events);

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        while !dispatcher.registry().is_empty() {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn only_the_owner_subscribes_once_and_starts_once() {
    let dir = tempfile::tempdir().unwrap();
    let (dispatcher, _) = allowing();
    let address = dispatcher
        .create(
            Request::new(caller(), Command::Stat { url: url(dir.path()) }),
            None,
        )
        .await
        .unwrap();

    let stranger = CallerId::new(":1.666");
    assert!(dispatcher.subscribe(&stranger, &address).unwrap_err().is_access_denied());
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    assert!(dispatcher.subscribe(&caller(), &address).unwrap_err().is_access_denied());
    assert!(dispatcher
        .control(&stranger, &address, ControlCall::Start)
        .await
        .unwrap_err()
        .is_access_denied());

    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();
    let seen = drain_events(&mut events).await;
    assert!(terminal(&seen).is_success());

    // Finished commands are gone from the table.
    let err = dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
}

#[tokio::test]
async fn starting_twice_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f");
    std::fs::write(&path, "x").unwrap();
    let (dispatcher, _) = allowing();
    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::File {
                    url: url(&path),
                    mode: OpenMode::READ,
                },
            ),
            None,
        )
        .await
        .unwrap();
    let _events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();
    let err = dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unsupported);
}

#[tokio::test]
async fn file_session_reads_writes_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts");
    std::fs::write(&path, "hello world").unwrap();
    let (dispatcher, _) = allowing();

    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::File {
                    url: url(&path),
                    mode: OpenMode::READ | OpenMode::WRITE,
                },
            ),
            None,
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    let me = caller();
    let control = |call| dispatcher.control(&me, &address, call);

    control(ControlCall::Start).await.unwrap();
    assert_matches!(events.next().await, Some(CommandEvent::MimeTypeFound(mime)) if mime == "text/plain");
    assert_eq!(events.next().await, Some(CommandEvent::Opened));

    control(ControlCall::Read(5)).await.unwrap();
    assert_eq!(events.next().await, Some(CommandEvent::Data(b"hello".to_vec())));

    control(ControlCall::Seek(6)).await.unwrap();
    assert_eq!(events.next().await, Some(CommandEvent::PositionChanged(6)));

    control(ControlCall::Write(b"there".to_vec())).await.unwrap();
    assert_eq!(events.next().await, Some(CommandEvent::Written(5)));

    assert_eq!(control(ControlCall::Size).await.unwrap(), ControlReply::Size(11));

    control(ControlCall::Truncate(5)).await.unwrap();
    assert_eq!(events.next().await, Some(CommandEvent::Truncated(5)));

    control(ControlCall::Close).await.unwrap();
    assert_eq!(events.next().await, Some(CommandEvent::Closed));
    let seen = drain_events(&mut events).await;
    assert!(terminal(&seen).is_success());
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
}

#[tokio::test]
async fn copy_rename_chmod_and_recursive_delete() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src.conf");
    std::fs::write(&src, "key = value\n").unwrap();
    std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o600)).unwrap();
    let (dispatcher, _) = allowing();

    async fn run(dispatcher: &Dispatcher, command: Command) -> CommandResult {
        let address = dispatcher
            .create(Request::new(caller(), command), None)
            .await
            .unwrap();
        let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
        dispatcher
            .control(&caller(), &address, ControlCall::Start)
            .await
            .unwrap();
        let seen = drain_events(&mut events).await;
        terminal(&seen).clone()
    }

    let copy = dir.path().join("copy.conf");
    let result = run(
        &dispatcher,
        Command::Copy {
            src: url(&src),
            dst: url(&copy),
            permissions: None,
            flags: JobFlags::NONE,
        },
    )
    .await;
    assert!(result.is_success(), "{result:?}");
    assert_eq!(std::fs::read(&copy).unwrap(), b"key = value\n");
    assert_eq!(std::fs::metadata(&copy).unwrap().permissions().mode() & 0o777, 0o600);

    let again = run(
        &dispatcher,
        Command::Copy {
            src: url(&src),
            dst: url(&copy),
            permissions: None,
            flags: JobFlags::NONE,
        },
    )
    .await;
    assert_eq!(again.code, ErrorCode::AlreadyExists);

    let tree = dir.path().join("tree");
    std::fs::create_dir_all(tree.join("a/b")).unwrap();
    std::fs::write(tree.join("a/b/leaf"), "x").unwrap();
    let renamed = run(
        &dispatcher,
        Command::Rename {
            src: url(&copy),
            dst: url(&tree.join("a/moved.conf")),
            flags: JobFlags::NONE,
        },
    )
    .await;
    assert!(renamed.is_success());
    assert!(!copy.exists());

    let chmod = run(
        &dispatcher,
        Command::Chmod {
            url: url(&tree.join("a/moved.conf")),
            permissions: 0o640,
        },
    )
    .await;
    assert!(chmod.is_success());
    assert_eq!(
        std::fs::metadata(tree.join("a/moved.conf")).unwrap().permissions().mode() & 0o777,
        0o640
    );

    let del = run(&dispatcher, Command::Del { url: url(&tree) }).await;
    assert!(del.is_success(), "{del:?}");
    assert!(!tree.exists());

    let missing = run(&dispatcher, Command::Stat { url: url(&tree) }).await;
    assert_eq!(missing.code, ErrorCode::DoesNotExist);
}

#[tokio::test]
async fn chown_with_unknown_user_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("owned");
    std::fs::write(&path, "x").unwrap();
    let (dispatcher, _) = allowing();

    let address = dispatcher
        .create(
            Request::new(
                caller(),
                Command::Chown {
                    url: url(&path),
                    owner: "no-such-user-adminfs".to_string(),
                    group: String::new(),
                },
            ),
            None,
        )
        .await
        .unwrap();
    let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
    dispatcher
        .control(&caller(), &address, ControlCall::Start)
        .await
        .unwrap();
    let seen = drain_events(&mut events).await;
    assert_eq!(terminal(&seen).code, ErrorCode::DoesNotExist);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn listing_batches_respect_any_batch_size(files in 0usize..12, batch in 1usize..5) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let sizes = runtime.block_on(async {
            let dir = tempfile::tempdir().unwrap();
            for i in 0..files {
                std::fs::write(dir.path().join(format!("f{i}")), "x").unwrap();
            }
            let (_, authority) = allowing();
            let dispatcher = dispatcher_with(
                &authority,
                AdminConfig {
                    list_batch_size: batch,
                    ..AdminConfig::default()
                },
            );
            let address = dispatcher
                .create(
                    Request::new(caller(), Command::ListDir { url: url(dir.path()) }),
                    None,
                )
                .await
                .unwrap();
            let mut events = dispatcher.subscribe(&caller(), &address).unwrap();
            dispatcher
                .control(&caller(), &address, ControlCall::Start)
                .await
                .unwrap();
            let seen = drain_events(&mut events).await;
            assert!(terminal(&seen).is_success());
            let first = seen.iter().find_map(|e| match e {
                CommandEvent::Entries(batch) => batch.first().map(|entry| entry.name.clone()),
                _ => None,
            });
            assert_eq!(first.as_deref(), Some("."));
            seen.iter()
                .filter_map(|e| match e {
                    CommandEvent::Entries(batch) => Some(batch.len()),
                    _ => None,
                })
                .collect::<Vec<_>>()
        });
        prop_assert_eq!(sizes.iter().sum::<usize>(), files + 1);
        prop_assert!(sizes.iter().all(|&n| n > 0 && n <= batch));
        prop_assert!(sizes[..sizes.len() - 1].iter().all(|&n| n == batch));
    }
}
