mod common;

use common::{next_project, project_fragment, wait_for_status, wait_until, FakeSandbox, Op};
use fragments_config::PreviewConfig;
use fragments_preview::{
    FragmentDescriptor, LogType, PreviewError, ProjectRuntime, RuntimeEvent, RuntimeStatus,
    BLANK_TARGET,
};
use fragments_sandbox::{SandboxInstance, SandboxResult, SandboxRuntime};
use mockall::mock;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

mock! {
    Sandbox {}

    #[async_trait::async_trait]
    impl SandboxRuntime for Sandbox {
        async fn boot(&self) -> SandboxResult<Arc<dyn SandboxInstance>>;
    }
}

fn runtime_with(sandbox: &FakeSandbox, fragment: FragmentDescriptor) -> ProjectRuntime {
    ProjectRuntime::new(
        Arc::new(sandbox.clone()),
        Arc::new(PreviewConfig::default()),
        fragment,
    )
}

fn never_booted() -> Arc<MockSandbox> {
    let mut sandbox = MockSandbox::new();
    sandbox.expect_boot().times(0);
    Arc::new(sandbox)
}

/// Distinct consecutive statuses broadcast until `last` is seen
async fn statuses_until(
    events: &mut tokio::sync::broadcast::Receiver<RuntimeEvent>,
    last: RuntimeStatus,
) -> Vec<RuntimeStatus> {
    let mut seen = Vec::new();
    while seen.last() != Some(&last) {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("status event not received")
            .unwrap();
        if let RuntimeEvent::Status { session } = event {
            if seen.last() != Some(&session.status) {
                seen.push(session.status);
            }
        }
    }
    seen
}

#[tokio::test]
async fn test_missing_files_fail_without_booting() {
    for fragment in [
        FragmentDescriptor {
            template: Some("nextjs-developer".to_string()),
            ..Default::default()
        },
        project_fragment("nextjs-developer", &[]),
    ] {
        let runtime =
            ProjectRuntime::new(never_booted(), Arc::new(PreviewConfig::default()), fragment);
        runtime.run().await;

        let session = runtime.session().await;
        assert_eq!(session.status, RuntimeStatus::Error);
        assert_eq!(
            session.message,
            PreviewError::MissingProjectFiles.to_string()
        );
        assert!(session.server_url.is_empty());
    }
}

#[tokio::test]
async fn test_missing_package_json_fails_without_installing() {
    let runtime = ProjectRuntime::new(
        never_booted(),
        Arc::new(PreviewConfig::default()),
        project_fragment("nextjs-developer", &["pages/index.tsx", "styles/globals.css"]),
    );
    runtime.run().await;

    let session = runtime.session().await;
    assert_eq!(session.status, RuntimeStatus::Error);
    assert_eq!(
        session.message,
        "No package.json found. Ask to generate a full Next.js project including package.json."
    );
    assert!(runtime.can_run().await);
    assert!(runtime.can_stop().await);
}

#[tokio::test]
async fn test_successful_run_reaches_running() {
    let sandbox = FakeSandbox::new(Some(0));
    let runtime = runtime_with(&sandbox, next_project());
    let mut events = runtime.subscribe();

    assert_eq!(runtime.session().await.status, RuntimeStatus::Idle);
    assert_eq!(runtime.status_line().await, "Ready");

    runtime.run().await;
    assert_eq!(runtime.session().await.status, RuntimeStatus::Installing);
    assert!(!runtime.can_run().await);

    sandbox.emit_ready(3000, "http://x");
    let session = wait_for_status(&runtime, RuntimeStatus::Running).await;

    assert_eq!(session.server_url, "http://x");
    assert!(session.run_id.is_some());
    assert_eq!(runtime.surface().await.target, "http://x");
    assert_eq!(runtime.status_line().await, "http://x");
    assert_eq!(
        statuses_until(&mut events, RuntimeStatus::Running).await,
        vec![RuntimeStatus::Installing, RuntimeStatus::Running]
    );
    assert_eq!(sandbox.spawned(), vec!["npm install", "npm run dev"]);
}

#[tokio::test]
async fn test_empty_ready_url_falls_back_to_port() {
    let sandbox = FakeSandbox::new(Some(0));
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;
    sandbox.emit_ready(5173, "");

    let session = wait_for_status(&runtime, RuntimeStatus::Running).await;
    assert_eq!(session.server_url, "http://localhost:5173");
}

#[tokio::test]
async fn test_failed_install_never_starts_dev_server() {
    let sandbox = FakeSandbox::new(Some(1));
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;

    let session = runtime.session().await;
    assert_eq!(session.status, RuntimeStatus::Error);
    assert_eq!(session.message, "npm install failed with exit code 1");
    assert!(session.server_url.is_empty());
    assert_eq!(sandbox.spawned(), vec!["npm install"]);
    assert!(runtime.surface().await.is_blank());
}

#[tokio::test]
async fn test_boot_failure_becomes_error() {
    let sandbox = FakeSandbox::failing_boot("no capacity left");
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;

    let session = runtime.session().await;
    assert_eq!(session.status, RuntimeStatus::Error);
    assert!(session.message.contains("no capacity left"), "{}", session.message);
    assert!(session.server_url.is_empty());
    assert_eq!(sandbox.ops(), vec![Op::Boot]);
    assert!(runtime.can_run().await);
}

#[tokio::test]
async fn test_write_failure_becomes_error() {
    let sandbox = FakeSandbox::failing_write("/pages/index.tsx");
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;

    let session = runtime.session().await;
    assert_eq!(session.status, RuntimeStatus::Error);
    assert!(session.message.contains("disk quota exceeded"), "{}", session.message);
    assert!(session.message.contains("/pages/index.tsx"));
    assert!(session.server_url.is_empty());
    assert!(sandbox.spawned().is_empty());
    // Later files are never attempted
    assert_eq!(sandbox.count(&Op::Write("/pages/api/hello.ts".to_string())), 0);
    assert!(runtime.surface().await.is_blank());
}

#[tokio::test]
async fn test_fragment_install_command_is_used() {
    let sandbox = FakeSandbox::new(Some(0));
    let mut fragment = next_project();
    fragment.install_dependencies_command = Some("npm install --legacy-peer-deps".to_string());
    let runtime = runtime_with(&sandbox, fragment);

    runtime.run().await;
    assert_eq!(sandbox.spawned()[0], "npm install --legacy-peer-deps");
}

#[tokio::test]
async fn test_stop_from_running_resets_everything() {
    let sandbox = FakeSandbox::new(Some(0));
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;
    sandbox.emit_ready(3000, "http://localhost:3000");
    wait_for_status(&runtime, RuntimeStatus::Running).await;

    runtime.stop().await;

    let session = runtime.session().await;
    assert_eq!(session.status, RuntimeStatus::Idle);
    assert!(session.server_url.is_empty());
    assert!(session.message.is_empty());
    assert_eq!(runtime.surface().await.target, BLANK_TARGET);
    assert_eq!(sandbox.count(&Op::Teardown), 1);
    assert!(!runtime.can_stop().await);
}

#[tokio::test]
async fn test_stop_from_idle_is_a_no_op() {
    let sandbox = FakeSandbox::new(Some(0));
    let runtime = runtime_with(&sandbox, next_project());
    let mut events = runtime.subscribe();

    let before = runtime.session().await;
    runtime.stop().await;

    assert_eq!(runtime.session().await, before);
    assert!(sandbox.ops().is_empty());
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_files_are_written_before_install() {
    let sandbox = FakeSandbox::new(Some(0));
    let runtime = runtime_with(
        &sandbox,
        project_fragment(
            "nextjs-developer",
            &[
                "package.json",
                "next.config.mjs",
                "pages/_app.tsx",
                "pages/api/hello.ts",
                "styles/globals.css",
            ],
        ),
    );

    runtime.run().await;

    let ops = sandbox.ops();
    assert_eq!(
        &ops[..12],
        &[
            Op::Boot,
            Op::Mkdir("/".to_string()),
            Op::Write("/package.json".to_string()),
            Op::Mkdir("/".to_string()),
            Op::Write("/next.config.mjs".to_string()),
            Op::Mkdir("/pages".to_string()),
            Op::Write("/pages/_app.tsx".to_string()),
            Op::Mkdir("/pages/api".to_string()),
            Op::Write("/pages/api/hello.ts".to_string()),
            Op::Mkdir("/styles".to_string()),
            Op::Write("/styles/globals.css".to_string()),
            Op::Spawn("npm install".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_run_while_installing_is_ignored() {
    let sandbox = FakeSandbox::new(None);
    let runtime = runtime_with(&sandbox, next_project());

    let pipeline = tokio::spawn({
        let runtime = runtime.clone();
        async move { runtime.run().await }
    });
    sandbox.wait_for_spawns(1).await;

    runtime.run().await;
    assert_eq!(sandbox.count(&Op::Boot), 1);

    sandbox.finish_install(0);
    pipeline.await.unwrap();
    assert_eq!(sandbox.spawned(), vec!["npm install", "npm run dev"]);
}

#[tokio::test]
async fn test_stop_during_install_discards_the_stale_run() {
    let sandbox = FakeSandbox::new(None);
    let runtime = runtime_with(&sandbox, next_project());

    let pipeline = tokio::spawn({
        let runtime = runtime.clone();
        async move { runtime.run().await }
    });
    sandbox.wait_for_spawns(1).await;

    runtime.stop().await;
    assert_eq!(runtime.session().await.status, RuntimeStatus::Idle);

    // The install finishing afterwards must not revive the session
    sandbox.finish_install(0);
    pipeline.await.unwrap();

    let session = runtime.session().await;
    assert_eq!(session.status, RuntimeStatus::Idle);
    assert!(session.message.is_empty());
    assert_eq!(sandbox.spawned(), vec!["npm install"]);
    assert_eq!(sandbox.count(&Op::Teardown), 1);
}

#[tokio::test]
async fn test_ready_timeout_moves_to_error() {
    let sandbox = FakeSandbox::new(Some(0));
    let config = PreviewConfig::default().with_ready_timeout(Duration::from_millis(50));
    let runtime = ProjectRuntime::new(Arc::new(sandbox.clone()), Arc::new(config), next_project());

    runtime.run().await;

    let session = wait_for_status(&runtime, RuntimeStatus::Error).await;
    assert!(session.message.contains("did not become ready"));
    assert!(session.server_url.is_empty());

    runtime.stop().await;
    assert_eq!(runtime.session().await.status, RuntimeStatus::Idle);
}

#[tokio::test]
async fn test_rerun_after_error_tears_down_previous_instance() {
    let sandbox = FakeSandbox::new(Some(1));
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;
    assert_eq!(runtime.session().await.status, RuntimeStatus::Error);
    let first_run = runtime.session().await.run_id;

    runtime.run().await;
    assert_eq!(sandbox.count(&Op::Boot), 2);
    assert_eq!(sandbox.count(&Op::Teardown), 1);
    assert_ne!(runtime.session().await.run_id, first_run);
}

#[tokio::test]
async fn test_changed_fragment_resets_session() {
    let sandbox = FakeSandbox::new(Some(0));
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;
    sandbox.emit_ready(3000, "http://localhost:3000");
    wait_for_status(&runtime, RuntimeStatus::Running).await;

    // Same template and files: nothing happens
    let mut same = next_project();
    same.title = Some("Renamed".to_string());
    runtime.set_fragment(same).await;
    assert_eq!(runtime.session().await.status, RuntimeStatus::Running);

    runtime
        .set_fragment(project_fragment("nextjs-developer", &["package.json"]))
        .await;
    assert_eq!(runtime.session().await.status, RuntimeStatus::Idle);
    assert_eq!(sandbox.count(&Op::Teardown), 1);
    assert_eq!(runtime.fragment().await.title, None);
}

#[tokio::test]
async fn test_logs_capture_process_output() {
    let sandbox = FakeSandbox::new(Some(0));
    let runtime = runtime_with(&sandbox, next_project());

    runtime.run().await;
    sandbox.emit_ready(3000, "http://localhost:3000");
    wait_for_status(&runtime, RuntimeStatus::Running).await;

    wait_until(|| {
        let runtime = runtime.clone();
        async move {
            let logs = runtime.logs(None, None).await;
            logs.iter().any(|log| {
                log.log_type == LogType::System && log.message.contains("ready at")
            }) && logs
                .iter()
                .any(|log| log.log_type == LogType::Stdout && log.message == "> npm install")
        }
    })
    .await;

    let latest = runtime.logs(None, Some(1)).await;
    assert_eq!(latest.len(), 1);

    runtime.clear_logs().await;
    assert!(runtime.logs(None, None).await.is_empty());
}

#[tokio::test]
async fn test_log_buffer_is_bounded() {
    let sandbox = FakeSandbox::new(Some(0));
    let config = PreviewConfig {
        log_capacity: 2,
        ..PreviewConfig::default()
    };
    let runtime = ProjectRuntime::new(Arc::new(sandbox.clone()), Arc::new(config), next_project());

    runtime.run().await;
    sandbox.emit_ready(3000, "http://localhost:3000");
    wait_for_status(&runtime, RuntimeStatus::Running).await;
    runtime.stop().await;

    assert!(runtime.logs(None, None).await.len() <= 2);
}
