//! Command execution port tests

use std::time::Duration;

use kindops::command::{
    CommandError, CommandExecutor, CommandResult, CommandSpec, FakeExecutor, TIMEOUT_EXIT_CODE,
};

#[tokio::test]
async fn test_fake_maps_fingerprint_to_result() {
    let fake = FakeExecutor::new();
    fake.on("kubectl version", CommandResult::ok("v1.30"));

    let result = fake
        .execute(CommandSpec::new(["kubectl", "version", "--client"]))
        .await
        .unwrap();
    assert!(result.success());
    assert_eq!(result.stdout, "v1.30");
    assert_eq!(fake.calls(), vec!["kubectl version --client"]);
}

#[tokio::test]
async fn test_must_succeed_raises_command_failed() {
    let fake = FakeExecutor::new();
    fake.on("helm status", CommandResult::failed(1, "Error: release: not found"));

    let err = fake
        .execute(CommandSpec::new(["helm", "status", "web"]).must_succeed(true))
        .await
        .unwrap_err();
    match err {
        CommandError::Failed(failed) => {
            assert_eq!(failed.argv, vec!["helm", "status", "web"]);
            assert_eq!(failed.exit_code, 1);
            assert!(failed.stderr.contains("not found"));
        }
        other => panic!("unexpected error {other:?}"),
    }

    // Without the flag the caller gets the result back
    let result = fake
        .execute(CommandSpec::new(["helm", "status", "web"]))
        .await
        .unwrap();
    assert_eq!(result.exit_code, 1);
}

#[tokio::test]
async fn test_timeout_is_a_result_even_when_required() {
    let fake = FakeExecutor::new();
    fake.on("kubectl apply", CommandResult::timeout(Duration::from_secs(5)));

    let result = fake
        .execute(CommandSpec::new(["kubectl", "apply", "-f", "-"]).must_succeed(true))
        .await
        .unwrap();
    assert!(result.timed_out);
    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(!result.success());
}

#[tokio::test]
async fn test_sequences_and_default() {
    let fake = FakeExecutor::new();
    fake.on_sequence(
        "kubectl get pods",
        [CommandResult::failed(1, "first"), CommandResult::ok("second")],
    );
    fake.set_default(CommandResult::ok("fallback"));

    let spec = || CommandSpec::new(["kubectl", "get", "pods"]);
    assert_eq!(fake.execute(spec()).await.unwrap().stderr, "first");
    assert_eq!(fake.execute(spec()).await.unwrap().stdout, "second");
    assert_eq!(fake.execute(spec()).await.unwrap().stdout, "second");
    assert_eq!(
        fake.execute(CommandSpec::new(["helm", "list"])).await.unwrap().stdout,
        "fallback"
    );
    assert_eq!(fake.count("kubectl get pods"), 3);
}

#[tokio::test]
async fn test_unmatched_and_empty_commands() {
    let fake = FakeExecutor::new();
    let result = fake.execute(CommandSpec::new(["kind", "get", "clusters"])).await.unwrap();
    assert_eq!(result.exit_code, 127);

    let empty: [&str; 0] = [];
    assert!(matches!(
        fake.execute(CommandSpec::new(empty)).await,
        Err(CommandError::EmptyCommand)
    ));
}

#[tokio::test]
async fn test_stdin_and_env_recorded() {
    let fake = FakeExecutor::new();
    fake.set_default(CommandResult::ok(""));

    fake.execute(
        CommandSpec::new(["kubectl", "apply", "-f", "-"])
            .stdin("kind: ConfigMap\n")
            .env("KUBECONFIG", "/tmp/kc"),
    )
    .await
    .unwrap();

    let history = fake.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].stdin.as_deref(), Some("kind: ConfigMap\n"));
    assert_eq!(history[0].env.get("KUBECONFIG").map(String::as_str), Some("/tmp/kc"));
}
