#![cfg(unix)]

use assert_matches::assert_matches;
use chrono::SecondsFormat;
use core_test_support::logging_registry;
use core_test_support::logless_registry;
use core_test_support::wait_for_death;
use exec_agent_core::Command;
use exec_agent_core::LogKind;
use exec_agent_core::ProcessBuilder;
use exec_agent_core::ProcessError;
use exec_agent_core::UNSET_EXIT_CODE;
use pretty_assertions::assert_eq;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn output_lines_are_logged_in_order() {
    let (_tmp, registry) = logging_registry();
    let started = registry
        .start(Command::new("count", "printf '1\\n2\\n3'"), Vec::new())
        .await
        .expect("start");
    assert!(started.alive);
    assert!(started.has_logs);
    assert_eq!(started.exit_code, UNSET_EXIT_CODE);
    assert_eq!(started.pid, 1);
    assert!(started.native_pid > 0);

    let died = wait_for_death(&registry, started.pid).await.expect("death");
    assert_eq!(died.exit_code, 0);
    assert!(died.death_time.is_some());

    let logs = registry.read_all_logs(started.pid).await.expect("logs");
    let texts: Vec<&str> = logs.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["1", "2", "3"]);
    assert!(logs.iter().all(|m| m.kind == LogKind::Stdout));
    assert!(logs.windows(2).all(|pair| pair[0].time <= pair[1].time));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stderr_is_logged_with_its_kind() {
    let (_tmp, registry) = logging_registry();
    let process = ProcessBuilder::new()
        .name("noisy")
        .command_line("echo out; echo oops 1>&2")
        .start(&registry)
        .await
        .expect("start");
    wait_for_death(&registry, process.pid).await.expect("death");

    let logs = registry.read_all_logs(process.pid).await.expect("logs");
    let mut kinds: Vec<(LogKind, &str)> = logs.iter().map(|m| (m.kind, m.text.as_str())).collect();
    kinds.sort_by_key(|(kind, _)| *kind == LogKind::Stderr);
    assert_eq!(
        kinds,
        vec![(LogKind::Stdout, "out"), (LogKind::Stderr, "oops")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exit_code_is_reported() {
    let (_tmp, registry) = logging_registry();
    let process = registry
        .start(Command::new("fail", "exit 3"), Vec::new())
        .await
        .expect("start");
    let died = wait_for_death(&registry, process.pid).await.expect("death");
    assert!(!died.alive);
    assert_eq!(died.exit_code, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn processes_without_logs_can_still_be_inspected() {
    let registry = logless_registry();
    let process = registry
        .start(Command::new("echo", "echo test"), Vec::new())
        .await
        .expect("start");
    assert!(!process.has_logs);

    let died = wait_for_death(&registry, process.pid).await.expect("death");
    assert_eq!(died.name, "echo");
    assert_eq!(died.command_line, "echo test");
    assert_matches!(
        registry.read_all_logs(process.pid).await,
        Err(ProcessError::LogsUnavailable { pid }) if pid == process.pid
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kill_reports_missing_and_dead_processes() {
    let (_tmp, registry) = logging_registry();
    assert_matches!(
        registry.kill(999).await,
        Err(ProcessError::NoProcess { pid: 999 })
    );

    let process = registry
        .start(Command::new("quick", "true"), Vec::new())
        .await
        .expect("start");
    wait_for_death(&registry, process.pid).await.expect("death");
    let err = registry.kill(process.pid).await.expect_err("dead process");
    assert!(err.is_not_alive());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn killed_process_reports_signal_exit_code() {
    let (_tmp, registry) = logging_registry();
    let process = registry
        .start(Command::new("sleeper", "sleep 30; echo never"), Vec::new())
        .await
        .expect("start");

    registry.kill(process.pid).await.expect("kill");
    let died = wait_for_death(&registry, process.pid).await.expect("death");
    assert_eq!(died.exit_code, 137);

    let logs = registry.read_all_logs(process.pid).await.expect("logs");
    assert!(logs.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn listing_filters_dead_processes_and_sorts_by_pid() {
    let (_tmp, registry) = logging_registry();
    let quick = registry
        .start(Command::new("quick", "true"), Vec::new())
        .await
        .expect("start quick");
    let slow = registry
        .start(Command::new("slow", "sleep 30"), Vec::new())
        .await
        .expect("start slow");
    assert!(slow.pid > quick.pid);
    wait_for_death(&registry, quick.pid).await.expect("death");

    let alive: Vec<u64> = registry.processes(false).await.iter().map(|p| p.pid).collect();
    assert_eq!(alive, vec![slow.pid]);
    let all: Vec<u64> = registry.processes(true).await.iter().map(|p| p.pid).collect();
    assert_eq!(all, vec![quick.pid, slow.pid]);

    registry.kill(slow.pid).await.expect("kill");
    wait_for_death(&registry, slow.pid).await.expect("death");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_logs_window_is_inclusive() {
    let (_tmp, registry) = logging_registry();
    let process = registry
        .start(Command::new("abc", "printf 'a\\nb\\nc\\n'"), Vec::new())
        .await
        .expect("start");
    wait_for_death(&registry, process.pid).await.expect("death");

    let all = registry.read_all_logs(process.pid).await.expect("logs");
    assert_eq!(all.len(), 3);
    let first = all[0].time;
    let last = all[2].time;

    let window = registry
        .read_logs(process.pid, first, last)
        .await
        .expect("window");
    assert_eq!(window, all);

    let from = last.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let tail = registry
        .read_logs_str(process.pid, &from, &from)
        .await
        .expect("tail");
    assert_eq!(tail.last(), all.last());
    assert!(tail.iter().all(|m| m.time == last));

    let before_start = first - chrono::Duration::seconds(10);
    let empty = registry
        .read_logs(process.pid, before_start, before_start)
        .await
        .expect("empty window");
    assert!(empty.is_empty());

    assert_matches!(
        registry
            .read_logs_str(process.pid, "yesterday", &from)
            .await,
        Err(ProcessError::InvalidTime { .. })
    );
}
