#![cfg(unix)]

use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serial_test::serial;

use toolshed_config::ToolshedConfig;
use toolshed_runner::{
    CommandExecutor, ExecContext, ExecOutcome, ExecRequest, INTERRUPTED_EXIT_CODE,
    InterruptSignal, LocalExecutor,
};

fn executor(interrupt: &InterruptSignal) -> anyhow::Result<(LocalExecutor, tempfile::TempDir)> {
    let temp = tempfile::tempdir()?;
    let context = ExecContext::from_config(&ToolshedConfig::default(), interrupt.clone());
    Ok((LocalExecutor::new(context, temp.path()), temp))
}

#[test]
#[serial]
fn interrupt_from_another_thread_stops_the_whole_tree() -> anyhow::Result<()> {
    let interrupt = InterruptSignal::new();
    let (exec, temp) = executor(&interrupt)?;
    let marker = temp.path().join("survivor");

    let trigger = interrupt.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(400));
        trigger.trigger();
    });

    let started = Instant::now();
    let script = format!(
        "echo started; (sleep 3 && touch {}) & sleep 30",
        marker.display()
    );
    let output = exec.execute(&script, &ExecRequest::new());
    canceller.join().map_err(|_| anyhow::anyhow!("canceller panicked"))?;

    assert_eq!(output.status, ExecOutcome::Interrupted);
    assert_eq!(output.returncode, INTERRUPTED_EXIT_CODE);
    assert!(output.output.starts_with("started"));
    assert!(output.output.contains("[Command interrupted]"));
    assert!(started.elapsed() < Duration::from_secs(10));

    // The background child belonged to the same group and must not outlive it.
    thread::sleep(Duration::from_secs(4));
    assert!(!marker.exists());
    Ok(())
}

#[test]
#[serial]
fn acknowledged_interrupt_does_not_leak_into_the_next_command() -> anyhow::Result<()> {
    let interrupt = InterruptSignal::new();
    let (exec, _temp) = executor(&interrupt)?;

    let trigger = interrupt.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        trigger.trigger();
    });
    let first = exec.execute("sleep 20", &ExecRequest::new());
    canceller.join().map_err(|_| anyhow::anyhow!("canceller panicked"))?;
    assert_eq!(first.status, ExecOutcome::Interrupted);

    let second = exec.execute("echo fine", &ExecRequest::new());
    assert!(second.success());
    assert_eq!(second.output.trim(), "fine");
    Ok(())
}

#[test]
fn parallel_commands_share_one_executor() -> anyhow::Result<()> {
    let interrupt = InterruptSignal::new();
    let (exec, _temp) = executor(&interrupt)?;

    let outputs: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|n| {
                let exec = &exec;
                scope.spawn(move || exec.execute(&format!("echo job-{n}"), &ExecRequest::new()))
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .map(|output| output.output.trim().to_string())
            .collect()
    });
    assert_eq!(outputs, vec!["job-0", "job-1", "job-2", "job-3"]);
    Ok(())
}
