//! Process worker loop.
//!
//! A worker reads one JSON [`WorkerTask`] per line and answers each with one
//! JSON [`StepResult`] line, in order, until its input closes. Its stdout is
//! reserved for this protocol.

use std::io::{BufRead, Write};

use log::{debug, warn};
use serde_json::Value;

use super::{StepExecutor, WorkerTask};
use crate::{
    error::{IoResultExt, Result},
    models::{ActionKind, StepResult},
};

/// Serves tasks until EOF and returns the number handled.
pub fn serve<R, W>(executor: &StepExecutor, input: R, mut output: W) -> Result<usize>
where
    R: BufRead,
    W: Write,
{
    let mut handled = 0;

    for line in input.lines() {
        let line = line.fs_context("<stdin>")?;
        if line.trim().is_empty() {
            continue;
        }

        let result = match serde_json::from_str::<WorkerTask>(&line) {
            Ok(task) => executor.execute(&task),
            Err(e) => {
                warn!("Rejecting malformed task: {e}");
                StepResult::failure(
                    index_hint(&line),
                    ActionKind::Unknown,
                    format!("Invalid worker task: {e}"),
                    true,
                )
            }
        };

        let encoded = serde_json::to_string(&result)?;
        writeln!(output, "{encoded}").fs_context("<stdout>")?;
        output.flush().fs_context("<stdout>")?;
        handled += 1;
    }

    debug!("Worker input closed after {handled} task(s)");
    Ok(handled)
}

/// Best-effort step index of a task that failed to parse.
fn index_hint(line: &str) -> usize {
    serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.pointer("/step/index").and_then(Value::as_u64))
        .map(|i| i as usize)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, sync::Arc, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        corrector::RetryCorrector,
        external::{GitCli, ShellSandbox},
        models::{GenerationContext, Step},
    };

    fn executor() -> StepExecutor {
        StepExecutor::new(
            Arc::new(ShellSandbox::default()),
            Arc::new(GitCli::new()),
            RetryCorrector::default(),
            Duration::from_secs(10),
        )
    }

    #[test]
    fn test_serves_tasks_in_order() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut step_a = Step::create_file("a.txt", Some("a"));
        step_a.index = 1;
        let mut step_b = Step::create_file("b.txt", Some("b"));
        step_b.index = 2;

        let mut input = String::new();
        for step in [step_a, step_b] {
            let task = WorkerTask::new(step, temp_dir.path(), GenerationContext::default());
            input.push_str(&serde_json::to_string(&task).expect("Failed to encode task"));
            input.push('\n');
        }

        let mut output = Vec::new();
        let handled = serve(&executor(), Cursor::new(input), &mut output).expect("Failed to serve");

        assert_eq!(handled, 2);
        let results: Vec<StepResult> = String::from_utf8(output)
            .expect("Output is not UTF-8")
            .lines()
            .map(|line| serde_json::from_str(line).expect("Failed to decode result"))
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].step_index, 1);
        assert_eq!(results[1].step_index, 2);
        assert!(results.iter().all(|r| r.success));
        assert!(temp_dir.path().join("b.txt").exists());
    }

    #[test]
    fn test_malformed_line_gets_failed_result() {
        let input = "{\"step\": {\"index\": 4}, \"project_path\": 12}\n\n";
        let mut output = Vec::new();

        let handled = serve(&executor(), Cursor::new(input), &mut output).expect("Failed to serve");

        assert_eq!(handled, 1);
        let text = String::from_utf8(output).expect("Output is not UTF-8");
        let result: StepResult = serde_json::from_str(text.trim()).expect("Failed to decode result");
        assert_eq!(result.step_index, 4);
        assert!(!result.success);
    }
}
