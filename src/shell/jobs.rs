//! Background job bookkeeping (`cmd &`). Grounded on the teacher's
//! `ProcessGroupGuard` (`dispatch/cli.rs`): there, dropping the guard sent
//! `SIGKILL` to a real process group; here, since a "process" is an
//! in-process async task rather than a forked subprocess, the same
//! kill-on-drop shape is expressed with `tokio_util::sync::CancellationToken`
//! and a `JoinHandle` instead of a pid.

use std::collections::BTreeMap;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ExecResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Done,
}

pub struct Job {
    pub id: u32,
    pub command_line: String,
    pub state: JobState,
    pub cancel: CancellationToken,
    pub handle: Option<JoinHandle<ExecResult>>,
    pub result: Option<ExecResult>,
}

impl Job {
    /// Cancel this job's task, mirroring `ProcessGroupGuard::drop`'s
    /// kill-the-whole-group behavior for the async-task analog.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.state = JobState::Done;
    }
}

/// The shell's job table: every backgrounded command gets a job id, and
/// completion order is independent of launch order (spec.md §5
/// "background jobs complete independently").
#[derive(Default)]
pub struct JobTable {
    jobs: BTreeMap<u32, Job>,
    next_id: u32,
}

impl JobTable {
    pub fn new() -> Self {
        Self { jobs: BTreeMap::new(), next_id: 1 }
    }

    pub fn spawn(&mut self, command_line: String, handle: JoinHandle<ExecResult>, cancel: CancellationToken) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.insert(
            id,
            Job {
                id,
                command_line,
                state: JobState::Running,
                cancel,
                handle: Some(handle),
                result: None,
            },
        );
        id
    }

    /// Poll every running job's handle without blocking, moving finished
    /// ones to `Done` and recording their result. Call this opportunistically
    /// (e.g. before printing a prompt) since there's no OS-level SIGCHLD to
    /// react to.
    pub fn reap_finished(&mut self) {
        for job in self.jobs.values_mut() {
            if job.state == JobState::Running {
                if job.handle.as_ref().is_some_and(|h| h.is_finished()) {
                    job.state = JobState::Done;
                }
            }
        }
    }

    pub async fn wait(&mut self, id: u32) -> Option<ExecResult> {
        let job = self.jobs.get_mut(&id)?;
        if let Some(result) = job.result.clone() {
            return Some(result);
        }
        if let Some(handle) = job.handle.take() {
            let result = handle.await.unwrap_or_else(|_| ExecResult::failure("job panicked"));
            job.result = Some(result.clone());
            job.state = JobState::Done;
            return Some(result);
        }
        None
    }

    pub fn list(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_job_is_tracked_and_waitable() {
        let mut table = JobTable::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(async { ExecResult::success("done".into()) });
        let id = table.spawn("sleep 1".to_string(), handle, cancel);
        let result = table.wait(id).await.unwrap();
        assert_eq!(result.stdout, "done");
        assert_eq!(result.exit_code, 0);
    }
}
