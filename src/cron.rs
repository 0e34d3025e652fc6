//! Job registry: cron-driven scheduling for scripts plus a handful of fixed system jobs
//! (health check, backups) (§4.2).

use std::{
    collections::VecDeque,
    fs,
    path::PathBuf,
    str::FromStr,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::{constants::MAX_EXECUTION_HISTORY, error::SchedulerError, runtime};

/// Sentinel job id for the health-check sweep (§4.4, §4.6 point 4).
pub const HEALTH_CHECK_JOB_ID: &str = "health_check_job";
/// Sentinel job id for the local backup hook (§3.2, §4.6 point 5).
pub const LOCAL_BACKUP_JOB_ID: &str = "scheduled_local_backup";
/// Sentinel job id for the remote (WebDAV) backup hook (§3.2, §4.6 point 5).
pub const CD2_BACKUP_JOB_ID: &str = "scheduled_cd2_backup";

/// Job id for a user script.
pub fn script_job_id(script_id: i64) -> String {
    format!("script_{script_id}")
}

/// Normalizes a cron expression: the `cron` crate wants a leading seconds field, so a
/// 5-field expression (the common form users write) is widened to 6 fields.
fn normalize_cron_expression(expr: &str) -> String {
    let field_count = expr.split_whitespace().count();
    if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

fn parse_schedule(expr: &str) -> Result<Schedule, SchedulerError> {
    let normalized = normalize_cron_expression(expr);
    Schedule::from_str(&normalized).map_err(|source| SchedulerError::InvalidCron {
        expression: expr.to_string(),
        source,
    })
}

/// Outcome of a single job execution, kept for operator visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobExecutionStatus {
    Success,
    Failed(String),
    /// The job fired while a previous execution was still running and was suppressed.
    Overlapped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionRecord {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: Option<JobExecutionStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobState {
    id: String,
    expression: String,
    #[serde(skip)]
    schedule: Option<Schedule>,
    next_execution: DateTime<Utc>,
    currently_running: bool,
    execution_history: VecDeque<JobExecutionRecord>,
}

impl JobState {
    fn new(id: String, expression: String) -> Result<Self, SchedulerError> {
        let schedule = parse_schedule(&expression)?;
        let next_execution = schedule
            .upcoming(Utc)
            .next()
            .unwrap_or_else(Utc::now);
        Ok(Self {
            id,
            expression,
            schedule: Some(schedule),
            next_execution,
            currently_running: false,
            execution_history: VecDeque::with_capacity(MAX_EXECUTION_HISTORY),
        })
    }

    fn advance(&mut self) {
        if self.schedule.is_none() {
            self.schedule = parse_schedule(&self.expression).ok();
        }
        if let Some(schedule) = &self.schedule
            && let Some(next) = schedule.after(&self.next_execution).next()
        {
            self.next_execution = next;
        }
    }

    fn push_record(&mut self, record: JobExecutionRecord) {
        if self.execution_history.len() >= MAX_EXECUTION_HISTORY {
            self.execution_history.pop_front();
        }
        self.execution_history.push_back(record);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedState {
    jobs: Vec<JobState>,
}

/// Registry of timed jobs. Owns only scheduling bookkeeping — it does not itself invoke
/// scripts; callers poll [`JobRegistry::due_jobs`] and dispatch to the supervisor.
pub struct JobRegistry {
    jobs: Arc<Mutex<Vec<JobState>>>,
    state_path: PathBuf,
}

impl JobRegistry {
    /// Loads persisted job state if present, otherwise starts empty.
    pub fn load() -> Result<Self, SchedulerError> {
        let state_path = runtime::runtime_dir().join("job_state.json");
        let jobs = if state_path.exists() {
            let raw = fs::read_to_string(&state_path)?;
            let persisted: PersistedState = serde_json::from_str(&raw)?;
            persisted.jobs
        } else {
            Vec::new()
        };
        Ok(Self {
            jobs: Arc::new(Mutex::new(jobs)),
            state_path,
        })
    }

    fn persist(&self) -> Result<(), SchedulerError> {
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let jobs = self.jobs.lock()?;
        let persisted = PersistedState { jobs: jobs.clone() };
        let raw = serde_json::to_string_pretty(&persisted)?;
        fs::write(&self.state_path, raw)?;
        Ok(())
    }

    /// Registers or replaces the timed job for a script. A `None`/`@daemon` cron removes
    /// any existing timed job and installs nothing (§4.2 upsert contract).
    pub fn upsert_script_job(
        &self,
        script_id: i64,
        cron_expr: Option<&str>,
    ) -> Result<(), SchedulerError> {
        let id = script_job_id(script_id);
        self.remove(&id)?;

        let expr = match cron_expr {
            Some(expr) if expr != crate::constants::DAEMON_CRON_SENTINEL => expr,
            _ => return Ok(()),
        };

        let job = JobState::new(id, expr.to_string())?;
        self.jobs.lock()?.push(job);
        self.persist()
    }

    /// Registers one of the fixed system jobs (health check, backups).
    pub fn register_fixed_job(&self, id: &str, cron_expr: &str) -> Result<(), SchedulerError> {
        self.remove(id)?;
        let job = JobState::new(id.to_string(), cron_expr.to_string())?;
        self.jobs.lock()?.push(job);
        self.persist()
    }

    /// Removes a job by id. Idempotent.
    pub fn remove(&self, id: &str) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock()?;
        jobs.retain(|job| job.id != id);
        drop(jobs);
        self.persist()
    }

    /// Returns `true` if a job with this id is currently registered.
    pub fn exists(&self, id: &str) -> Result<bool, SchedulerError> {
        Ok(self.jobs.lock()?.iter().any(|job| job.id == id))
    }

    /// Returns the ids of every registered job.
    pub fn list(&self) -> Result<Vec<String>, SchedulerError> {
        Ok(self.jobs.lock()?.iter().map(|job| job.id.clone()).collect())
    }

    /// Sweeps for jobs whose scheduled instant has passed, marking them running and
    /// advancing their next-fire time. A job whose previous firing is still running is
    /// reported back as `Overlapped` and its execution is suppressed, not queued (§4.2, §5).
    pub fn due_jobs(&self) -> Result<Vec<String>, SchedulerError> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock()?;
        let mut due = Vec::new();
        for job in jobs.iter_mut() {
            if job.next_execution > now {
                continue;
            }
            if job.currently_running {
                job.push_record(JobExecutionRecord {
                    started_at: now,
                    completed_at: Some(now),
                    status: Some(JobExecutionStatus::Overlapped),
                });
                job.advance();
                continue;
            }
            job.currently_running = true;
            job.push_record(JobExecutionRecord {
                started_at: now,
                completed_at: None,
                status: None,
            });
            job.advance();
            due.push(job.id.clone());
        }
        drop(jobs);
        self.persist()?;
        Ok(due)
    }

    /// Records the outcome of a dispatched job, clearing its running flag.
    pub fn mark_completed(&self, id: &str, status: JobExecutionStatus) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock()?;
        if let Some(job) = jobs.iter_mut().find(|job| job.id == id) {
            job.currently_running = false;
            if let Some(record) = job.execution_history.back_mut() {
                record.completed_at = Some(Utc::now());
                record.status = Some(status);
            }
        }
        drop(jobs);
        self.persist()
    }

    /// Execution history for a job, most recent last (test/inspection helper).
    pub fn history(&self, id: &str) -> Result<Vec<JobExecutionRecord>, SchedulerError> {
        let jobs = self.jobs.lock()?;
        Ok(jobs
            .iter()
            .find(|job| job.id == id)
            .map(|job| job.execution_history.iter().cloned().collect())
            .unwrap_or_default())
    }
}
