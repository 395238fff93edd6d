//! The cron scheduler.
//!
//! Standard 5-field expressions (minute, hour, day-of-month, month,
//! day-of-week) with a timezone per schedule. Due schedules fire in
//! monotonic order of their fire times. Firing is best-effort
//! at-least-once: a schedule whose fire time passed while the process was
//! down fires exactly one catch-up on the next poll.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use weft_core::{ExecutionRequest, ScheduleId, TenantId, TriggerKind, WorkflowId};
use weft_engine::ExecutionRunner;

use crate::error::ScheduleError;

/// Poll interval when no schedule is registered.
const IDLE_POLL: Duration = Duration::from_secs(60);

/// One workflow's cron schedule.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Schedule id.
    pub id: ScheduleId,
    /// The owning tenant.
    pub tenant_id: TenantId,
    /// The workflow to run.
    pub workflow_id: WorkflowId,
    /// 5-field cron expression.
    pub expression: String,
    /// IANA timezone name the expression is evaluated in.
    pub timezone: String,
    /// Whether the schedule fires.
    pub active: bool,
    /// Last fire time; drives catch-up after downtime.
    pub last_fired_at: Option<DateTime<Utc>>,
}

impl Schedule {
    /// The next fire time strictly after `after`.
    ///
    /// # Errors
    ///
    /// [`ScheduleError`] for an unparseable expression or timezone.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ScheduleError> {
        let parsed = parse_expression(&self.expression)?;
        let tz = parse_timezone(&self.timezone)?;
        Ok(parsed
            .after(&after.with_timezone(&tz))
            .next()
            .map(|t| t.with_timezone(&Utc)))
    }
}

/// Parse a 5-field expression, normalising to the 6-field form (seconds
/// pinned to `0`) the parser expects.
fn parse_expression(expression: &str) -> Result<cron::Schedule, ScheduleError> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(ScheduleError::InvalidExpression {
            expression: expression.to_owned(),
            reason: format!("expected 5 fields, found {fields}"),
        });
    }
    let normalised = format!("0 {expression}");
    cron::Schedule::from_str(&normalised).map_err(|e| ScheduleError::InvalidExpression {
        expression: expression.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.parse()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_owned()))
}

/// The next `n` fire times of an expression, for schedule previews.
///
/// # Errors
///
/// [`ScheduleError`] for an unparseable expression or timezone.
pub fn next_fire_times(
    expression: &str,
    timezone: &str,
    n: usize,
    after: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
    let parsed = parse_expression(expression)?;
    let tz = parse_timezone(timezone)?;
    Ok(parsed
        .after(&after.with_timezone(&tz))
        .take(n)
        .map(|t| t.with_timezone(&Utc))
        .collect())
}

/// Drives registered schedules against the runner.
pub struct Scheduler {
    runner: Arc<dyn ExecutionRunner>,
    schedules: Mutex<HashMap<ScheduleId, Schedule>>,
    notify: tokio::sync::Notify,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("schedules", &self.guard().len())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build a scheduler over the runner.
    #[must_use]
    pub fn new(runner: Arc<dyn ExecutionRunner>) -> Arc<Self> {
        Arc::new(Self {
            runner,
            schedules: Mutex::new(HashMap::new()),
            notify: tokio::sync::Notify::new(),
        })
    }

    /// Register or replace a schedule. Validates the expression and
    /// timezone, then wakes the loop so the new schedule is considered.
    ///
    /// # Errors
    ///
    /// [`ScheduleError`] for an unparseable expression or timezone.
    pub fn add_schedule(&self, schedule: Schedule) -> Result<(), ScheduleError> {
        parse_expression(&schedule.expression)?;
        parse_timezone(&schedule.timezone)?;
        debug!(schedule = %schedule.id, expression = %schedule.expression, "schedule registered");
        self.guard().insert(schedule.id, schedule);
        self.notify.notify_one();
        Ok(())
    }

    /// Drop a schedule. Returns whether it existed.
    pub fn remove_schedule(&self, id: ScheduleId) -> bool {
        let removed = self.guard().remove(&id).is_some();
        if removed {
            self.notify.notify_one();
        }
        removed
    }

    /// Fire everything due at `now` (in monotonic fire-time order) and
    /// return the next wake-up instant, if any schedule is active.
    ///
    /// A schedule is due when its next occurrence after `last_fired_at`
    /// lies in the past; a never-fired schedule anchors at `now` and so
    /// waits for its next occurrence. Each due schedule fires once per
    /// poll, which bounds downtime catch-up to a single fire.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut due: Vec<(DateTime<Utc>, Schedule)> = Vec::new();
        {
            let mut schedules = self.guard();
            for schedule in schedules.values_mut() {
                if !schedule.active {
                    continue;
                }
                let Some(anchor) = schedule.last_fired_at else {
                    schedule.last_fired_at = Some(now);
                    continue;
                };
                match schedule.next_after(anchor) {
                    Ok(Some(occurrence)) if occurrence <= now => {
                        due.push((occurrence, schedule.clone()));
                    }
                    Ok(_) => {}
                    Err(e) => warn!(schedule = %schedule.id, error = %e, "schedule unschedulable"),
                }
            }
        }

        due.sort_by_key(|(occurrence, _)| *occurrence);
        for (occurrence, schedule) in due {
            self.fire(&schedule, occurrence).await;
            if let Some(stored) = self.guard().get_mut(&schedule.id) {
                stored.last_fired_at = Some(now);
            }
        }

        let schedules = self.guard();
        schedules
            .values()
            .filter(|s| s.active)
            .filter_map(|s| {
                let anchor = s.last_fired_at.unwrap_or(now);
                s.next_after(anchor.max(now)).ok().flatten()
            })
            .min()
    }

    /// Run the firing loop until `shutdown` trips.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("scheduler started");
            loop {
                let next = self.poll_once(Utc::now()).await;
                let sleep_for = next.map_or(IDLE_POLL, |t| {
                    (t - Utc::now()).to_std().unwrap_or(Duration::ZERO)
                });
                tokio::select! {
                    () = tokio::time::sleep(sleep_for) => {}
                    () = self.notify.notified() => {}
                    () = shutdown.cancelled() => {
                        info!("scheduler stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn fire(&self, schedule: &Schedule, occurrence: DateTime<Utc>) {
        let request = ExecutionRequest {
            tenant_id: schedule.tenant_id,
            workflow_id: schedule.workflow_id,
            version: None,
            trigger: TriggerKind::Schedule,
            payload: serde_json::json!({ "scheduled_at": occurrence }),
        };
        match self.runner.execute(request).await {
            Ok(execution_id) => {
                info!(schedule = %schedule.id, execution = %execution_id, "schedule fired");
            }
            Err(e) => {
                warn!(schedule = %schedule.id, error = %e, "schedule fire rejected");
            }
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<ScheduleId, Schedule>> {
        match self.schedules.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use chrono::TimeZone;
    use weft_core::{ExecutionId, WorkflowResult};

    use super::*;

    struct RecordingRunner {
        fired: StdMutex<Vec<ExecutionRequest>>,
    }

    #[async_trait::async_trait]
    impl ExecutionRunner for RecordingRunner {
        async fn execute(&self, request: ExecutionRequest) -> WorkflowResult<ExecutionId> {
            self.fired.lock().unwrap().push(request);
            Ok(ExecutionId::new())
        }
    }

    fn schedule(expression: &str, last_fired_at: Option<DateTime<Utc>>) -> Schedule {
        Schedule {
            id: ScheduleId::new(),
            tenant_id: TenantId::new(),
            workflow_id: WorkflowId::new(),
            expression: expression.to_owned(),
            timezone: "UTC".to_owned(),
            active: true,
            last_fired_at,
        }
    }

    #[test]
    fn five_field_expressions_parse() {
        assert!(parse_expression("*/5 * * * *").is_ok());
        assert!(parse_expression("0 9 * * 1-5").is_ok());
        assert!(parse_expression("bogus").is_err());
        assert!(parse_expression("0 9 * * 1-5 2099").is_err());
    }

    #[test]
    fn fire_times_are_monotonic_and_minute_aligned() {
        let after = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 30).unwrap();
        let times = next_fire_times("*/15 * * * *", "UTC", 4, after).unwrap();
        assert_eq!(times.len(), 4);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(times[0], Utc.with_ymd_and_hms(2024, 3, 7, 12, 15, 0).unwrap());
    }

    #[test]
    fn timezones_shift_fire_times() {
        let after = Utc.with_ymd_and_hms(2024, 5, 31, 20, 0, 0).unwrap();
        // 09:00 in Tokyo is 00:00 UTC.
        let tokyo = next_fire_times("0 9 * * *", "Asia/Tokyo", 1, after).unwrap();
        assert_eq!(tokyo[0], Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
        assert!(next_fire_times("0 9 * * *", "Mars/Olympus", 1, after).is_err());
    }

    #[tokio::test]
    async fn missed_fire_catches_up_exactly_once() {
        let runner = Arc::new(RecordingRunner {
            fired: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(Arc::clone(&runner) as Arc<dyn ExecutionRunner>);
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 10).unwrap();
        // Down for an hour: dozens of every-minute occurrences were missed.
        scheduler
            .add_schedule(schedule("* * * * *", Some(now - chrono::Duration::hours(1))))
            .unwrap();

        scheduler.poll_once(now).await;
        assert_eq!(runner.fired.lock().unwrap().len(), 1);
        assert_eq!(
            runner.fired.lock().unwrap()[0].trigger,
            TriggerKind::Schedule
        );

        // Immediately polling again fires nothing; the next occurrence is
        // in the future.
        let next = scheduler.poll_once(now).await;
        assert_eq!(runner.fired.lock().unwrap().len(), 1);
        assert!(next.unwrap() > now);
    }

    #[tokio::test]
    async fn fresh_schedules_wait_for_their_next_occurrence() {
        let runner = Arc::new(RecordingRunner {
            fired: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(Arc::clone(&runner) as Arc<dyn ExecutionRunner>);
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 10).unwrap();
        scheduler.add_schedule(schedule("* * * * *", None)).unwrap();

        let next = scheduler.poll_once(now).await;
        assert!(runner.fired.lock().unwrap().is_empty());
        assert_eq!(next.unwrap(), Utc.with_ymd_and_hms(2024, 3, 7, 12, 1, 0).unwrap());
    }

    #[tokio::test]
    async fn due_schedules_fire_in_monotonic_order() {
        let runner = Arc::new(RecordingRunner {
            fired: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(Arc::clone(&runner) as Arc<dyn ExecutionRunner>);
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 12, 30, 10).unwrap();
        let early = schedule("0 * * * *", Some(now - chrono::Duration::hours(2)));
        let late = schedule("15 * * * *", Some(now - chrono::Duration::minutes(20)));
        let early_workflow = early.workflow_id;
        scheduler.add_schedule(late).unwrap();
        scheduler.add_schedule(early).unwrap();

        scheduler.poll_once(now).await;
        let fired = runner.fired.lock().unwrap();
        assert_eq!(fired.len(), 2);
        // The hourly schedule's missed occurrence (11:00) precedes 12:15.
        assert_eq!(fired[0].workflow_id, early_workflow);
    }

    #[tokio::test]
    async fn inactive_schedules_never_fire() {
        let runner = Arc::new(RecordingRunner {
            fired: StdMutex::new(Vec::new()),
        });
        let scheduler = Scheduler::new(Arc::clone(&runner) as Arc<dyn ExecutionRunner>);
        let now = Utc::now();
        let mut s = schedule("* * * * *", Some(now - chrono::Duration::hours(1)));
        s.active = false;
        scheduler.add_schedule(s).unwrap();

        let next = scheduler.poll_once(now).await;
        assert!(runner.fired.lock().unwrap().is_empty());
        assert!(next.is_none());
    }
}
