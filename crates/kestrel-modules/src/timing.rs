use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use kestrel_context::{ExecutionContext, ModuleResult};
use kestrel_module::{Module, ModuleConfig, ModuleError};
use tracing::debug;

/// Sleep unless the run is stopped first.
async fn sleep_cancellable(ctx: &ExecutionContext, duration: Duration) -> Result<(), ModuleError> {
  let token = ctx.cancellation_token();
  tokio::select! {
    _ = tokio::time::sleep(duration) => Ok(()),
    _ = token.cancelled() => Err(ModuleError::Cancelled),
  }
}

/// `wait`: pause for `duration` in `unit` (`ms` default, `s`, `min`).
pub struct Wait;

#[async_trait]
impl Module for Wait {
  fn module_type(&self) -> &str {
    "wait"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let amount = config.float("duration", 1000.0);
    if !amount.is_finite() || amount < 0.0 {
      return Err(ModuleError::invalid("duration", "must be a non-negative number"));
    }
    let millis = match config.str_or("unit", "ms").as_str() {
      "ms" => amount,
      "s" | "sec" | "seconds" => amount * 1000.0,
      "min" | "minutes" => amount * 60_000.0,
      other => return Err(ModuleError::invalid("unit", format!("unknown unit '{other}'"))),
    };

    let duration = Duration::from_millis(millis.round() as u64);
    sleep_cancellable(ctx, duration).await?;
    Ok(ModuleResult::ok_with(format!("waited {}ms", duration.as_millis())))
  }
}

/// `scheduled_task`: hold the flow until a moment.
///
/// `mode = "delay"` waits `delaySeconds`. `mode = "at"` (default) waits until
/// `time`, either a time of day (`HH:MM` or `HH:MM:SS`, next occurrence) or
/// an RFC 3339 timestamp. Moments in the past continue immediately.
pub struct ScheduledTask;

#[async_trait]
impl Module for ScheduledTask {
  fn module_type(&self) -> &str {
    "scheduled_task"
  }

  async fn execute(&self, config: &ModuleConfig, ctx: &ExecutionContext) -> Result<ModuleResult, ModuleError> {
    let wait = match config.str_or("mode", "at").as_str() {
      "delay" => {
        let seconds = config.float("delaySeconds", 0.0);
        if !seconds.is_finite() || seconds < 0.0 {
          return Err(ModuleError::invalid("delaySeconds", "must be a non-negative number"));
        }
        Duration::from_secs_f64(seconds)
      }
      "at" => {
        let time = config.require_str("time")?;
        until(&time, Local::now())?
      }
      other => return Err(ModuleError::invalid("mode", format!("unknown mode '{other}'"))),
    };

    debug!(node_id = %config.node_id, wait_ms = wait.as_millis() as u64, "scheduled_task_waiting");
    sleep_cancellable(ctx, wait).await?;
    Ok(ModuleResult::ok_with(format!("resumed after {}s", wait.as_secs())))
  }
}

/// Time from `now` until the moment `spec` names.
fn until(spec: &str, now: DateTime<Local>) -> Result<Duration, ModuleError> {
  let spec = spec.trim();
  if let Ok(at) = DateTime::parse_from_rfc3339(spec) {
    return Ok((at.with_timezone(&Local) - now).to_std().unwrap_or(Duration::ZERO));
  }

  let time = NaiveTime::parse_from_str(spec, "%H:%M:%S")
    .or_else(|_| NaiveTime::parse_from_str(spec, "%H:%M"))
    .map_err(|_| ModuleError::invalid("time", format!("'{spec}' is not HH:MM[:SS] or RFC 3339")))?;

  let mut delta = time - now.time();
  if delta < TimeDelta::zero() {
    delta += TimeDelta::days(1);
  }
  Ok(delta.to_std().unwrap_or(Duration::ZERO))
}
