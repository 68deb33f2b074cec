use crate::config::{LoadOptions, Scenario};
use crate::performance::metrics::RunMetrics;
use crate::performance::monitor::LoadMonitor;
use crate::performance::{PerformanceResults, Schedule};
use crate::runner::data::user_for_vu;
use crate::runner::executor::extract_json_path;
use crate::runner::{RequestExecutor, User, VariableContext};
use crate::utils::{excerpt, format_duration};
use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

const CONTROLLER_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DriverState {
    target: u64,
    stopping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterationEnd {
    Completed,
    Aborted,
}

/// Everything a VU needs, shared across all of them.
struct VuShared {
    scenario: Arc<Scenario>,
    users: Arc<Vec<User>>,
    vars: VariableContext,
    executor: RequestExecutor,
    metrics: Arc<Mutex<RunMetrics>>,
    in_flight: AtomicU64,
}

pub struct LoadDriver {
    executor: RequestExecutor,
    schedule: Schedule,
    graceful_stop: Duration,
    tick: Duration,
    show_progress: bool,
}

impl LoadDriver {
    pub fn new(options: &LoadOptions, request_timeout: Duration, insecure: bool) -> Result<Self> {
        let executor = RequestExecutor::new(request_timeout, insecure)?;

        Ok(Self {
            executor,
            schedule: Schedule::from_options(options),
            graceful_stop: options.graceful_stop(),
            tick: CONTROLLER_TICK,
            show_progress: false,
        })
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub async fn run(
        &self,
        scenario: Arc<Scenario>,
        users: Arc<Vec<User>>,
        vars: VariableContext,
    ) -> Result<PerformanceResults> {
        let total = self.schedule.total_duration();
        if total.is_zero() {
            anyhow::bail!("Scenario '{}' has no load to apply", scenario.name);
        }

        info!(
            scenario = %scenario.name,
            duration = %format_duration(total),
            max_vus = self.schedule.max_target(),
            "starting load"
        );

        let metrics = Arc::new(Mutex::new(RunMetrics::new(
            &scenario.name,
            &scenario.metrics.prefix,
        )));
        let shared = Arc::new(VuShared {
            scenario,
            users,
            vars,
            executor: self.executor.clone(),
            metrics: Arc::clone(&metrics),
            in_flight: AtomicU64::new(0),
        });

        let monitor = self
            .show_progress
            .then(|| LoadMonitor::start(Arc::clone(&metrics), self.schedule.clone()));

        let (state_tx, state_rx) = watch::channel(DriverState {
            target: 0,
            stopping: false,
        });
        let mut vus: Vec<JoinHandle<()>> = Vec::new();

        let start = Instant::now();
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let elapsed = start.elapsed();
            if self.schedule.is_done(elapsed) {
                break;
            }

            let target = self.schedule.target_at(elapsed);
            state_tx.send_if_modified(|state| {
                if state.target != target {
                    trace!(target, "VU target changed");
                    state.target = target;
                    true
                } else {
                    false
                }
            });

            while (vus.len() as u64) < target {
                let vu = vus.len() as u64 + 1;
                debug!(vu, "starting VU");
                vus.push(tokio::spawn(run_vu(
                    vu,
                    Arc::clone(&shared),
                    state_rx.clone(),
                )));
            }

            metrics.lock().await.set_active_vus(target);
        }

        state_tx.send_modify(|state| state.stopping = true);
        self.drain(vus, &shared).await;

        metrics.lock().await.set_active_vus(0);
        if let Some(monitor) = monitor {
            monitor.finish();
        }

        let results = metrics.lock().await.calculate_results();
        info!(
            requests = results.http_reqs,
            iterations = results.iterations,
            duration = %format_duration(results.total_duration),
            "load finished"
        );
        Ok(results)
    }

    /// Waits for in-flight iterations up to the graceful stop, then aborts.
    async fn drain(&self, vus: Vec<JoinHandle<()>>, shared: &VuShared) {
        if vus.is_empty() {
            return;
        }

        debug!(
            vus = vus.len(),
            graceful_stop = %format_duration(self.graceful_stop),
            "waiting for VUs to finish their iteration"
        );
        let aborts: Vec<_> = vus.iter().map(|handle| handle.abort_handle()).collect();

        match tokio::time::timeout(self.graceful_stop, futures::future::join_all(vus)).await {
            Ok(joined) => {
                for result in joined {
                    if let Err(e) = result {
                        warn!(error = %e, "VU task failed");
                    }
                }
            }
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                let interrupted = shared.in_flight.swap(0, Ordering::SeqCst);
                warn!(interrupted, "graceful stop expired, interrupting iterations");
                shared.metrics.lock().await.record_interrupted(interrupted);
            }
        }
    }
}

async fn run_vu(vu: u64, shared: Arc<VuShared>, mut state: watch::Receiver<DriverState>) {
    let mut iteration = 0u64;
    if let Some(user) = user_for_vu(&shared.users, vu) {
        debug!(vu, login = %user.login, "VU assigned user");
    }

    loop {
        let current = *state.borrow_and_update();
        if current.stopping {
            break;
        }
        if vu > current.target {
            // Parked until the target rises or the run stops.
            if state.changed().await.is_err() {
                break;
            }
            continue;
        }

        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let end = run_iteration(vu, iteration, &shared).await;
        shared.in_flight.fetch_sub(1, Ordering::SeqCst);

        shared
            .metrics
            .lock()
            .await
            .record_iteration(started.elapsed());
        trace!(vu, iteration, ?end, "iteration finished");
        iteration += 1;
    }

    debug!(vu, iterations = iteration, "VU stopped");
}

async fn run_iteration(vu: u64, iteration: u64, shared: &VuShared) -> IterationEnd {
    let mut context = shared.vars.clone().with_iteration(vu, iteration);
    if let Some(user) = user_for_vu(&shared.users, vu) {
        context = context.with_user(user);
    }

    for step in &shared.scenario.steps {
        let outcome = shared.executor.execute_step(step, &context).await;
        let check = step.check.as_ref().map(|c| c.passes(outcome.status));

        let mut missing = Vec::new();
        for (var, path) in &step.extract {
            match outcome
                .body
                .as_deref()
                .and_then(|body| extract_json_path(body, path))
            {
                Some(value) => context.set(var.clone(), value),
                None => missing.push(var.as_str()),
            }
        }

        let failed = check == Some(false) || !missing.is_empty();
        {
            let mut metrics = shared.metrics.lock().await;
            metrics.record_request(step, &outcome);
            if let (Some(name), Some(passed)) = (step.check_name(), check) {
                metrics.record_check(&name, passed);
            }
            if failed {
                metrics.record_error();
            }
        }

        if let Some(error) = &outcome.error {
            warn!(vu, step = %step.name, error = %error, "request failed");
        } else if check == Some(false) {
            warn!(
                vu,
                step = %step.name,
                status = outcome.status,
                body = %excerpt(outcome.body.as_deref().unwrap_or(""), 200),
                "check failed"
            );
        }
        if !missing.is_empty() {
            warn!(vu, step = %step.name, vars = ?missing, "value not found in response");
        }

        if failed && step.abort_on_failure {
            debug!(vu, iteration, step = %step.name, "aborting iteration");
            return IterationEnd::Aborted;
        }

        if let Some(pause) = step.sleep {
            sleep(pause.get()).await;
        }
    }

    IterationEnd::Completed
}
