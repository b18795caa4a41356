//! Action executor: maps an approved diagnosis onto the runtime driver.
//!
//! The match over [`ActionKind`] is exhaustive on purpose - a new action is
//! a compile error until it gets an arm here. Destructive operations are
//! never retried automatically; the single scale-up -> restart fallback is
//! the only second attempt anywhere in the pipeline.

use tracing::{info, warn};
use warden_common::{ActionKind, Diagnosis};

use crate::errors::PipelineError;
use crate::runtime::ContainerRuntime;

/// What execution did, for the orchestrator's timeline and the run record.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub replicas_spawned: u32,
    pub routing_updated: bool,
    pub fallback_restart_used: bool,
    /// No change was made, so there is nothing to health-check.
    pub skip_verification: bool,
    /// The run can go straight to RESOLVED (noop only).
    pub resolved_immediately: bool,
    /// Human-readable notes for the timeline, in order of occurrence.
    pub notes: Vec<String>,
}

/// Execute the diagnosed action against `target`.
pub async fn execute(
    diagnosis: &Diagnosis,
    target: &str,
    runtime: &dyn ContainerRuntime,
    max_replicas: u32,
) -> Result<ExecutionReport, PipelineError> {
    let mut report = ExecutionReport::default();

    match diagnosis.action {
        ActionKind::Restart => {
            let status = runtime.restart(target).await.map_err(|e| {
                PipelineError::Execution {
                    action: ActionKind::Restart,
                    detail: format!("{e:#}"),
                }
            })?;
            report.notes.push(format!("Workload status: {status}"));
        }

        ActionKind::ScaleUp => {
            let count = diagnosis.replica_count.min(max_replicas);
            match runtime.scale_to(target, count).await {
                Ok(replicas) => {
                    report.replicas_spawned = replicas.len() as u32;
                    report.notes.push(format!("Spawned: {replicas:?}"));

                    match runtime.reconfigure_routing(target, &replicas).await {
                        Ok(true) => {
                            report.routing_updated = true;
                            report.notes.push("Load balancer updated".to_string());
                        }
                        Ok(false) => report
                            .notes
                            .push("Load balancer absent - routing unchanged".to_string()),
                        Err(e) => {
                            warn!("Routing update failed: {:#}", e);
                            report
                                .notes
                                .push(format!("Routing update failed: {e:#}"));
                        }
                    }
                }
                Err(scale_err) => {
                    // One fallback, never a second scaling attempt.
                    warn!("Scaling failed: {:#} - falling back to restart", scale_err);
                    report
                        .notes
                        .push(format!("Scaling error: {scale_err:#}, falling back to restart"));
                    match runtime.restart(target).await {
                        Ok(_) => {
                            report.fallback_restart_used = true;
                            report
                                .notes
                                .push("Workload restarted (scale fallback)".to_string());
                        }
                        Err(restart_err) => {
                            return Err(PipelineError::Execution {
                                action: ActionKind::ScaleUp,
                                detail: format!(
                                    "scale failed: {scale_err:#}; restart fallback failed: {restart_err:#}"
                                ),
                            });
                        }
                    }
                }
            }
        }

        ActionKind::ScaleDown => {
            // The service was presumably already healthy; failures here are
            // logged but never end the run.
            match runtime.scale_down(target).await {
                Ok(removed) => report.notes.push(format!("Removed replicas: {removed:?}")),
                Err(e) => {
                    warn!("Scale down failed: {:#}", e);
                    report.notes.push(format!("Scale down failed: {e:#}"));
                }
            }
            if let Err(e) = runtime.reconfigure_routing(target, &[]).await {
                warn!("Routing reset failed: {:#}", e);
            }
        }

        ActionKind::Rollback => {
            return Err(PipelineError::Execution {
                action: ActionKind::Rollback,
                detail: "rollback requires external deployment tooling; no runtime action taken"
                    .to_string(),
            });
        }

        ActionKind::Noop => {
            info!("No action required for '{}'", target);
            report.notes.push("No action required.".to_string());
            report.skip_verification = true;
            report.resolved_immediately = true;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use warden_common::ContainerInfo;

    #[derive(Default)]
    struct MockRuntime {
        restart_calls: AtomicU32,
        scale_calls: AtomicU32,
        scale_down_calls: AtomicU32,
        routing_calls: AtomicU32,
        fail_restart: bool,
        fail_scale: bool,
        fail_scale_down: bool,
    }

    #[async_trait]
    impl ContainerRuntime for MockRuntime {
        async fn restart(&self, _name: &str) -> Result<String> {
            self.restart_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_restart {
                Err(anyhow!("no such container"))
            } else {
                Ok("running".to_string())
            }
        }

        async fn scale_to(&self, base: &str, count: u32) -> Result<Vec<String>> {
            self.scale_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_scale {
                Err(anyhow!("image pull failed"))
            } else {
                Ok((1..=count).map(|i| format!("{base}-replica-{i}")).collect())
            }
        }

        async fn scale_down(&self, _base: &str) -> Result<Vec<String>> {
            self.scale_down_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_scale_down {
                Err(anyhow!("daemon unreachable"))
            } else {
                Ok(vec!["target-app-replica-1".to_string()])
            }
        }

        async fn get_logs(&self, _name: &str, _tail: u32) -> Result<String> {
            Ok(String::new())
        }

        async fn list_running(&self) -> Result<Vec<ContainerInfo>> {
            Ok(Vec::new())
        }

        async fn reconfigure_routing(&self, _base: &str, _replicas: &[String]) -> Result<bool> {
            self.routing_calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    fn diagnosis(action: ActionKind, replicas: u32) -> Diagnosis {
        Diagnosis {
            root_cause: "test".to_string(),
            action,
            justification: "test".to_string(),
            confidence: 0.9,
            replica_count: replicas,
        }
    }

    #[tokio::test]
    async fn test_noop_touches_nothing() {
        let runtime = MockRuntime::default();
        let report = execute(&diagnosis(ActionKind::Noop, 0), "target-app", &runtime, 5)
            .await
            .unwrap();
        assert!(report.resolved_immediately);
        assert!(report.skip_verification);
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.scale_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.routing_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restart_success() {
        let runtime = MockRuntime::default();
        let report = execute(&diagnosis(ActionKind::Restart, 0), "target-app", &runtime, 5)
            .await
            .unwrap();
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 1);
        assert!(!report.skip_verification);
    }

    #[tokio::test]
    async fn test_restart_failure_is_fatal() {
        let runtime = MockRuntime {
            fail_restart: true,
            ..Default::default()
        };
        let err = execute(&diagnosis(ActionKind::Restart, 0), "target-app", &runtime, 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Execution {
                action: ActionKind::Restart,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_scale_up_caps_at_max_replicas() {
        let runtime = MockRuntime::default();
        let report = execute(&diagnosis(ActionKind::ScaleUp, 9), "target-app", &runtime, 5)
            .await
            .unwrap();
        assert_eq!(report.replicas_spawned, 5);
        assert!(report.routing_updated);
        assert_eq!(runtime.routing_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scale_failure_falls_back_to_one_restart() {
        let runtime = MockRuntime {
            fail_scale: true,
            ..Default::default()
        };
        let report = execute(&diagnosis(ActionKind::ScaleUp, 3), "target-app", &runtime, 5)
            .await
            .unwrap();
        assert!(report.fallback_restart_used);
        assert_eq!(report.replicas_spawned, 0);
        assert_eq!(runtime.scale_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scale_and_fallback_both_failing_is_fatal_with_both_errors() {
        let runtime = MockRuntime {
            fail_scale: true,
            fail_restart: true,
            ..Default::default()
        };
        let err = execute(&diagnosis(ActionKind::ScaleUp, 3), "target-app", &runtime, 5)
            .await
            .unwrap_err();
        match err {
            PipelineError::Execution { action, detail } => {
                assert_eq!(action, ActionKind::ScaleUp);
                assert!(detail.contains("image pull failed"));
                assert!(detail.contains("no such container"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // Scaling must never be attempted twice for one run.
        assert_eq!(runtime.scale_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scale_down_failure_is_non_fatal() {
        let runtime = MockRuntime {
            fail_scale_down: true,
            ..Default::default()
        };
        let report = execute(&diagnosis(ActionKind::ScaleDown, 0), "target-app", &runtime, 5)
            .await
            .unwrap();
        assert!(!report.resolved_immediately);
        assert_eq!(runtime.scale_down_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rollback_is_unsupported_by_the_driver() {
        let runtime = MockRuntime::default();
        let err = execute(&diagnosis(ActionKind::Rollback, 0), "target-app", &runtime, 5)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Execution {
                action: ActionKind::Rollback,
                ..
            }
        ));
        assert_eq!(runtime.restart_calls.load(Ordering::SeqCst), 0);
    }
}
