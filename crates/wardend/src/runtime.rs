//! Container runtime driver.
//!
//! The core consumes the [`ContainerRuntime`] trait; the production
//! implementation shells out to the docker CLI. Replicas are clones of the
//! target workload named `<base>-replica-N`, and routing means rewriting the
//! load-balancer's upstream set to the original plus all live replicas.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use warden_common::ContainerInfo;

use crate::config::RuntimeConfig;

/// Operations the remediation pipeline needs from a workload runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Restart a workload; returns its post-restart status.
    async fn restart(&self, name: &str) -> Result<String>;

    /// Spawn `count` replicas of `base`; returns the spawned names.
    async fn scale_to(&self, base: &str, count: u32) -> Result<Vec<String>>;

    /// Remove every replica of `base`; returns the removed names.
    async fn scale_down(&self, base: &str) -> Result<Vec<String>>;

    /// Tail of a workload's logs.
    async fn get_logs(&self, name: &str, tail: u32) -> Result<String>;

    /// All currently running workloads.
    async fn list_running(&self) -> Result<Vec<ContainerInfo>>;

    /// Point the load balancer at `base` plus `replicas`. Returns false when
    /// no load balancer is present (not an error - routing is best-effort).
    async fn reconfigure_routing(&self, base: &str, replicas: &[String]) -> Result<bool>;
}

/// Docker-CLI-backed runtime driver.
pub struct DockerCli {
    network: String,
    lb_container: String,
    workload_port: u16,
}

impl DockerCli {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            network: config.network.clone(),
            lb_container: config.lb_container.clone(),
            workload_port: config.workload_port,
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("docker")
            .args(args)
            .output()
            .await
            .with_context(|| format!("failed to run docker {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "docker {} failed: {}",
                args.first().copied().unwrap_or(""),
                stderr.trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn known_names(&self) -> Vec<String> {
        match self.docker(&["ps", "-a", "--format", "{{.Names}}"]).await {
            Ok(out) => out.lines().map(|l| l.trim().to_string()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn replica_name(base: &str, index: u32) -> String {
    format!("{base}-replica-{index}")
}

pub fn replica_prefix(base: &str) -> String {
    format!("{base}-replica-")
}

/// Render the nginx upstream block for the original workload plus replicas.
pub fn render_upstream_conf(base: &str, replicas: &[String], port: u16) -> String {
    let mut servers = vec![format!("    server {base}:{port};")];
    for r in replicas {
        servers.push(format!("    server {r}:{port};"));
    }
    format!("upstream target_app {{\n{}\n}}\n", servers.join("\n"))
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn restart(&self, name: &str) -> Result<String> {
        info!("Restarting workload '{}'", name);
        if let Err(e) = self.docker(&["restart", "--time", "10", name]).await {
            let available = self.known_names().await;
            return Err(anyhow!(
                "restart of '{}' failed: {} (known workloads: {})",
                name,
                e,
                available.join(", ")
            ));
        }
        let status = self
            .docker(&["inspect", "-f", "{{.State.Status}}", name])
            .await?;
        info!("Workload '{}' is now {}", name, status);
        Ok(status)
    }

    async fn scale_to(&self, base: &str, count: u32) -> Result<Vec<String>> {
        info!("Scaling up: spawning {} replicas of '{}'", count, base);

        let image = self
            .docker(&["inspect", "-f", "{{.Config.Image}}", base])
            .await
            .with_context(|| format!("source workload '{base}' not found for scaling"))?;

        let mut spawned = Vec::new();
        for i in 1..=count {
            let name = replica_name(base, i);

            // Remove a stale replica with the same name before spawning.
            let _ = self.docker(&["rm", "-f", &name]).await;

            match self
                .docker(&[
                    "run",
                    "-d",
                    "--name",
                    &name,
                    "--network",
                    &self.network,
                    "--restart",
                    "unless-stopped",
                    &image,
                ])
                .await
            {
                Ok(_) => {
                    info!("Spawned replica {}", name);
                    spawned.push(name);
                }
                Err(e) => warn!("Failed to spawn {}: {:#}", name, e),
            }
        }

        if spawned.is_empty() && count > 0 {
            return Err(anyhow!("no replicas of '{base}' could be spawned"));
        }
        Ok(spawned)
    }

    async fn scale_down(&self, base: &str) -> Result<Vec<String>> {
        info!("Scaling down: removing replicas of '{}'", base);
        let prefix = replica_prefix(base);
        let mut removed = Vec::new();
        for name in self.known_names().await {
            if name.starts_with(&prefix) {
                match self.docker(&["rm", "-f", &name]).await {
                    Ok(_) => {
                        info!("Removed {}", name);
                        removed.push(name);
                    }
                    Err(e) => warn!("Failed to remove {}: {:#}", name, e),
                }
            }
        }
        Ok(removed)
    }

    async fn get_logs(&self, name: &str, tail: u32) -> Result<String> {
        let output = Command::new("docker")
            .args(["logs", "--tail", &tail.to_string(), "-t", name])
            .output()
            .await
            .context("failed to run docker logs")?;
        // docker writes container output to both streams; keep both.
        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }

    async fn list_running(&self) -> Result<Vec<ContainerInfo>> {
        let out = self
            .docker(&["ps", "--format", "{{.Names}}\t{{.Status}}\t{{.Image}}"])
            .await?;
        Ok(out
            .lines()
            .filter_map(|line| {
                let mut parts = line.splitn(3, '\t');
                Some(ContainerInfo {
                    name: parts.next()?.to_string(),
                    status: parts.next().unwrap_or("unknown").to_string(),
                    image: parts.next().unwrap_or("unknown").to_string(),
                })
            })
            .collect())
    }

    async fn reconfigure_routing(&self, base: &str, replicas: &[String]) -> Result<bool> {
        info!("Reconfiguring load balancer upstreams");

        // Missing LB is a soft miss: log and report unconfigured.
        if self
            .docker(&["inspect", "-f", "{{.State.Status}}", &self.lb_container])
            .await
            .is_err()
        {
            warn!(
                "Load balancer '{}' not found - skipping routing update",
                self.lb_container
            );
            return Ok(false);
        }

        let conf = render_upstream_conf(base, replicas, self.workload_port);

        let mut child = Command::new("docker")
            .args([
                "exec",
                "-i",
                &self.lb_container,
                "sh",
                "-c",
                "cat > /etc/nginx/conf.d/upstream.conf",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to exec into load balancer")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(conf.as_bytes()).await?;
        }
        let status = child.wait().await?;
        if !status.success() {
            return Err(anyhow!("writing upstream config failed"));
        }

        self.docker(&["exec", &self.lb_container, "nginx", "-s", "reload"])
            .await?;
        info!(
            "Load balancer reloaded with {} upstream servers",
            replicas.len() + 1
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_naming() {
        assert_eq!(replica_name("target-app", 1), "target-app-replica-1");
        assert!(replica_name("target-app", 3).starts_with(&replica_prefix("target-app")));
    }

    #[test]
    fn test_upstream_conf_original_only() {
        let conf = render_upstream_conf("target-app", &[], 8000);
        assert!(conf.contains("server target-app:8000;"));
        assert_eq!(conf.matches("server ").count(), 1);
    }

    #[test]
    fn test_upstream_conf_includes_replicas() {
        let replicas = vec![
            "target-app-replica-1".to_string(),
            "target-app-replica-2".to_string(),
        ];
        let conf = render_upstream_conf("target-app", &replicas, 8000);
        assert!(conf.contains("server target-app:8000;"));
        assert!(conf.contains("server target-app-replica-1:8000;"));
        assert!(conf.contains("server target-app-replica-2:8000;"));
        assert_eq!(conf.matches("server ").count(), 3);
    }
}
