//! Docker container-based execution
//!
//! Stages untrusted code into a per-request temp directory, runs it in an
//! ephemeral container with a fixed resource envelope and no network, and
//! drains output live so partial output survives timeouts and OOM kills.
//! The container is force-removed on every exit path.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::ResourcesUlimits;
use bollard::service::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audit::{AuditLog, AuditRecord};
use crate::config::SandboxConfig;
use crate::error::{Error, Result};
use crate::sandbox::executor::{CodeExecutor, ExecutionRequest, ExecutionResult};

/// Mount point of the staged code inside the container
const CODE_MOUNT: &str = "/code";

/// Mount point of the shared read-only library volume
const LIBS_MOUNT: &str = "/opt/libs";

/// Docker container executor
pub struct ContainerExecutor {
    /// Docker client
    docker: Docker,
    /// Sandbox configuration
    config: SandboxConfig,
    /// Memory cap in bytes, parsed once from the configured string
    memory_bytes: i64,
    /// Images already confirmed present locally
    verified_images: Mutex<HashSet<String>>,
    /// Best-effort execution log
    audit: Option<AuditLog>,
}

impl ContainerExecutor {
    /// Create a new container executor and verify the Docker connection
    pub async fn new(config: &SandboxConfig, audit: Option<AuditLog>) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::Container(format!("Failed to connect to Docker: {}", e)))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::Container(format!("Docker ping failed: {}", e)))?;

        info!("Container executor connected to Docker");

        let memory_bytes = parse_memory_limit(&config.memory_limit).ok_or_else(|| {
            Error::Config(format!("Invalid memory limit: {}", config.memory_limit))
        })?;

        Ok(ContainerExecutor {
            docker,
            config: config.clone(),
            memory_bytes,
            verified_images: Mutex::new(HashSet::new()),
            audit,
        })
    }

    /// Ensure `image` is available locally, pulling it on first use
    async fn ensure_image(&self, image: &str) -> Result<()> {
        {
            let verified = self
                .verified_images
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if verified.contains(image) {
                return Ok(());
            }
        }

        let images = self
            .docker
            .list_images::<String>(None)
            .await
            .map_err(|e| Error::Container(format!("Failed to list images: {}", e)))?;

        let image_exists = images
            .iter()
            .any(|img| img.repo_tags.iter().any(|tag| tag == image));

        if !image_exists {
            info!("Pulling Docker image: {}", image);

            let options = CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            };

            let mut stream = self.docker.create_image(Some(options), None, None);

            while let Some(result) = stream.next().await {
                match result {
                    Ok(progress) => {
                        if let Some(status) = progress.status {
                            debug!("Pull status: {}", status);
                        }
                    }
                    Err(e) => {
                        return Err(Error::Container(format!(
                            "Failed to pull image {}: {}",
                            image, e
                        )));
                    }
                }
            }

            info!("Image {} pulled successfully", image);
        }

        self.verified_images
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(image.to_string());

        Ok(())
    }

    /// Write the request's code into a fresh, request-owned temp directory.
    /// The returned `TempDir` deletes the directory when dropped.
    async fn stage_code(&self, request: &ExecutionRequest) -> Result<(TempDir, String)> {
        let dir = tempfile::Builder::new()
            .prefix("codebox-exec-")
            .tempdir()
            .map_err(|e| Error::Staging(format!("Failed to create staging dir: {}", e)))?;

        let file_name = request.language.file_name();
        tokio::fs::write(dir.path().join(&file_name), request.code.as_bytes())
            .await
            .map_err(|e| Error::Staging(format!("Failed to write code file: {}", e)))?;

        let host_path = dir
            .path()
            .to_str()
            .ok_or_else(|| Error::Staging("Staging path is not valid UTF-8".to_string()))?
            .to_string();

        Ok((dir, host_path))
    }

    /// Stage, launch, race against the deadline, and tear down
    async fn run_container(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let start = Instant::now();
        let profile = request.language.profile();

        let (staging_dir, staging_path) = self.stage_code(request).await?;

        if self.config.pull_images {
            self.ensure_image(profile.image).await?;
        }

        let container_name = format!("codebox-exec-{}", uuid::Uuid::new_v4());
        let container_config = Config {
            image: Some(profile.image.to_string()),
            cmd: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                request.language.entry_command(),
            ]),
            working_dir: Some(CODE_MOUNT.to_string()),
            network_disabled: Some(self.config.network == "none"),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(resource_envelope(
                &self.config,
                self.memory_bytes,
                &staging_path,
            )),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| Error::Container(format!("Failed to create container: {}", e)))?;

        // From here on the container exists; the guard guarantees removal
        // even if this future is dropped mid-flight.
        let mut guard = ContainerGuard::new(self.docker.clone(), created.id.clone());

        debug!("Created container {} ({})", container_name, created.id);

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Container(format!("Failed to start container: {}", e)))?;

        // Drain logs concurrently with the wait so neither stream can block
        // the child and partial output survives a kill.
        let drain = spawn_log_drain(
            self.docker.clone(),
            created.id.clone(),
            self.config.max_output_bytes,
        );

        let wait_outcome =
            tokio::time::timeout(request.timeout, self.wait_for_exit(&created.id)).await;
        let execution_time = start.elapsed();

        let result = match wait_outcome {
            Ok(Ok(exit_code)) => {
                // The container exited on its own; the follow stream ends
                // with it, so collect the buffers before removing.
                let (stdout, stderr) = join_drain(drain).await;
                guard.release().await;
                Ok(ExecutionResult::completed(
                    exit_code,
                    stdout,
                    stderr,
                    execution_time,
                    created.id.clone(),
                ))
            }
            Ok(Err(e)) => {
                guard.release().await;
                join_drain(drain).await;
                Err(e)
            }
            Err(_) => {
                warn!(
                    "Execution timed out after {:?} in container {}",
                    request.timeout, created.id
                );
                // Force-removal kills the unit, which also terminates the
                // follow stream; whatever was drained so far is kept.
                guard.release().await;
                let (stdout, stderr) = join_drain(drain).await;
                Ok(ExecutionResult::timeout(
                    stdout,
                    stderr,
                    request.timeout,
                    created.id.clone(),
                ))
            }
        };

        // Staged code outlives the container, never the request.
        drop(staging_dir);

        result
    }

    /// Wait for the container to reach a terminal state and return its exit
    /// code
    async fn wait_for_exit(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits surface as a typed wait error on some daemon
            // versions; the code is still the user's exit status.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(Error::Execution(format!("Container wait failed: {}", e))),
            None => Err(Error::Execution(
                "Container wait stream ended unexpectedly".to_string(),
            )),
        }
    }
}

#[async_trait]
impl CodeExecutor for ContainerExecutor {
    fn name(&self) -> &str {
        "container"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;

        let outcome = self.run_container(&request).await;

        if let Some(audit) = &self.audit {
            audit.record(&AuditRecord::from_outcome(&request, &outcome)).await;
        }

        outcome
    }

    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| Error::Container(format!("Docker ping failed: {}", e)))?;
        Ok(())
    }
}

/// Owns a created container and guarantees force-removal.
///
/// `release` removes the container and disarms the guard. If the guard is
/// dropped while still armed (caller cancellation, or an early return
/// between create and teardown), removal is spawned onto the runtime so the
/// unit never outlives its request.
struct ContainerGuard {
    docker: Docker,
    id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, id: String) -> Self {
        ContainerGuard {
            docker,
            id,
            armed: true,
        }
    }

    async fn release(&mut self) {
        self.armed = false;
        remove_container(&self.docker, &self.id).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if self.armed {
            let docker = self.docker.clone();
            let id = std::mem::take(&mut self.id);
            tokio::spawn(async move {
                remove_container(&docker, &id).await;
            });
        }
    }
}

/// Force-remove a container. Failures are logged, never propagated — a
/// teardown warning must not mask the primary result.
async fn remove_container(docker: &Docker, id: &str) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };

    match docker.remove_container(id, Some(options)).await {
        Ok(()) => debug!("Removed container {}", id),
        Err(e) => warn!("Failed to remove container {}: {}", id, e),
    }
}

/// Build the fixed resource envelope for one execution
fn resource_envelope(config: &SandboxConfig, memory_bytes: i64, staging_dir: &str) -> HostConfig {
    HostConfig {
        memory: Some(memory_bytes),
        // Swap equal to memory: no overcommit beyond the cap
        memory_swap: Some(memory_bytes),
        nano_cpus: Some((config.cpu_limit * 1_000_000_000.0) as i64),
        pids_limit: Some(config.pids_limit),
        ulimits: Some(vec![
            ResourcesUlimits {
                name: Some("nproc".to_string()),
                soft: Some(config.nproc_limit),
                hard: Some(config.nproc_limit),
            },
            ResourcesUlimits {
                name: Some("nofile".to_string()),
                soft: Some(config.nofile_limit),
                hard: Some(config.nofile_limit),
            },
        ]),
        network_mode: Some(config.network.clone()),
        binds: Some(vec![
            format!("{}:{}", staging_dir, CODE_MOUNT),
            format!("{}:{}:ro", config.library_volume.display(), LIBS_MOUNT),
        ]),
        auto_remove: Some(false), // removed explicitly after the log drain
        ..Default::default()
    }
}

/// Drain the container's multiplexed log stream into owned buffers from the
/// moment it starts, capped at `max_bytes` per stream
fn spawn_log_drain(docker: Docker, id: String, max_bytes: usize) -> JoinHandle<(String, String)> {
    tokio::spawn(async move {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stream = docker.logs(&id, Some(options));
        let mut stdout = String::new();
        let mut stderr = String::new();

        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message }) => {
                    append_capped(&mut stdout, &message, max_bytes)
                }
                Ok(LogOutput::StdErr { message }) => {
                    append_capped(&mut stderr, &message, max_bytes)
                }
                Ok(_) => {}
                Err(e) => {
                    // The stream ends with an error when the container is
                    // force-removed mid-run; keep what was captured.
                    debug!("Log stream for {} ended: {}", id, e);
                    break;
                }
            }
        }

        (stdout, stderr)
    })
}

async fn join_drain(drain: JoinHandle<(String, String)>) -> (String, String) {
    match drain.await {
        Ok(buffers) => buffers,
        Err(e) => {
            warn!("Log drain task failed: {}", e);
            (String::new(), String::new())
        }
    }
}

/// Append a log chunk to `buf`, truncating at `cap` on a char boundary
fn append_capped(buf: &mut String, message: &[u8], cap: usize) {
    if buf.len() >= cap {
        return;
    }
    let text = String::from_utf8_lossy(message);
    let remaining = cap - buf.len();
    if text.len() > remaining {
        let mut end = remaining;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        buf.push_str(&text[..end]);
    } else {
        buf.push_str(&text);
    }
}

/// Parse a memory limit string (e.g., "512m", "1g") to bytes
fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.to_lowercase();
    let (num_str, unit) = if limit.ends_with('g') || limit.ends_with("gb") {
        (limit.trim_end_matches(|c| c == 'g' || c == 'b'), "g")
    } else if limit.ends_with('m') || limit.ends_with("mb") {
        (limit.trim_end_matches(|c| c == 'm' || c == 'b'), "m")
    } else if limit.ends_with('k') || limit.ends_with("kb") {
        (limit.trim_end_matches(|c| c == 'k' || c == 'b'), "k")
    } else {
        (limit.as_str(), "b")
    };

    let num: i64 = num_str.parse().ok()?;

    Some(match unit {
        "g" => num * 1024 * 1024 * 1024,
        "m" => num * 1024 * 1024,
        "k" => num * 1024,
        _ => num,
    })
}
