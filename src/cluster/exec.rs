//! Remote command execution inside store pods.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::AttachParams;
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, instrument};

use super::{ClusterError, InstanceRef};

/// Captured output of a command that exited successfully.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs an argument vector inside a pod's primary container.
///
/// Calls block until the remote process exits. No stdin is attached.
#[async_trait]
pub trait RemoteCommandExecutor: Send + Sync {
    async fn exec(
        &self,
        instance: &InstanceRef,
        argv: &[String],
    ) -> Result<ExecOutput, ClusterError>;
}

/// Executor using the pod `exec` subresource over a websocket.
#[derive(Clone)]
pub struct PodExecutor {
    client: Client,
}

impl PodExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteCommandExecutor for PodExecutor {
    #[instrument(skip(self, argv), fields(pod = %instance, command = ?argv.first()))]
    async fn exec(
        &self,
        instance: &InstanceRef,
        argv: &[String],
    ) -> Result<ExecOutput, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &instance.namespace);
        let pod = pods
            .get_opt(&instance.name)
            .await?
            .ok_or_else(|| ClusterError::NotFound(instance.clone()))?;

        let container = primary_container(&pod, &instance.name).ok_or_else(|| {
            exec_error(instance, "pod has no containers", String::new(), String::new())
        })?;

        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut process = pods
            .exec(&instance.name, argv.to_vec(), &params)
            .await
            .map_err(|e| exec_error(instance, &e.to_string(), String::new(), String::new()))?;

        let stdout = process.stdout();
        let stderr = process.stderr();
        let status = process.take_status();

        let (stdout, stderr) = tokio::join!(read_stream(stdout), read_stream(stderr));
        let status = match status {
            Some(status) => status.await,
            None => None,
        };

        if let Err(e) = process.join().await {
            return Err(exec_error(instance, &e.to_string(), stdout, stderr));
        }

        // The API server reports a failed Status for non-zero exits.
        if let Some(status) = status
            && status.status.as_deref() == Some("Failure")
        {
            let message = status
                .message
                .unwrap_or_else(|| "command exited with failure".to_string());
            return Err(exec_error(instance, &message, stdout, stderr));
        }

        debug!(stdout = %stdout, stderr = %stderr, "Command completed");
        Ok(ExecOutput { stdout, stderr })
    }
}

fn exec_error(instance: &InstanceRef, message: &str, stdout: String, stderr: String) -> ClusterError {
    ClusterError::Exec {
        instance: instance.clone(),
        message: message.to_string(),
        stdout,
        stderr,
    }
}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!(error = %e, "Exec stream closed early");
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// The StatefulSet a pod belongs to, taken from its name (`<sts>-<ordinal>`).
pub fn owning_statefulset(pod_name: &str) -> Option<&str> {
    let (base, ordinal) = pod_name.rsplit_once('-')?;
    (!base.is_empty() && !ordinal.is_empty() && ordinal.chars().all(|c| c.is_ascii_digit()))
        .then_some(base)
}

/// Store containers are named after their StatefulSet. Falls back to the
/// first container when no container carries that name.
pub fn primary_container<'a>(pod: &'a Pod, pod_name: &str) -> Option<&'a str> {
    let containers = &pod.spec.as_ref()?.containers;
    let preferred = owning_statefulset(pod_name);
    containers
        .iter()
        .find(|c| Some(c.name.as_str()) == preferred)
        .or_else(|| containers.first())
        .map(|c| c.name.as_str())
}
