//! Connectivity probe of the tunnel between control plane and shoot.
//!
//! The API server reaches kubelets and webhooks in the shoot through a
//! tunnel pod. Opening a port-forward to that pod through the shoot's API
//! server proves that the connection in that direction works.

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::health::is_pod_running;

/// Default time allowed for establishing the tunnel probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while probing the tunnel
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Port-forward to tunnel pod did not open a stream for port {0}")]
    NoStream(u16),

    #[error("Tunnel probe did not complete within {0:?}")]
    Timeout(Duration),
}

/// First tunnel pod that is running with all containers started.
pub fn running_tunnel_pod(pods: &[Pod]) -> Option<&Pod> {
    pods.iter().find(|p| is_pod_running(p))
}

/// Open a port-forward to `pod_name` and close it again.
pub async fn probe(
    pods: &Api<Pod>,
    pod_name: &str,
    port: u16,
    timeout: Duration,
) -> Result<(), TunnelError> {
    let attempt = async {
        let mut forwarder = pods.portforward(pod_name, &[port]).await?;
        let mut stream = forwarder
            .take_stream(port)
            .ok_or(TunnelError::NoStream(port))?;

        tracing::debug!(pod = %pod_name, port, "Tunnel port-forward established");

        stream.shutdown().await?;
        drop(stream);
        forwarder.abort();
        Ok(())
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| TunnelError::Timeout(timeout))?
}
