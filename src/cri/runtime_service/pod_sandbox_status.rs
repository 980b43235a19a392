use crate::cri::{
    api::{PodSandboxMetadata, PodSandboxNetworkStatus, PodSandboxState, PodSandboxStatus, PodSandboxStatusRequest, PodSandboxStatusResponse},
    cri_service::{CRIService, OptionStatus},
};
use crate::sandbox::record::SandboxState;
use std::collections::HashMap;
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_pod_sandbox_status returns the status of the PodSandbox. If the PodSandbox is not
    /// present, returns an error.
    pub async fn handle_pod_sandbox_status(
        &self,
        request: Request<PodSandboxStatusRequest>,
    ) -> Result<Response<PodSandboxStatusResponse>, Status> {
        let inner = request.into_inner();
        let sandboxes = self.sandboxes.read().await;
        let record = sandboxes
            .get(&inner.pod_sandbox_id)
            .ok_or_invalid(format!("pod sandbox {} not found", inner.pod_sandbox_id))?;

        let state = match record.state() {
            SandboxState::Ready => PodSandboxState::SandboxReady,
            SandboxState::NotReady => PodSandboxState::SandboxNotready,
        };

        let status = PodSandboxStatus {
            id: record.id().clone(),
            metadata: Some(PodSandboxMetadata {
                name: record.name().clone(),
                uid: record.uid().clone(),
                namespace: record.namespace().clone(),
                attempt: record.attempt(),
            }),
            state: state as i32,
            created_at: record.created_at(),
            network: Some(PodSandboxNetworkStatus {
                ip: record.ip().clone(),
                additional_ips: vec![],
            }),
            labels: record.labels().clone(),
            annotations: record.annotations().clone(),
        };

        Ok(Response::new(PodSandboxStatusResponse {
            status: Some(status),
            info: HashMap::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::runtime_service_server::RuntimeService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn pod_sandbox_status_unknown_is_not_found() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = PodSandboxStatusRequest {
            pod_sandbox_id: "does-not-exist".into(),
            verbose: false,
        };
        let response = sut.pod_sandbox_status(Request::new(request)).await;
        assert!(response.is_err());
        Ok(())
    }
}
