use crate::cri::{
    api::{StopPodSandboxRequest, StopPodSandboxResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_stop_pod_sandbox stops any running process that is part of the sandbox and reclaims
    /// network resources (e.g., IP addresses) allocated to the sandbox. If there are any running
    /// containers in the sandbox, they must be forcibly terminated. This call is idempotent, and
    /// must not return an error if all relevant resources have already been reclaimed. kubelet
    /// will call StopPodSandbox at least once before calling RemovePodSandbox. It will also
    /// attempt to reclaim resources eagerly, as soon as a sandbox is not needed. Hence, multiple
    /// StopPodSandbox calls are expected.
    pub async fn handle_stop_pod_sandbox(
        &self,
        request: Request<StopPodSandboxRequest>,
    ) -> Result<Response<StopPodSandboxResponse>, Status> {
        let inner = request.into_inner();
        self.stop_pod_sandbox(&inner.pod_sandbox_id).await?;
        Ok(Response::new(StopPodSandboxResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::runtime_service_server::RuntimeService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn stop_pod_sandbox_unknown_is_noop() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = StopPodSandboxRequest {
            pod_sandbox_id: "does-not-exist".into(),
        };
        sut.stop_pod_sandbox(Request::new(request)).await?;
        Ok(())
    }
}
