use crate::cri::{
    api::{RemovePodSandboxRequest, RemovePodSandboxResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_remove_pod_sandbox removes the sandbox. If there are any running containers in the
    /// sandbox, they must be forcibly terminated and removed.  This call is idempotent, and must
    /// not return an error if the sandbox has already been removed.
    pub async fn handle_remove_pod_sandbox(
        &self,
        request: Request<RemovePodSandboxRequest>,
    ) -> Result<Response<RemovePodSandboxResponse>, Status> {
        let inner = request.into_inner();
        self.remove_pod_sandbox(&inner.pod_sandbox_id).await?;
        Ok(Response::new(RemovePodSandboxResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::runtime_service_server::RuntimeService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn remove_pod_sandbox_unknown_is_noop() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = RemovePodSandboxRequest {
            pod_sandbox_id: "does-not-exist".into(),
        };
        sut.remove_pod_sandbox(Request::new(request)).await?;
        Ok(())
    }
}
