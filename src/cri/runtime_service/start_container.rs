use crate::cri::{
    api::{StartContainerRequest, StartContainerResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_start_container starts the container.
    pub async fn handle_start_container(
        &self,
        request: Request<StartContainerRequest>,
    ) -> Result<Response<StartContainerResponse>, Status> {
        let inner = request.into_inner();
        self.start_container(&inner.container_id).await?;
        Ok(Response::new(StartContainerResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::runtime_service_server::RuntimeService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn start_container_fail_unknown() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = StartContainerRequest {
            container_id: "does-not-exist".into(),
        };
        let response = sut.start_container(Request::new(request)).await;
        assert!(response.is_err());
        Ok(())
    }
}
