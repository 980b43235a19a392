use crate::cri::{
    api::{RemoveContainerRequest, RemoveContainerResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_remove_container removes the container. If the container is running, the container
    /// must be forcibly removed. This call is idempotent, and must not return an error if the
    /// container has already been removed.
    pub async fn handle_remove_container(
        &self,
        request: Request<RemoveContainerRequest>,
    ) -> Result<Response<RemoveContainerResponse>, Status> {
        let inner = request.into_inner();
        self.remove_container(&inner.container_id).await?;
        Ok(Response::new(RemoveContainerResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::runtime_service_server::RuntimeService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn remove_container_unknown_is_noop() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = RemoveContainerRequest {
            container_id: "does-not-exist".into(),
        };
        sut.remove_container(Request::new(request)).await?;
        Ok(())
    }
}
