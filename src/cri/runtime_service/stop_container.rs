use crate::cri::{
    api::{StopContainerRequest, StopContainerResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_stop_container stops a running container with a grace period (i.e., timeout). This
    /// call is idempotent, and must not return an error if the container has already been stopped.
    pub async fn handle_stop_container(
        &self,
        request: Request<StopContainerRequest>,
    ) -> Result<Response<StopContainerResponse>, Status> {
        let inner = request.into_inner();
        self.stop_container(&inner.container_id, inner.timeout).await?;
        Ok(Response::new(StopContainerResponse {}))
    }
}
