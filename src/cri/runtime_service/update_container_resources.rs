use crate::cri::{
    api::{UpdateContainerResourcesRequest, UpdateContainerResourcesResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_update_container_resources updates ContainerConfig of the container.
    pub async fn handle_update_container_resources(
        &self,
        _request: Request<UpdateContainerResourcesRequest>,
    ) -> Result<Response<UpdateContainerResourcesResponse>, Status> {
        Err(Status::unimplemented("update_container_resources is not supported by this runtime"))
    }
}
