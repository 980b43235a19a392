use crate::cri::{
    api::{ContainerMetadata, ContainerStatus, ContainerStatusRequest, ContainerStatusResponse, ImageSpec},
    cri_service::{CRIService, OptionStatus},
};
use std::collections::HashMap;
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_container_status returns status of the container. If the container is not present,
    /// returns an error.
    pub async fn handle_container_status(
        &self,
        request: Request<ContainerStatusRequest>,
    ) -> Result<Response<ContainerStatusResponse>, Status> {
        let inner = request.into_inner();
        let record = self
            .container_storage
            .get(&inner.container_id)
            .await
            .map_err(|e| Status::internal(e.to_string()))?
            .ok_or_invalid(format!("container {} not found", inner.container_id))?;

        let status = ContainerStatus {
            id: record.id().clone(),
            metadata: Some(ContainerMetadata {
                name: record.metadata_name().clone(),
                attempt: record.attempt(),
            }),
            state: super::list_containers::to_api_state(record.container_state()) as i32,
            created_at: record.created_at().parse().unwrap_or_default(),
            started_at: 0,
            finished_at: 0,
            exit_code: 0,
            image: Some(ImageSpec {
                image: record.image_name().clone(),
                annotations: Default::default(),
            }),
            image_ref: record.image_id().clone(),
            reason: "".into(),
            message: "".into(),
            labels: Default::default(),
            annotations: record.annotations().clone(),
            mounts: vec![],
            log_path: record.log_path().to_string_lossy().into_owned(),
        };

        Ok(Response::new(ContainerStatusResponse {
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
    async fn container_status_unknown_is_not_found() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = ContainerStatusRequest {
            container_id: "does-not-exist".into(),
            verbose: false,
        };
        let response = sut.container_status(Request::new(request)).await;
        assert!(response.is_err());
        Ok(())
    }
}
