use crate::cri::{
    api::{Container, ContainerState as ApiContainerState, ImageSpec, ListContainersRequest, ListContainersResponse},
    cri_service::{now_unix_nanos, CRIService},
};
use crate::container::ContainerState;
use tonic::{Request, Response, Status};

pub(super) fn to_api_state(state: ContainerState) -> ApiContainerState {
    match state {
        ContainerState::Created => ApiContainerState::ContainerCreated,
        ContainerState::Running => ApiContainerState::ContainerRunning,
        ContainerState::Stopped => ApiContainerState::ContainerExited,
        ContainerState::Removed => ApiContainerState::ContainerUnknown,
    }
}

fn matches_labels(labels: &std::collections::HashMap<String, String>, selector: &std::collections::HashMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

impl CRIService {
    /// handle_list_containers lists all containers by filters.
    pub async fn handle_list_containers(
        &self,
        request: Request<ListContainersRequest>,
    ) -> Result<Response<ListContainersResponse>, Status> {
        let filter = request.into_inner().filter;
        let records = self.container_storage.list().await.map_err(|e| Status::internal(e.to_string()))?;

        let containers = records
            .into_iter()
            .filter(|r| {
                if let Some(f) = &filter {
                    if !f.id.is_empty() && f.id != *r.id() {
                        return false;
                    }
                    if !f.pod_sandbox_id.is_empty() && f.pod_sandbox_id != *r.pod_id() {
                        return false;
                    }
                    if let Some(state) = &f.state {
                        if state.state != to_api_state(r.container_state()) as i32 {
                            return false;
                        }
                    }
                    if !matches_labels(r.annotations(), &f.label_selector) {
                        return false;
                    }
                }
                true
            })
            .map(|r| Container {
                id: r.id().clone(),
                pod_sandbox_id: r.pod_id().clone(),
                metadata: Some(crate::cri::api::ContainerMetadata {
                    name: r.metadata_name().clone(),
                    attempt: r.attempt(),
                }),
                image: Some(ImageSpec {
                    image: r.image_name().clone(),
                    annotations: Default::default(),
                }),
                image_ref: r.image_id().clone(),
                state: to_api_state(r.container_state()) as i32,
                created_at: r.created_at().parse().unwrap_or_else(|_| now_unix_nanos()),
                labels: Default::default(),
                annotations: r.annotations().clone(),
            })
            .collect();

        Ok(Response::new(ListContainersResponse { containers }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::runtime_service_server::RuntimeService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn list_containers_empty_by_default() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = ListContainersRequest { filter: None };
        let response = sut.list_containers(Request::new(request)).await?;
        assert!(response.get_ref().containers.is_empty());
        Ok(())
    }
}
