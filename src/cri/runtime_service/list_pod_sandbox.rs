use crate::cri::{
    api::{ListPodSandboxRequest, ListPodSandboxResponse, PodSandbox, PodSandboxMetadata},
    cri_service::CRIService,
};
use crate::sandbox::lifecycle::sandbox_matches_state;
use tonic::{Request, Response, Status};

fn matches_labels(labels: &std::collections::HashMap<String, String>, selector: &std::collections::HashMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

impl CRIService {
    /// handle_list_pod_sandbox returns a list of PodSandboxes.
    pub async fn handle_list_pod_sandbox(
        &self,
        request: Request<ListPodSandboxRequest>,
    ) -> Result<Response<ListPodSandboxResponse>, Status> {
        let filter = request.into_inner().filter;
        let sandboxes = self.sandboxes.read().await;

        let items = sandboxes
            .values()
            .filter(|r| {
                if let Some(f) = &filter {
                    if !f.id.is_empty() && f.id != *r.id() {
                        return false;
                    }
                    if !sandbox_matches_state(r.state(), f.state.as_ref().map(|s| s.state())) {
                        return false;
                    }
                    if !matches_labels(r.labels(), &f.label_selector) {
                        return false;
                    }
                }
                true
            })
            .map(|r| PodSandbox {
                id: r.id().clone(),
                metadata: Some(PodSandboxMetadata {
                    name: r.name().clone(),
                    uid: r.uid().clone(),
                    namespace: r.namespace().clone(),
                    attempt: r.attempt(),
                }),
                state: match r.state() {
                    crate::sandbox::record::SandboxState::Ready => crate::cri::api::PodSandboxState::SandboxReady as i32,
                    crate::sandbox::record::SandboxState::NotReady => crate::cri::api::PodSandboxState::SandboxNotready as i32,
                },
                created_at: r.created_at(),
                labels: r.labels().clone(),
                annotations: r.annotations().clone(),
            })
            .collect();

        Ok(Response::new(ListPodSandboxResponse { items }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::runtime_service_server::RuntimeService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn list_pod_sandbox_empty_by_default() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = ListPodSandboxRequest { filter: None };
        let response = sut.list_pod_sandbox(Request::new(request)).await?;
        assert!(response.get_ref().items.is_empty());
        Ok(())
    }
}
