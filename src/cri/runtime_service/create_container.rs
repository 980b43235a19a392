use crate::cri::{
    api::{CreateContainerRequest, CreateContainerResponse},
    cri_service::{CRIService, OptionStatus},
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_create_container creates a new container in specified PodSandbox.
    pub async fn handle_create_container(
        &self,
        request: Request<CreateContainerRequest>,
    ) -> Result<Response<CreateContainerResponse>, Status> {
        let inner = request.into_inner();
        let config = inner.config.ok_or_invalid("no container config provided")?;
        let sandbox_config = inner.sandbox_config.ok_or_invalid("no sandbox config provided")?;

        let container_id = self
            .create_container(&inner.pod_sandbox_id, &config, &sandbox_config)
            .await?;

        Ok(Response::new(CreateContainerResponse { container_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::api::runtime_service_server::RuntimeService;
    use crate::cri::cri_service::tests::new_cri_service;
    use anyhow::Result;

    #[tokio::test]
    async fn create_container_fail_no_config() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = CreateContainerRequest {
            pod_sandbox_id: "sandbox".into(),
            config: None,
            sandbox_config: None,
        };
        let response = sut.create_container(Request::new(request)).await;
        assert!(response.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn create_container_fail_unknown_sandbox() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = CreateContainerRequest {
            pod_sandbox_id: "does-not-exist".into(),
            config: Some(crate::cri::api::ContainerConfig {
                metadata: Some(crate::cri::api::ContainerMetadata {
                    name: "ctr".into(),
                    attempt: 0,
                }),
                image: Some(crate::cri::api::ImageSpec {
                    image: "alpine".into(),
                    annotations: Default::default(),
                }),
                command: vec![],
                args: vec![],
                working_dir: "".into(),
                envs: vec![],
                mounts: vec![],
                log_path: "".into(),
                labels: Default::default(),
                annotations: Default::default(),
                linux: None,
                stdin: false,
                tty: false,
            }),
            sandbox_config: Some(crate::cri::api::PodSandboxConfig {
                metadata: Some(crate::cri::api::PodSandboxMetadata {
                    name: "pod".into(),
                    uid: "does-not-exist".into(),
                    namespace: "default".into(),
                    attempt: 0,
                }),
                hostname: "".into(),
                log_directory: "".into(),
                dns_config: None,
                port_mappings: vec![],
                labels: Default::default(),
                annotations: Default::default(),
                linux: None,
            }),
        };
        let response = sut.create_container(Request::new(request)).await;
        assert!(response.is_err());
        Ok(())
    }
}
