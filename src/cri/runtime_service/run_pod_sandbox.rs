use crate::cri::{
    api::{RunPodSandboxRequest, RunPodSandboxResponse},
    cri_service::{CRIService, OptionStatus},
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_run_pod_sandbox creates and starts a pod-level sandbox. Runtimes must ensure the
    /// sandbox is in the ready state on success.
    pub async fn handle_run_pod_sandbox(
        &self,
        request: Request<RunPodSandboxRequest>,
    ) -> Result<Response<RunPodSandboxResponse>, Status> {
        let inner = request.into_inner();
        let config = inner.config.ok_or_invalid("no pod sandbox config provided")?;

        let pod_sandbox_id = self.run_pod_sandbox(&config, &inner.runtime_handler).await?;

        Ok(Response::new(RunPodSandboxResponse { pod_sandbox_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{
        api::{
            runtime_service_server::RuntimeService, LinuxPodSandboxConfig,
            LinuxSandboxSecurityContext, NamespaceOption, PodSandboxConfig, PodSandboxMetadata,
        },
        cri_service::tests::new_cri_service,
    };
    use anyhow::Result;
    use std::collections::HashMap;

    fn config(uid: &str) -> PodSandboxConfig {
        PodSandboxConfig {
            metadata: Some(PodSandboxMetadata {
                name: "test-pod".into(),
                uid: uid.into(),
                namespace: "default".into(),
                attempt: 0,
            }),
            hostname: "test-pod".into(),
            log_directory: "".into(),
            dns_config: None,
            port_mappings: vec![],
            labels: HashMap::new(),
            annotations: HashMap::new(),
            linux: Some(LinuxPodSandboxConfig {
                cgroup_parent: "abc-pod.slice".into(),
                sysctls: HashMap::new(),
                security_context: Some(LinuxSandboxSecurityContext {
                    namespace_options: Some(NamespaceOption {
                        network: 0,
                        pid: 1,
                        ipc: 0,
                        target_id: String::new(),
                    }),
                    privileged: false,
                    selinux_label: String::new(),
                    run_as_user_name: String::new(),
                    seccomp_profile_path: "".into(),
                }),
            }),
        }
    }

    #[tokio::test]
    async fn run_pod_sandbox_success() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = RunPodSandboxRequest {
            config: Some(config("123")),
            runtime_handler: "".into(),
        };
        let response = sut.run_pod_sandbox(Request::new(request)).await?;
        assert!(!response.get_ref().pod_sandbox_id.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn run_pod_sandbox_fail_no_config() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = RunPodSandboxRequest {
            config: None,
            runtime_handler: "".into(),
        };
        let response = sut.run_pod_sandbox(Request::new(request)).await;
        assert!(response.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn run_pod_sandbox_fail_no_metadata() -> Result<()> {
        let sut = new_cri_service().await?;
        let mut cfg = config("123");
        cfg.metadata = None;
        let request = RunPodSandboxRequest {
            config: Some(cfg),
            runtime_handler: "".into(),
        };
        let response = sut.run_pod_sandbox(Request::new(request)).await;
        assert!(response.is_err());
        Ok(())
    }
}
