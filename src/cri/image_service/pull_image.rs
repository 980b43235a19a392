use crate::{
    bundle::assemble,
    cri::{
        api::{PullImageRequest, PullImageResponse},
        cri_service::{CRIService, OptionStatus},
    },
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_pull_image pulls an image with authentication config.
    pub async fn handle_pull_image(
        &self,
        request: Request<PullImageRequest>,
    ) -> Result<Response<PullImageResponse>, Status> {
        let inner = request.into_inner();
        let image = inner.image.ok_or_invalid("no image spec provided")?;

        let sandbox_config = inner.sandbox_config.unwrap_or_default();
        let cgroup = sandbox_config
            .linux
            .as_ref()
            .map(|l| l.cgroup_parent.clone())
            .unwrap_or_default();
        let namespace = sandbox_config.metadata.map(|m| m.namespace).unwrap_or_default();
        let image_volumes_root = self.config.storage_path().join("image-volumes");
        let ctx = crate::solver::DeploymentContext::new();

        let image_ref = assemble::ensure_image(
            &self.bundle_store,
            &self.pull_coalescer,
            &image_volumes_root,
            &image.image,
            &cgroup,
            &namespace,
            &ctx,
        )
        .await
        .map_err(Status::unavailable)?;

        Ok(Response::new(PullImageResponse { image_ref }))
    }
}
