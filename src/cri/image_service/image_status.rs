use crate::{
    bundle::assemble::parse_ref,
    cri::{
        api::{Image, ImageStatusRequest, ImageStatusResponse},
        cri_service::{CRIService, OptionStatus},
    },
};
use std::collections::HashMap;
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_image_status returns the status of the image. If the image is not
    /// present, returns a response with ImageStatusResponse.image set to
    /// None.
    pub async fn handle_image_status(
        &self,
        request: Request<ImageStatusRequest>,
    ) -> Result<Response<ImageStatusResponse>, Status> {
        let spec = request.into_inner().image.ok_or_invalid("no image spec provided")?;
        let name = parse_ref(&spec.image);

        let bundle = self.bundle_store.get(&name).await.map_err(|e| Status::internal(e.to_string()))?;

        let image = bundle.map(|b| Image {
            id: b.id().clone(),
            repo_tags: vec![b.name().to_string()],
            repo_digests: vec![],
            size: *b.size_bytes(),
            username: "".into(),
        });

        Ok(Response::new(ImageStatusResponse { image, info: HashMap::new() }))
    }
}
