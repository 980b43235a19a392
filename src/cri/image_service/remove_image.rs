use crate::{
    bundle::assemble::parse_ref,
    cri::{
        api::{RemoveImageRequest, RemoveImageResponse},
        cri_service::{CRIService, OptionStatus},
    },
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_remove_image removes the image. This call is idempotent, and must not return an
    /// error if the image has already been removed.
    pub async fn handle_remove_image(
        &self,
        request: Request<RemoveImageRequest>,
    ) -> Result<Response<RemoveImageResponse>, Status> {
        let spec = request.into_inner().image.ok_or_invalid("no image spec provided")?;
        let name = parse_ref(&spec.image);
        self.bundle_store.delete(&name).await.map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(RemoveImageResponse {}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::{image_service_server::ImageService, ImageSpec}, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn remove_image_unknown_is_noop() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = RemoveImageRequest {
            image: Some(ImageSpec { image: "does-not-exist".into(), annotations: Default::default() }),
        };
        sut.remove_image(Request::new(request)).await?;
        Ok(())
    }
}
