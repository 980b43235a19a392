use crate::cri::{
    api::{Image, ListImagesRequest, ListImagesResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_list_images lists existing images.
    pub async fn handle_list_images(
        &self,
        request: Request<ListImagesRequest>,
    ) -> Result<Response<ListImagesResponse>, Status> {
        let filter = request.into_inner().filter.and_then(|f| f.image);
        let bundles = self.bundle_store.list().await.map_err(|e| Status::internal(e.to_string()))?;

        let images = bundles
            .into_iter()
            .filter(|b| match &filter {
                Some(spec) if !spec.image.is_empty() => b.name().name == crate::bundle::assemble::parse_ref(&spec.image).name,
                _ => true,
            })
            .map(|b| Image {
                id: b.id().clone(),
                repo_tags: vec![b.name().to_string()],
                repo_digests: vec![],
                size: *b.size_bytes(),
                username: "".into(),
            })
            .collect();

        Ok(Response::new(ListImagesResponse { images }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cri::{api::image_service_server::ImageService, cri_service::tests::new_cri_service};
    use anyhow::Result;

    #[tokio::test]
    async fn list_images_empty_by_default() -> Result<()> {
        let sut = new_cri_service().await?;
        let request = ListImagesRequest { filter: None };
        let response = sut.list_images(Request::new(request)).await?;
        assert!(response.get_ref().images.is_empty());
        Ok(())
    }
}
