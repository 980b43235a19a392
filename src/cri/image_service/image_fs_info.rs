use crate::cri::{
    api::{FilesystemIdentifier, FilesystemUsage, ImageFsInfoRequest, ImageFsInfoResponse},
    cri_service::{now_unix_nanos, CRIService},
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_image_fs_info returns information of the filesystem that is used to
    /// store images.
    pub async fn handle_image_fs_info(
        &self,
        _request: Request<ImageFsInfoRequest>,
    ) -> Result<Response<ImageFsInfoResponse>, Status> {
        let bundles = self.bundle_store.list().await.map_err(|e| Status::internal(e.to_string()))?;
        let used_bytes: u64 = bundles.iter().map(|b| *b.size_bytes()).sum();

        let usage = FilesystemUsage {
            timestamp: now_unix_nanos(),
            fs_id: Some(FilesystemIdentifier {
                mountpoint: self.config.storage_path().display().to_string(),
            }),
            used_bytes,
            inodes_used: bundles.len() as u64,
        };

        Ok(Response::new(ImageFsInfoResponse {
            image_filesystems: vec![usage],
        }))
    }
}
