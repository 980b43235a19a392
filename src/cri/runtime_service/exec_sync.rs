use crate::cri::{
    api::{ExecSyncRequest, ExecSyncResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_exec_sync runs a command in a container synchronously.
    pub async fn handle_exec_sync(
        &self,
        _request: Request<ExecSyncRequest>,
    ) -> Result<Response<ExecSyncResponse>, Status> {
        Err(Status::unimplemented("exec_sync is not supported by this runtime"))
    }
}
