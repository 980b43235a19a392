use crate::cri::{
    api::{ExecRequest, ExecResponse},
    cri_service::CRIService,
};
use tonic::{Request, Response, Status};

impl CRIService {
    /// handle_exec prepares a streaming endpoint to execute a command in the container.
    pub async fn handle_exec(
        &self,
        _request: Request<ExecRequest>,
    ) -> Result<Response<ExecResponse>, Status> {
        // No streaming server fronts this runtime yet, so there's no URL to
        // vend a kubelet could actually dial.
        Err(Status::unimplemented("exec is not supported by this runtime"))
    }
}
