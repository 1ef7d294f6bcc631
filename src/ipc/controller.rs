use crate::error::Result;
use crate::ipc::protocol::{Command, ResponseData};
use crate::process::Manager;
use std::sync::Arc;

/// Maps control commands onto the manager
#[derive(Clone)]
pub struct Controller {
    manager: Arc<Manager>,
}

impl Controller {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub async fn handle(&self, command: Command) -> Result<ResponseData> {
        match command {
            Command::Status { target } => {
                Ok(ResponseData::ProcessList(self.manager.status(&target)?))
            }
            Command::Start { target } => Ok(ResponseData::State(self.manager.start(&target)?)),
            Command::Stop { target } => Ok(ResponseData::State(self.manager.stop(&target).await?)),
        }
    }
}
