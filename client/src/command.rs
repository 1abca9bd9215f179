// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

use metalayer_rpc::RpcRequest;

use crate::Command;
use crate::client::{ExecError, MetalayerClient};

impl Command {
    pub fn exec(self, mut client: MetalayerClient) -> Result<(), ExecError> {
        let request = match self {
            Command::Ping => RpcRequest::Ping,
            Command::Status => RpcRequest::TipStatus,
            Command::ConsensusHash { height } => RpcRequest::ConsensusHash { height },
            Command::Balance { address, property } => RpcRequest::Balance { address, property },
            Command::Property { property } => RpcRequest::Property { property },
        };
        let response = client.query(request)?;
        println!("{}", serde_yaml::to_string(&response).expect("RpcResponse always serializes"));
        Ok(())
    }
}
