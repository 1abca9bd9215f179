// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! A synchronous client over the length-prefixed framing of
//! `metalayer_rpc::frame`, using a plain blocking `TcpStream` rather than
//! a reactor-driven connection, since this crate's query surface is
//! request/response, not streaming.

use std::io;
use std::net::{SocketAddr, TcpStream};

use metalayer_rpc::{RpcError, RpcRequest, RpcResponse};

#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ExecError {
    /// connection failure: {0}
    #[from]
    Io(io::Error),
    /// {0}
    #[from]
    Rpc(RpcError),
}

pub struct MetalayerClient {
    stream: TcpStream,
}

impl MetalayerClient {
    pub fn connect(remote: SocketAddr) -> Result<Self, ExecError> {
        let stream = TcpStream::connect(remote)?;
        #[cfg(feature = "log")]
        log::info!("connected to metalayerd at {remote}");
        Ok(Self { stream })
    }

    pub fn query(&mut self, request: RpcRequest) -> Result<RpcResponse, ExecError> {
        metalayer_rpc::write_frame(&mut self.stream, &request)?;
        match metalayer_rpc::read_frame(&mut self.stream)? {
            Some(response) => Ok(response),
            None => Err(ExecError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer"))),
        }
    }
}
