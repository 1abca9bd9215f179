// Meta Layer: sovereign meta-token protocol core
//
// SPDX-License-Identifier: Apache-2.0

//! Wire-level errors: framing and encoding failures only. The query
//! messages themselves carry protocol-level failure information inline
//! (`RpcResponse::Failure`, `RpcResponse::NotFound`).

#[derive(Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum RpcError {
    /// transport I/O failure: {0}
    #[from]
    Io(std::io::Error),
    /// message encoding error: {0}
    Encoding(String),
}
