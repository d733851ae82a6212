//! Byte stream abstraction shared by listeners, the tunnel layer and data
//! converters

use tokio::io::{AsyncRead, AsyncWrite};

/// Any bidirectional byte stream: tunnel streams, TCP and unix connections
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> ByteStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn ByteStream>;
