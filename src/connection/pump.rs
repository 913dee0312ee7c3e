//! Data pump role: moves bytes both ways over a connected socket

use super::manager::ConnectionManager;
use crate::transport::Transport;
use bytes::Bytes;
use restodash_shared::{ConnectionState, LinkError, LinkEvent};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Run the pump until the link drops or the task is cancelled.
///
/// Both halves of `stream` live in this task, so cancelling it closes the
/// socket as one unit.
pub(super) async fn run<T: Transport>(
    manager: ConnectionManager<T>,
    role_id: u64,
    stream: T::Stream,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    debug!("[PUMP] Started");
    let (mut reader, mut writer) = tokio::io::split(stream);
    let buffer_size = manager.read_buffer_size();

    let read_loop = async {
        let mut buf = vec![0u8; buffer_size];
        while manager.state() == ConnectionState::Connected {
            match read_chunk(&mut reader, &mut buf).await {
                Ok(len) => manager.emit(LinkEvent::DataReceived {
                    data: Bytes::copy_from_slice(&buf[..len]),
                    len,
                }),
                Err(e) => return Some(LinkError::LinkLost(e.to_string())),
            }
        }
        None
    };

    let write_loop = async {
        while let Some(data) = outbound.recv().await {
            match write_chunk(&mut writer, &data).await {
                // Echo so the consumer can show what was sent
                Ok(()) => manager.emit(LinkEvent::DataSent { data }),
                // A write failure does not end the link; the read side detects loss
                Err(e) => warn!("[PUMP] {}", LinkError::Write(e.to_string())),
            }
        }
    };

    tokio::select! {
        lost = read_loop => {
            if let Some(error) = lost {
                manager.link_lost(role_id, error);
            }
        }
        _ = write_loop => debug!("[PUMP] Outbound queue closed"),
    }
}

/// Read one chunk. End of stream counts as a failure.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    match reader.read(buf).await? {
        0 => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed the connection",
        )),
        n => Ok(n),
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_chunk_reports_count() {
        let (mut local, mut remote) = duplex(64);
        remote.write_all(b"abc").await.unwrap();

        let mut buf = [0u8; 16];
        let n = read_chunk(&mut local, &mut buf).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..n], b"abc");
    }

    #[tokio::test]
    async fn test_read_chunk_eof_is_error() {
        let (mut local, remote) = duplex(64);
        drop(remote);

        let mut buf = [0u8; 16];
        let err = read_chunk(&mut local, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_write_chunk_to_closed_peer_fails() {
        let (mut local, remote) = duplex(64);
        drop(remote);

        assert!(write_chunk(&mut local, b"lost").await.is_err());
    }
}
