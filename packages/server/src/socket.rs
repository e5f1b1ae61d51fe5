// ABOUTME: Raw TCP front end: newline-delimited JSON-RPC, one reply line per request
// ABOUTME: Requests on one connection run concurrently; replies are serialized through a writer task

use crate::dispatch::Dispatcher;
use bridgekit_protocol::{encode_line, FrameDecoder, Response, RpcError};
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>) -> io::Result<()> {
    info!("Socket transport listening on {}", listener.local_addr()?);
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("Accepted connection from {}", peer);
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, dispatcher).await {
                warn!("Connection from {} failed: {}", peer, e);
            }
            debug!("Connection from {} closed", peer);
        });
    }
}

async fn handle_connection(stream: TcpStream, dispatcher: Arc<Dispatcher>) -> io::Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let writer = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = write_half.write_all(&bytes).await {
                warn!("Failed to write reply: {}", e);
                break;
            }
        }
    });

    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 8192];
    loop {
        let n = read_half.read(&mut buf).await?;
        let frames: Vec<_> = if n == 0 {
            decoder.finish().into_iter().collect()
        } else {
            decoder.push(&buf[..n])
        };

        for frame in frames {
            let dispatcher = dispatcher.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let response = match frame {
                    Ok(value) => dispatcher.handle_value(value).await,
                    Err(e) => {
                        warn!("{}", e);
                        Some(Response::failure(None, RpcError::parse_error(e.to_string())))
                    }
                };
                if let Some(response) = response {
                    match encode_line(&response) {
                        Ok(bytes) => {
                            let _ = tx.send(bytes);
                        }
                        Err(e) => warn!("Failed to encode reply: {}", e),
                    }
                }
            });
        }

        if n == 0 {
            break;
        }
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}
