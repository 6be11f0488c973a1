use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use super::MessageHandler;
use crate::types::{ClientMessage, ServerMessage};

/// Accept loop plus per-client tasks. Requests on one channel are handled in
/// arrival order, so same-kind responses come back in request order; a
/// malformed frame is logged and dropped without closing the channel.
pub struct WebSocketServer {
  handler: Arc<MessageHandler>,
  shutdown_rx: broadcast::Receiver<()>,
}

impl WebSocketServer {
  pub fn new(handler: Arc<MessageHandler>, shutdown_rx: broadcast::Receiver<()>) -> Self {
    Self {
      handler,
      shutdown_rx,
    }
  }

  pub async fn run(self, addr: &str) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Cache server listening on {}", addr);
    self.serve(listener).await
  }

  /// Accept loop over an already-bound listener.
  pub async fn serve(mut self, listener: TcpListener) -> Result<(), anyhow::Error> {
    loop {
      tokio::select! {
        Ok((stream, peer)) = listener.accept() => {
          tracing::debug!("Connection from {}", peer);
          let handler = self.handler.clone();
          tokio::spawn(handle_client(stream, handler));
        }
        _ = self.shutdown_rx.recv() => break,
      }
    }
    Ok(())
  }
}

async fn handle_client(stream: TcpStream, handler: Arc<MessageHandler>) {
  let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
    return;
  };
  let client_id = Uuid::new_v4();
  let (mut sink, mut stream) = ws.split();
  let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

  let send_task = tokio::spawn(async move {
    while let Some(msg) = rx.recv().await {
      if sink.send(Message::Binary(msg.encode().into())).await.is_err() {
        break;
      }
    }
  });

  while let Some(frame) = stream.next().await {
    let bytes = match frame {
      Ok(Message::Binary(bytes)) => bytes,
      Ok(Message::Close(_)) | Err(_) => break,
      Ok(_) => continue,
    };

    match ClientMessage::decode(&bytes) {
      Ok(msg) => {
        if let Some(resp) = handler.handle(client_id, msg).await {
          if tx.send(resp).is_err() {
            break;
          }
        }
      }
      // never fatal: drop the frame, keep the channel
      Err(e) => tracing::warn!("Client {}: dropping malformed frame: {}", client_id, e),
    }
  }

  tracing::debug!("Client {} disconnected", client_id);
  send_task.abort();
}
