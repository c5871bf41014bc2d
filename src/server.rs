use anyhow::Result;
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use hyper::{body::Frame, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::storage::{Storage, StorageError, BUCKET_SOUNDS};

pub type FileBody = UnsyncBoxBody<Bytes, io::Error>;

/// Serves `GET /file/<id>` from the sounds bucket so Lavalink can fetch the
/// bytes of a sound by URL.
pub struct FileServer {
    addr: SocketAddr,
    storage: Arc<dyn Storage>,
}

impl FileServer {
    pub fn new(addr: SocketAddr, storage: Arc<dyn Storage>) -> Self {
        Self { addr, storage }
    }

    /// Accepts connections until `shutdown` is cancelled.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("🌐 Servidor de archivos en http://{}/file/<id>", self.addr);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = shutdown.cancelled() => break,
            };
            let storage = self.storage.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = hyper::service::service_fn(move |req: Request<hyper::body::Incoming>| {
                    let storage = storage.clone();
                    async move { handle_request(req, storage).await }
                });

                if let Err(e) = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service)
                    .await
                {
                    debug!(%peer, error = %e, "Conexión HTTP terminada con error");
                }
            });
        }

        info!("Servidor de archivos detenido");
        Ok(())
    }
}

pub async fn handle_request<B>(
    req: Request<B>,
    storage: Arc<dyn Storage>,
) -> Result<Response<FileBody>, Infallible> {
    let id = match (req.method(), req.uri().path().strip_prefix("/file/")) {
        (&Method::GET, Some(id)) if !id.is_empty() => id,
        _ => return Ok(plain(StatusCode::NOT_FOUND, "not found")),
    };
    let Ok(id) = urlencoding::decode(id) else {
        return Ok(plain(StatusCode::BAD_REQUEST, "invalid id"));
    };

    match storage.get_object(BUCKET_SOUNDS, &id).await {
        Ok((reader, size)) => {
            debug!(ident = %id, size, "Sirviendo archivo");
            let body = StreamBody::new(ReaderStream::new(reader).map_ok(Frame::data));
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("content-type", "audio/ogg")
                .header("content-length", size)
                .body(BodyExt::boxed_unsync(body))
                .unwrap_or_else(|_| plain(StatusCode::INTERNAL_SERVER_ERROR, "")))
        }
        Err(e @ (StorageError::NotFound { .. } | StorageError::InvalidKey(_))) => {
            warn!(ident = %id, error = %e, "Archivo no disponible");
            Ok(plain(StatusCode::BAD_REQUEST, "unknown file"))
        }
        Err(e) => {
            error!(ident = %id, error = %e, "Error leyendo archivo");
            Ok(plain(StatusCode::INTERNAL_SERVER_ERROR, "storage error"))
        }
    }
}

fn plain(status: StatusCode, message: &'static str) -> Response<FileBody> {
    let body = Full::new(Bytes::from_static(message.as_bytes()))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}
