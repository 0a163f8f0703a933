use super::router::{Reply, Router, percent_decode};
use crate::error::{SaveError, SaveResult};
use crate::frontend::Frontend;
use std::fs::File;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Request, Response, ResponseBox, Server, StatusCode};

fn with_type<R: std::io::Read>(response: Response<R>, content_type: &str) -> Response<R> {
    match Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn build_response(router: &dyn Router, path: &str) -> ResponseBox {
    match router.handle(path) {
        Ok(Reply::Body { data, content_type }) => with_type(Response::from_data(data), content_type).boxed(),
        Ok(Reply::File { path: file, content_type }) => match File::open(&file) {
            Ok(f) => with_type(Response::from_file(f), content_type).boxed(),
            Err(e) => {
                log::warn!("[web] Cannot open {}: {}", file.display(), e);
                Response::empty(StatusCode(500)).boxed()
            }
        },
        Err(SaveError::NotFound(_)) => Response::from_string("Not Found").with_status_code(404).boxed(),
        Err(e) => {
            log::warn!("[web] {} failed: {}", path, e);
            Response::from_string(e.to_string()).with_status_code(500).boxed()
        }
    }
}

fn respond(router: &dyn Router, request: Request) {
    let url = request.url().to_string();
    let path = url.split('?').next().unwrap_or("/");
    log::debug!("[web] {} {}", request.method(), path);

    let response = build_response(router, &percent_decode(path));
    if let Err(e) = request.respond(response) {
        log::warn!("[web] Response to {} failed: {}", path, e);
    }
}

/// Serve `router` on `port` until the front end stops the server.
pub fn serve(router: Box<dyn Router>, port: u16, frontend: &mut dyn Frontend) -> SaveResult<()> {
    let server = Server::http(("0.0.0.0", port))
        .map_err(|e| SaveError::network(format!("cannot listen on port {}: {}", port, e)))?;
    let server = Arc::new(server);
    log::info!("[web] Listening on port {}", port);

    let worker = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            for request in server.incoming_requests() {
                respond(router.as_ref(), request);
            }
        })
    };

    frontend.wait_for_stop(&format!(
        "Web Server on http://localhost:{}\nPress OK to stop the Server.",
        port
    ));

    server.unblock();
    worker
        .join()
        .map_err(|_| SaveError::network("web server thread panicked"))?;
    log::info!("[web] Stopped");
    Ok(())
}
