//! Liveness endpoint for the hosting platform's health probe.
//!
//! Answers any request with a 200 and a static body on a background
//! thread. It shares no state with the bot; it exists only so the
//! platform keeps the process alive.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};

use anyhow::Context;

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/plain\r\n\
Content-Length: 2\r\n\
Connection: close\r\n\
\r\n\
ok";

/// Bind the probe port and serve it on a background thread.
pub fn spawn(port: u16) -> anyhow::Result<std::thread::JoinHandle<()>> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .with_context(|| format!("binding keepalive port {port}"))?;
    tracing::info!(port, "keepalive endpoint listening");
    Ok(std::thread::spawn(move || serve(&listener)))
}

fn serve(listener: &TcpListener) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => answer(stream),
            Err(e) => tracing::warn!(error = %e, "keepalive accept failed"),
        }
    }
}

fn answer(mut stream: TcpStream) {
    // Drain whatever request line arrived; the response never varies.
    let mut buf = [0u8; 512];
    let _ = stream.read(&mut buf);
    if let Err(e) = stream.write_all(RESPONSE).and_then(|()| stream.flush()) {
        tracing::debug!(error = %e, "keepalive response failed");
    }
}
